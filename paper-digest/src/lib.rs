pub mod types;
pub mod config;
pub mod fetcher;
pub mod parser;
pub mod sources;
pub mod traits;
pub mod llm_adapter;
pub mod state;
pub mod digest;
pub mod pipeline;
pub mod scheduler;
pub mod utils;

pub use types::*;
pub use config::{AppConfig, DeliveryKind, Secrets};
pub use fetcher::Fetcher;
pub use parser::ArxivFeedParser;
pub use sources::ArxivSource;
pub use traits::{PaperSource, Summarizer};
pub use llm_adapter::{AnthropicProvider, LlmProvider, LlmProviderKind, OpenAiProvider, PaperSummarizer};
pub use state::SeenSetStore;
pub use digest::DigestFormatter;
pub use pipeline::{DigestPipeline, PipelineOptions, PipelineState, RunReport};
pub use scheduler::DailyScheduler;

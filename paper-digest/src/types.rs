use chrono::NaiveDate;
use interfaces::defs::DeliveryError;
use std::collections::BTreeSet;

pub use interfaces::defs::{
    Digest, DigestEntry, FailureKind, OutgoingDigest, PaperRecord, RenderedDigest, SeenSet,
    SummaryResult, SummaryStatus,
};

/// Topic filter handed to a paper source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub terms: Vec<String>,
    pub categories: BTreeSet<String>,
    /// Oldest publication date to include
    pub since: NaiveDate,
    pub max_results: usize,
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
    /// Minimum spacing between two requests to the same host
    pub request_interval_ms: u64,
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "paper-digest/0.1".to_string(),
            timeout_seconds: 30,
            max_retries: 3,
            retry_delay_seconds: 2,
            request_interval_ms: 3000,
            max_redirects: 5,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DigestError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Feed parse error: {0}")]
    Parse(String),

    #[error("Source {source_name} unavailable after {attempts} attempts: {detail}")]
    SourceUnavailable {
        source_name: String,
        attempts: u32,
        detail: String,
    },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Seen-set file {path} is corrupted: {detail}")]
    StateCorrupted { path: String, detail: String },

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<figment::Error> for DigestError {
    fn from(err: figment::Error) -> Self {
        DigestError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DigestError>;

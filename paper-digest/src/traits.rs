use crate::types::{PaperRecord, Result, SearchQuery, SummaryResult};
use async_trait::async_trait;

/// Trait for pulling papers from a repository (arXiv, fixtures in tests, ...)
#[async_trait]
pub trait PaperSource: Send + Sync {
    /// Human-readable name for this source
    fn source_name(&self) -> String;

    /// Fetch papers matching `query`, newest first, at most `query.max_results`.
    /// Identifiers are unique within the returned sequence.
    async fn search(&self, query: &SearchQuery) -> Result<Vec<PaperRecord>>;

    /// Look up a single paper by identifier
    async fn fetch_paper(&self, id: &str) -> Result<Option<PaperRecord>>;
}

/// Turns one paper into a structured summary.
///
/// Implementations never fail: every problem is reported through the
/// returned `SummaryResult` so one bad paper cannot stop a batch.
#[async_trait]
pub trait Summarizer: Send + Sync {
    fn summarizer_name(&self) -> String;

    async fn summarize(&self, paper: &PaperRecord) -> SummaryResult;
}

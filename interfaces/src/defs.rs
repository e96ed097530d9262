use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A paper as returned by the upstream repository. Never modified after fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperRecord {
    /// Accession number without version suffix, e.g. `2301.07041`
    pub id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub abstract_text: String,
    pub published: DateTime<Utc>,
    /// Abstract page, e.g. `https://arxiv.org/abs/2301.07041`
    pub url: String,
    pub pdf_url: Option<String>,
    pub categories: BTreeSet<String>,
}

/// Why a single paper could not be summarized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    Timeout,
    ProviderError,
    MalformedOutput,
    ContentTooLarge,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureKind::Timeout => "timeout",
            FailureKind::ProviderError => "provider error",
            FailureKind::MalformedOutput => "malformed output",
            FailureKind::ContentTooLarge => "content too large",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SummaryStatus {
    Succeeded,
    Failed { kind: FailureKind, reason: String },
}

/// Outcome of summarizing one paper in one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryResult {
    pub paper_id: String,
    pub synopsis: String,
    pub methods: Vec<String>,
    pub contributions: Vec<String>,
    pub limitations: Vec<String>,
    pub status: SummaryStatus,
}

impl SummaryResult {
    pub fn succeeded(
        paper_id: impl Into<String>,
        synopsis: impl Into<String>,
        methods: Vec<String>,
        contributions: Vec<String>,
        limitations: Vec<String>,
    ) -> Self {
        Self {
            paper_id: paper_id.into(),
            synopsis: synopsis.into(),
            methods,
            contributions,
            limitations,
            status: SummaryStatus::Succeeded,
        }
    }

    pub fn failed(paper_id: impl Into<String>, kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            paper_id: paper_id.into(),
            synopsis: String::new(),
            methods: Vec::new(),
            contributions: Vec::new(),
            limitations: Vec::new(),
            status: SummaryStatus::Failed {
                kind,
                reason: reason.into(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, SummaryStatus::Succeeded)
    }

    pub fn failure(&self) -> Option<(FailureKind, &str)> {
        match &self.status {
            SummaryStatus::Succeeded => None,
            SummaryStatus::Failed { kind, reason } => Some((*kind, reason.as_str())),
        }
    }
}

/// Identifiers of papers that have already been processed.
///
/// Only grows during normal operation; `forget` exists for manual cleanup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeenSet {
    ids: BTreeSet<String>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Returns how many identifiers were not already present.
    pub fn add_all<I, S>(&mut self, ids: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let before = self.ids.len();
        self.ids.extend(ids.into_iter().map(Into::into));
        self.ids.len() - before
    }

    /// Returns how many identifiers were removed.
    pub fn forget<I, S>(&mut self, ids: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        ids.into_iter()
            .filter(|id| self.ids.remove(id.as_ref()))
            .count()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.ids.iter()
    }
}

impl<S: Into<String>> FromIterator<S> for SeenSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestEntry {
    pub paper: PaperRecord,
    pub summary: SummaryResult,
}

/// Everything that goes into one email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digest {
    pub entries: Vec<DigestEntry>,
    pub generated_at: DateTime<Utc>,
}

impl Digest {
    pub fn new(entries: Vec<DigestEntry>, generated_at: DateTime<Utc>) -> Self {
        Self { entries, generated_at }
    }

    pub fn new_paper_count(&self) -> usize {
        self.entries.len()
    }

    pub fn failed_count(&self) -> usize {
        self.entries.iter().filter(|entry| !entry.summary.is_success()).count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDigest {
    pub plain_text: String,
    pub rich_text: String,
}

/// A fully rendered email ready for a transport.
#[derive(Debug, Clone)]
pub struct OutgoingDigest {
    pub recipient: String,
    pub subject: String,
    pub plain_text: String,
    pub rich_text: String,
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("delivery failed: {detail}")]
    DeliveryFailed { detail: String },

    #[error("invalid address {address}: {detail}")]
    InvalidAddress { address: String, detail: String },
}

impl DeliveryError {
    pub fn failed(detail: impl Into<String>) -> Self {
        DeliveryError::DeliveryFailed { detail: detail.into() }
    }
}

/// Transport that hands a rendered digest to an email provider.
#[async_trait]
pub trait DeliveryClient: Send + Sync {
    fn transport_name(&self) -> String;

    async fn send(&self, digest: &OutgoingDigest) -> Result<(), DeliveryError>;
}

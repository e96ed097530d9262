#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use interfaces::defs::{DeliveryClient, DeliveryError, OutgoingDigest};
use paper_digest::{
    DigestError, FailureKind, FetchConfig, PaperRecord, PaperSource, Result, SearchQuery, Summarizer,
    SummaryResult,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Fetch settings with no spacing and no backoff delay.
pub fn fast_fetch_config() -> FetchConfig {
    FetchConfig {
        user_agent: "paper-digest-tests/0.1".to_string(),
        timeout_seconds: 5,
        max_retries: 2,
        retry_delay_seconds: 0,
        request_interval_ms: 0,
        max_redirects: 2,
    }
}

/// One arXiv Atom `<entry>`. `versioned_id` is e.g. `2401.00001v1`.
pub fn atom_entry(versioned_id: &str, title: &str, published: &str) -> String {
    format!(
        r#"  <entry>
    <id>http://arxiv.org/abs/{id}</id>
    <updated>{published}</updated>
    <published>{published}</published>
    <title>{title}</title>
    <summary>  An abstract for {title}.
      It wraps across lines.  </summary>
    <author><name>Ada Lovelace</name></author>
    <author><name>Alan Turing</name></author>
    <link href="http://arxiv.org/abs/{id}" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/{id}" rel="related" type="application/pdf"/>
    <category term="cs.LG" scheme="http://arxiv.org/schemas/atom"/>
    <category term="cs.AI" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
"#,
        id = versioned_id,
        title = title,
        published = published
    )
}

pub fn atom_feed(entries: &[String]) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <link href="http://arxiv.org/api/query" rel="self" type="application/atom+xml"/>
  <title type="html">ArXiv Query</title>
  <id>http://arxiv.org/api/test</id>
  <updated>2024-01-10T00:00:00-05:00</updated>
{}</feed>
"#,
        entries.concat()
    )
}

pub fn paper(id: &str) -> PaperRecord {
    PaperRecord {
        id: id.to_string(),
        title: format!("Paper {}", id),
        authors: vec!["Ada Lovelace".to_string()],
        abstract_text: format!("Abstract of {}", id),
        published: Utc.with_ymd_and_hms(2024, 1, 8, 12, 0, 0).unwrap(),
        url: format!("https://arxiv.org/abs/{}", id),
        pdf_url: Some(format!("https://arxiv.org/pdf/{}", id)),
        categories: BTreeSet::from(["cs.LG".to_string()]),
    }
}

pub fn query() -> SearchQuery {
    SearchQuery {
        terms: vec!["interpretability".to_string()],
        categories: BTreeSet::from(["cs.LG".to_string()]),
        since: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        max_results: 50,
    }
}

/// Source returning a fixed list, or `SourceUnavailable` when built with `failing`.
pub struct FixedSource {
    papers: Vec<PaperRecord>,
    fail: bool,
}

impl FixedSource {
    pub fn new(papers: Vec<PaperRecord>) -> Self {
        Self { papers, fail: false }
    }

    pub fn failing() -> Self {
        Self {
            papers: Vec::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl PaperSource for FixedSource {
    fn source_name(&self) -> String {
        "fixed".to_string()
    }

    async fn search(&self, _query: &SearchQuery) -> Result<Vec<PaperRecord>> {
        if self.fail {
            return Err(DigestError::SourceUnavailable {
                source_name: "fixed".to_string(),
                attempts: 3,
                detail: "HTTP 503: Service Unavailable".to_string(),
            });
        }
        Ok(self.papers.clone())
    }

    async fn fetch_paper(&self, id: &str) -> Result<Option<PaperRecord>> {
        Ok(self.papers.iter().find(|p| p.id == id).cloned())
    }
}

/// Summarizer that succeeds unless a failure is scripted for the paper id.
#[derive(Default)]
pub struct ScriptedSummarizer {
    failures: HashMap<String, FailureKind>,
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedSummarizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, id: &str, kind: FailureKind) -> Self {
        self.failures.insert(id.to_string(), kind);
        self
    }
}

#[async_trait]
impl Summarizer for ScriptedSummarizer {
    fn summarizer_name(&self) -> String {
        "scripted".to_string()
    }

    async fn summarize(&self, paper: &PaperRecord) -> SummaryResult {
        self.calls.lock().unwrap().push(paper.id.clone());
        match self.failures.get(&paper.id) {
            Some(kind) => SummaryResult::failed(&paper.id, *kind, "no response within the time limit"),
            None => SummaryResult::succeeded(
                &paper.id,
                format!("Synopsis of {}", paper.id),
                vec!["Linear classifiers".to_string()],
                vec!["A new benchmark".to_string()],
                vec!["Small models only".to_string()],
            ),
        }
    }
}

/// Delivery that records what it was asked to send.
#[derive(Clone, Default)]
pub struct RecordingDelivery {
    pub sent: Arc<Mutex<Vec<OutgoingDigest>>>,
    fail: bool,
}

impl RecordingDelivery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            sent: Arc::default(),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<OutgoingDigest> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliveryClient for RecordingDelivery {
    fn transport_name(&self) -> String {
        "recording".to_string()
    }

    async fn send(&self, digest: &OutgoingDigest) -> std::result::Result<(), DeliveryError> {
        if self.fail {
            return Err(DeliveryError::failed("HTTP 401: invalid api key"));
        }
        self.sent.lock().unwrap().push(digest.clone());
        Ok(())
    }
}

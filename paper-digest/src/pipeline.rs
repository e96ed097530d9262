use crate::digest::DigestFormatter;
use crate::state::SeenSetStore;
use crate::traits::{PaperSource, Summarizer};
use crate::types::{Digest, DigestEntry, OutgoingDigest, PaperRecord, Result, SearchQuery, SeenSet};
use chrono::Utc;
use interfaces::defs::DeliveryClient;
use std::collections::HashSet;
use std::fmt;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Where a run currently is, or where it stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    LoadingSeen,
    Fetching,
    Filtering,
    Summarizing,
    Rendering,
    Delivering,
    Persisting,
    Done,
    Aborted(String),
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::LoadingSeen => f.write_str("loading seen-set"),
            PipelineState::Fetching => f.write_str("fetching"),
            PipelineState::Filtering => f.write_str("filtering"),
            PipelineState::Summarizing => f.write_str("summarizing"),
            PipelineState::Rendering => f.write_str("rendering"),
            PipelineState::Delivering => f.write_str("delivering"),
            PipelineState::Persisting => f.write_str("persisting"),
            PipelineState::Done => f.write_str("done"),
            PipelineState::Aborted(reason) => write!(f, "aborted: {}", reason),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub recipient: String,
    pub subject_prefix: String,
    /// Commit papers whose summary failed instead of retrying them next run
    pub mark_failed_as_seen: bool,
    /// Never write the seen-set
    pub dry_run: bool,
}

/// What happened during one run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub fetched: usize,
    pub new_papers: usize,
    pub summarized: usize,
    pub failed: usize,
    pub delivered: bool,
    /// Identifiers added to the seen-set by this run
    pub committed: Vec<String>,
    pub final_state: PipelineState,
}

impl RunReport {
    fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            fetched: 0,
            new_papers: 0,
            summarized: 0,
            failed: 0,
            delivered: false,
            committed: Vec::new(),
            final_state: PipelineState::LoadingSeen,
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self.final_state, PipelineState::Aborted(_))
    }
}

/// Fetch, filter, summarize, render, deliver, commit.
pub struct DigestPipeline {
    source: Box<dyn PaperSource>,
    summarizer: Box<dyn Summarizer>,
    delivery: Box<dyn DeliveryClient>,
    store: SeenSetStore,
    query: SearchQuery,
    options: PipelineOptions,
}

impl DigestPipeline {
    pub fn new(
        source: Box<dyn PaperSource>,
        summarizer: Box<dyn Summarizer>,
        delivery: Box<dyn DeliveryClient>,
        store: SeenSetStore,
        query: SearchQuery,
        options: PipelineOptions,
    ) -> Self {
        info!(
            "Pipeline: source {}, summarizer {}, delivery {}",
            source.source_name(),
            summarizer.summarizer_name(),
            delivery.transport_name()
        );
        Self {
            source,
            summarizer,
            delivery,
            store,
            query,
            options,
        }
    }

    /// Replace the search window, e.g. before a scheduled run on a new day.
    pub fn set_query(&mut self, query: SearchQuery) {
        self.query = query;
    }

    /// Load the seen-set, process, and write the result back.
    pub async fn run(&self) -> RunReport {
        let run_id = Uuid::new_v4();
        async {
            let mut report = RunReport::new(run_id);
            info!("Starting run");

            let seen = match self.store.load() {
                Ok(seen) => seen,
                Err(e) => {
                    abort(&mut report, e.to_string());
                    return report;
                }
            };

            let (next_seen, mut report) = self.process_run(run_id, seen).await;
            if report.is_aborted() || report.committed.is_empty() {
                return report;
            }

            if self.options.dry_run {
                info!("Dry run: not saving {} identifiers", report.committed.len());
                return report;
            }

            if let Err(e) = self.store.persist(&next_seen) {
                abort(&mut report, format!("could not save seen-set: {}", e));
            }
            report
        }
        .instrument(info_span!("run", run_id = %run_id))
        .await
    }

    /// Run every stage against `seen` and return the seen-set to keep.
    ///
    /// On abort the returned set is `seen` unchanged.
    pub async fn process(&self, seen: SeenSet) -> (SeenSet, RunReport) {
        let run_id = Uuid::new_v4();
        self.process_run(run_id, seen)
            .instrument(info_span!("run", run_id = %run_id))
            .await
    }

    async fn process_run(&self, run_id: Uuid, seen: SeenSet) -> (SeenSet, RunReport) {
        let mut report = RunReport::new(run_id);

        enter(&mut report, PipelineState::Fetching);
        let fetched = match self.source.search(&self.query).await {
            Ok(papers) => papers,
            Err(e) => {
                abort(&mut report, e.to_string());
                return (seen, report);
            }
        };
        report.fetched = fetched.len();

        enter(&mut report, PipelineState::Filtering);
        let fresh = filter_unseen(fetched, &seen);
        report.new_papers = fresh.len();
        info!("{} of {} fetched papers are new", fresh.len(), report.fetched);

        if fresh.is_empty() {
            info!("Nothing new, no digest sent");
            enter(&mut report, PipelineState::Done);
            return (seen, report);
        }

        enter(&mut report, PipelineState::Summarizing);
        let mut entries = Vec::with_capacity(fresh.len());
        for (i, paper) in fresh.into_iter().enumerate() {
            info!("Summarizing paper {}/{}: {}", i + 1, report.new_papers, paper.id);
            let summary = self.summarizer.summarize(&paper).await;
            if summary.is_success() {
                report.summarized += 1;
            } else {
                report.failed += 1;
            }
            entries.push(DigestEntry { paper, summary });
        }

        enter(&mut report, PipelineState::Rendering);
        let digest = Digest::new(entries, Utc::now());
        let rendered = DigestFormatter::render(&digest);
        let outgoing = OutgoingDigest {
            recipient: self.options.recipient.clone(),
            subject: DigestFormatter::subject(&digest, &self.options.subject_prefix),
            plain_text: rendered.plain_text,
            rich_text: rendered.rich_text,
        };

        enter(&mut report, PipelineState::Delivering);
        if let Err(e) = self.delivery.send(&outgoing).await {
            abort(&mut report, e.to_string());
            return (seen, report);
        }
        report.delivered = true;
        info!("Digest delivered via {}", self.delivery.transport_name());

        enter(&mut report, PipelineState::Persisting);
        let committed: Vec<String> = digest
            .entries
            .iter()
            .filter(|entry| entry.summary.is_success() || self.options.mark_failed_as_seen)
            .map(|entry| entry.paper.id.clone())
            .collect();

        let skipped = digest.entries.len() - committed.len();
        if skipped > 0 {
            warn!("{} failed papers left unseen for the next run", skipped);
        }

        let mut next_seen = seen;
        next_seen.add_all(committed.iter().cloned());
        report.committed = committed;

        enter(&mut report, PipelineState::Done);
        info!(
            "Run finished: {} fetched, {} new, {} summarized, {} failed, {} committed",
            report.fetched,
            report.new_papers,
            report.summarized,
            report.failed,
            report.committed.len()
        );
        (next_seen, report)
    }

    /// Look up and summarize one paper without touching the seen-set.
    pub async fn summarize_paper(&self, id: &str) -> Result<Option<DigestEntry>> {
        let Some(paper) = self.source.fetch_paper(id).await? else {
            return Ok(None);
        };
        let summary = self.summarizer.summarize(&paper).await;
        Ok(Some(DigestEntry { paper, summary }))
    }
}

/// Papers not yet in `seen`, in fetch order. Repeated identifiers keep their
/// first occurrence.
pub fn filter_unseen(papers: Vec<PaperRecord>, seen: &SeenSet) -> Vec<PaperRecord> {
    let mut taken = HashSet::new();
    papers
        .into_iter()
        .filter(|paper| !seen.contains(&paper.id) && taken.insert(paper.id.clone()))
        .collect()
}

fn enter(report: &mut RunReport, state: PipelineState) {
    info!("Stage: {}", state);
    report.final_state = state;
}

fn abort(report: &mut RunReport, reason: String) {
    error!("Run aborted while {}: {}", report.final_state, reason);
    report.final_state = PipelineState::Aborted(reason);
}

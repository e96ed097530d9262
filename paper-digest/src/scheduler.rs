use crate::config::AppConfig;
use crate::pipeline::{DigestPipeline, RunReport};
use crate::types::Result;
use crate::utils::time::format_duration;
use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use tracing::{info, warn};

/// First moment at or after `now` whose time of day is `run_time`.
/// A `now` exactly at `run_time` counts as today's slot.
pub fn next_run_after(now: NaiveDateTime, run_time: NaiveTime) -> NaiveDateTime {
    let today = now.date().and_time(run_time);
    if today >= now {
        today
    } else {
        (now.date() + chrono::Duration::days(1)).and_time(run_time)
    }
}

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Daily driver for `paper-digest schedule`.
pub struct DailyScheduler {
    run_time: NaiveTime,
    run_immediately: bool,
    skip_weekends: bool,
}

impl DailyScheduler {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            run_time: config.run_time()?,
            run_immediately: config.run_immediately,
            skip_weekends: config.skip_weekends,
        })
    }

    /// Whether a run on `date` should be skipped
    pub fn skips(&self, date: NaiveDate) -> bool {
        self.skip_weekends && is_weekend(date)
    }

    /// Run the pipeline every day at `run_time` until Ctrl-C.
    pub async fn run_forever(&self, pipeline: &mut DigestPipeline, config: &AppConfig) -> Result<()> {
        if self.run_immediately {
            info!("Running once at start-up");
            self.run_today(pipeline, config).await;
        }

        loop {
            let now = Local::now().naive_local();
            let next = next_run_after(now, self.run_time);
            let wait = next - now;
            info!("Next run at {} (in {})", next.format("%Y-%m-%d %H:%M"), format_duration(wait));

            let sleep = tokio::time::sleep(wait.to_std().unwrap_or_default());
            tokio::select! {
                _ = sleep => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, stopping scheduler");
                    return Ok(());
                }
            }

            self.run_today(pipeline, config).await;
        }
    }

    async fn run_today(&self, pipeline: &mut DigestPipeline, config: &AppConfig) -> Option<RunReport> {
        let today = Local::now().date_naive();
        if self.skips(today) {
            info!("Skipping run on {} (weekend)", today.format("%A"));
            return None;
        }

        pipeline.set_query(config.search_query(today));
        let report = pipeline.run().await;
        if report.is_aborted() {
            // Keep the scheduler alive; the next slot retries
            warn!("Scheduled run {} did not complete: {}", report.run_id, report.final_state);
        }
        Some(report)
    }
}

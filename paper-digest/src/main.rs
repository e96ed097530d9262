use anyhow::Context;
use chrono::Local;
use clap::{Parser, Subcommand};
use email_delivery::{SendGridConfig, SendGridDelivery, SmtpConfig, SmtpDelivery};
use interfaces::defs::DeliveryClient;
use interfaces::NoopDelivery;
use paper_digest::llm_adapter::build_summarizer;
use paper_digest::{
    AppConfig, ArxivSource, DailyScheduler, DeliveryKind, Digest, DigestFormatter, DigestPipeline, Fetcher,
    PipelineOptions, Secrets, SeenSetStore, Summarizer,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "paper-digest", version, about = "Daily email digest of new arXiv papers")]
struct Cli {
    /// JSON configuration file (defaults to ./config.json when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the pipeline once
    Run {
        /// Log the digest instead of sending it and leave the seen-set alone
        #[arg(long)]
        dry_run: bool,
    },
    /// Run every day at the configured time
    Schedule,
    /// Summarize a single paper and print the result
    Summarize { id: String },
    /// List identifiers in the seen-set
    Seen,
    /// Remove identifiers from the seen-set so they are picked up again
    Forget {
        #[arg(required = true)]
        ids: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    let store = SeenSetStore::new(&config.seen_papers_file);

    match cli.command {
        Command::Run { dry_run } => {
            let today = Local::now().date_naive();
            let scheduler = DailyScheduler::from_config(&config)?;
            if scheduler.skips(today) {
                info!("Skipping run on {} (weekend)", today.format("%A"));
                return Ok(ExitCode::SUCCESS);
            }

            let secrets = Secrets::from_env();
            let pipeline = build_pipeline(&config, &secrets, store, dry_run)?;
            let report = pipeline.run().await;

            if report.is_aborted() {
                error!("Run {} failed: {}", report.run_id, report.final_state);
                eprintln!("paper-digest: run {}", report.final_state);
                return Ok(ExitCode::FAILURE);
            }
            info!(
                "Run {} complete: {} new papers, {} committed",
                report.run_id,
                report.new_papers,
                report.committed.len()
            );
        }
        Command::Schedule => {
            let secrets = Secrets::from_env();
            let scheduler = DailyScheduler::from_config(&config)?;
            let mut pipeline = build_pipeline(&config, &secrets, store, false)?;
            scheduler.run_forever(&mut pipeline, &config).await?;
        }
        Command::Summarize { id } => {
            let secrets = Secrets::from_env();
            let source = build_source(&config)?;
            let summarizer = build_paper_summarizer(&config, &secrets)?;
            let pipeline = DigestPipeline::new(
                Box::new(source),
                summarizer,
                Box::new(NoopDelivery),
                store,
                config.search_query(Local::now().date_naive()),
                pipeline_options(&config, String::new(), true),
            );

            match pipeline.summarize_paper(&id).await? {
                Some(entry) => {
                    let digest = Digest::new(vec![entry], chrono::Utc::now());
                    println!("{}", DigestFormatter::render(&digest).plain_text);
                }
                None => {
                    eprintln!("paper-digest: no paper with id {}", id);
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
        Command::Seen => {
            let seen = store.load()?;
            for id in seen.iter() {
                println!("{}", id);
            }
            info!("{} identifiers in {}", seen.len(), store.path().display());
        }
        Command::Forget { ids } => {
            let mut seen = store.load()?;
            let removed = seen.forget(&ids);
            if removed > 0 {
                store.persist(&seen)?;
            }
            info!("Removed {} of {} identifiers", removed, ids.len());
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn build_source(config: &AppConfig) -> anyhow::Result<ArxivSource> {
    let fetcher = Fetcher::new(config.fetch_config())?;
    Ok(ArxivSource::new(fetcher, &config.arxiv_base_url, config.page_size)?)
}

fn build_paper_summarizer(config: &AppConfig, secrets: &Secrets) -> anyhow::Result<Box<dyn Summarizer>> {
    let api_key = secrets.llm_api_key(config.llm_provider)?;
    let size_checker = Fetcher::new(config.fetch_config())?;
    Ok(build_summarizer(
        config.llm_provider,
        api_key,
        config.llm_model().to_string(),
        config.llm_base_url.clone(),
        config.summarizer_settings(),
        Some(size_checker),
    )?)
}

fn build_delivery(config: &AppConfig, secrets: &Secrets) -> anyhow::Result<Box<dyn DeliveryClient>> {
    let sender = secrets.sender()?;
    let delivery: Box<dyn DeliveryClient> = match config.delivery {
        DeliveryKind::SendGrid => {
            let sendgrid = SendGridConfig::new(secrets.sendgrid_api_key()?, sender);
            Box::new(SendGridDelivery::new(sendgrid)?)
        }
        DeliveryKind::Smtp => {
            let (host, port, username, password) = secrets.smtp()?;
            Box::new(SmtpDelivery::new(SmtpConfig::new(host, port, username, password, sender)))
        }
    };
    Ok(delivery)
}

fn pipeline_options(config: &AppConfig, recipient: String, dry_run: bool) -> PipelineOptions {
    PipelineOptions {
        recipient,
        subject_prefix: config.subject_prefix.clone(),
        mark_failed_as_seen: config.mark_failed_as_seen,
        dry_run,
    }
}

/// Every secret the run needs is checked here, before anything is fetched.
fn build_pipeline(
    config: &AppConfig,
    secrets: &Secrets,
    store: SeenSetStore,
    dry_run: bool,
) -> anyhow::Result<DigestPipeline> {
    let summarizer = build_paper_summarizer(config, secrets)?;

    let (delivery, recipient): (Box<dyn DeliveryClient>, String) = if dry_run {
        let recipient = secrets.recipient_email.clone().unwrap_or_else(|| "dry-run".to_string());
        (Box::new(NoopDelivery), recipient)
    } else {
        (build_delivery(config, secrets)?, secrets.recipient()?)
    };

    info!("Configured with {:?}", secrets);

    Ok(DigestPipeline::new(
        Box::new(build_source(config)?),
        summarizer,
        delivery,
        store,
        config.search_query(Local::now().date_naive()),
        pipeline_options(config, recipient, dry_run),
    ))
}

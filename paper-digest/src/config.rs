//! Layered configuration: built-in defaults, then an optional JSON file, then
//! `PAPER_DIGEST_*` environment variables. Secrets never go through these
//! layers; they are read from the process environment by [`Secrets`].

use crate::llm_adapter::{LlmProviderKind, SummarizerSettings};
use crate::sources::arxiv::DEFAULT_API_URL;
use crate::types::{DigestError, FetchConfig, Result, SearchQuery};
use chrono::{Days, NaiveDate, NaiveTime};
use figment::{
    providers::{Env, Format, Json, Serialized},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "config.json";
pub const ENV_PREFIX: &str = "PAPER_DIGEST_";

const MAX_DAYS_BACK: u32 = 3650;
const MAX_RETRIES: u32 = 10;
const MAX_RETRY_DELAY_SECS: u64 = 300;
const MAX_REQUEST_INTERVAL_SECS: u64 = 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryKind {
    SendGrid,
    Smtp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub llm_provider: LlmProviderKind,
    pub anthropic_model: String,
    pub openai_model: String,
    /// Overrides the provider's API root, e.g. for a proxy
    pub llm_base_url: Option<String>,
    pub llm_timeout_secs: u64,
    pub llm_max_retries: u32,
    pub max_tokens: u32,
    pub max_document_bytes: u64,
    pub max_prompt_bytes: usize,

    pub search_terms: Vec<String>,
    pub categories: Vec<String>,
    pub max_results: usize,
    pub days_back: u32,
    pub page_size: usize,
    pub arxiv_base_url: String,

    /// Local time of day for scheduled runs, `HH:MM`
    pub run_time: String,
    pub run_immediately: bool,
    pub skip_weekends: bool,

    pub seen_papers_file: String,
    pub mark_failed_as_seen: bool,
    pub delivery: DeliveryKind,
    pub subject_prefix: String,

    pub request_interval_secs: u64,
    pub http_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_delay_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm_provider: LlmProviderKind::Anthropic,
            anthropic_model: "claude-opus-4-20250514".to_string(),
            openai_model: "gpt-4".to_string(),
            llm_base_url: None,
            llm_timeout_secs: 180,
            llm_max_retries: 2,
            max_tokens: 5000,
            max_document_bytes: 32_000_000,
            max_prompt_bytes: 200_000,
            search_terms: vec![
                "interpretability".to_string(),
                "explainability".to_string(),
                "xai".to_string(),
            ],
            categories: vec!["cs.AI".to_string(), "cs.LG".to_string(), "cs.CL".to_string()],
            max_results: 50,
            days_back: 7,
            page_size: 50,
            arxiv_base_url: DEFAULT_API_URL.to_string(),
            run_time: "08:00".to_string(),
            run_immediately: false,
            skip_weekends: false,
            seen_papers_file: "seen_papers.json".to_string(),
            mark_failed_as_seen: false,
            delivery: DeliveryKind::SendGrid,
            subject_prefix: "arXiv Papers".to_string(),
            request_interval_secs: 3,
            http_timeout_secs: 30,
            max_retries: 3,
            retry_delay_secs: 2,
        }
    }
}

impl AppConfig {
    /// Load and validate configuration.
    ///
    /// With `path = None` the default `config.json` is used if it exists. An
    /// explicitly named file must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) if !path.exists() => {
                return Err(DigestError::Config(format!(
                    "config file {} does not exist",
                    path.display()
                )))
            }
            Some(path) => path.to_path_buf(),
            None => Path::new(DEFAULT_CONFIG_FILE).to_path_buf(),
        };

        let config: AppConfig = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Json::file(file))
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.run_time()?;

        if self.max_results == 0 {
            return Err(DigestError::Config("max_results must be greater than 0".to_string()));
        }
        if self.page_size == 0 {
            return Err(DigestError::Config("page_size must be greater than 0".to_string()));
        }
        if self.search_terms.iter().all(|t| t.trim().is_empty()) && self.categories.is_empty() {
            return Err(DigestError::Config(
                "at least one search term or category is required".to_string(),
            ));
        }
        if self.days_back > MAX_DAYS_BACK {
            return Err(DigestError::Config(format!(
                "days_back must be at most {}, got {}",
                MAX_DAYS_BACK, self.days_back
            )));
        }
        for (name, value) in [("max_retries", self.max_retries), ("llm_max_retries", self.llm_max_retries)] {
            if value > MAX_RETRIES {
                return Err(DigestError::Config(format!(
                    "{} must be at most {}, got {}",
                    name, MAX_RETRIES, value
                )));
            }
        }
        if self.retry_delay_secs > MAX_RETRY_DELAY_SECS {
            return Err(DigestError::Config(format!(
                "retry_delay_secs must be at most {}, got {}",
                MAX_RETRY_DELAY_SECS, self.retry_delay_secs
            )));
        }
        if self.request_interval_secs > MAX_REQUEST_INTERVAL_SECS {
            return Err(DigestError::Config(format!(
                "request_interval_secs must be at most {}, got {}",
                MAX_REQUEST_INTERVAL_SECS, self.request_interval_secs
            )));
        }
        if self.http_timeout_secs == 0 || self.llm_timeout_secs == 0 {
            return Err(DigestError::Config(
                "http_timeout_secs and llm_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.seen_papers_file.trim().is_empty() {
            return Err(DigestError::Config("seen_papers_file must not be empty".to_string()));
        }
        url::Url::parse(&self.arxiv_base_url)?;

        Ok(())
    }

    pub fn run_time(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(self.run_time.trim(), "%H:%M").map_err(|e| {
            DigestError::Config(format!("run_time {:?} is not HH:MM: {}", self.run_time, e))
        })
    }

    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            timeout_seconds: self.http_timeout_secs,
            max_retries: self.max_retries,
            retry_delay_seconds: self.retry_delay_secs,
            request_interval_ms: self.request_interval_secs * 1000,
            ..FetchConfig::default()
        }
    }

    pub fn summarizer_settings(&self) -> SummarizerSettings {
        SummarizerSettings {
            max_tokens: self.max_tokens,
            timeout: Duration::from_secs(self.llm_timeout_secs),
            max_retries: self.llm_max_retries,
            retry_delay: Duration::from_secs(self.retry_delay_secs),
            max_document_bytes: self.max_document_bytes,
            max_prompt_bytes: self.max_prompt_bytes,
            focus_topics: self.search_terms.clone(),
        }
    }

    /// Query covering the last `days_back` days up to `today`.
    pub fn search_query(&self, today: NaiveDate) -> SearchQuery {
        SearchQuery {
            terms: self.search_terms.clone(),
            categories: self.categories.iter().cloned().collect(),
            since: today
                .checked_sub_days(Days::new(u64::from(self.days_back)))
                .unwrap_or(NaiveDate::MIN),
            max_results: self.max_results,
        }
    }

    pub fn llm_model(&self) -> &str {
        match self.llm_provider {
            LlmProviderKind::Anthropic => &self.anthropic_model,
            LlmProviderKind::OpenAi => &self.openai_model,
        }
    }
}

/// Credentials and addresses taken from the environment (`.env` honoured).
#[derive(Clone, Default)]
pub struct Secrets {
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub sendgrid_api_key: Option<String>,
    pub sender_email: Option<String>,
    pub recipient_email: Option<String>,
    pub smtp_host: Option<String>,
    pub smtp_port: Option<String>,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
}

impl Secrets {
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            anthropic_api_key: var("ANTHROPIC_API_KEY"),
            openai_api_key: var("OPENAI_API_KEY"),
            sendgrid_api_key: var("SENDGRID_API_KEY"),
            sender_email: var("SENDER_EMAIL"),
            recipient_email: var("RECIPIENT_EMAIL"),
            smtp_host: var("SMTP_HOST"),
            smtp_port: var("SMTP_PORT"),
            smtp_username: var("SMTP_USERNAME"),
            smtp_password: var("SMTP_PASSWORD"),
        }
    }

    pub fn llm_api_key(&self, provider: LlmProviderKind) -> Result<String> {
        match provider {
            LlmProviderKind::Anthropic => require(&self.anthropic_api_key, "ANTHROPIC_API_KEY"),
            LlmProviderKind::OpenAi => require(&self.openai_api_key, "OPENAI_API_KEY"),
        }
    }

    pub fn recipient(&self) -> Result<String> {
        require(&self.recipient_email, "RECIPIENT_EMAIL")
    }

    pub fn sender(&self) -> Result<String> {
        require(&self.sender_email, "SENDER_EMAIL")
    }

    pub fn sendgrid_api_key(&self) -> Result<String> {
        require(&self.sendgrid_api_key, "SENDGRID_API_KEY")
    }

    /// Host, port, username and password for the SMTP relay. Port defaults to 587.
    pub fn smtp(&self) -> Result<(String, u16, String, String)> {
        let port = match &self.smtp_port {
            Some(port) => port
                .trim()
                .parse()
                .map_err(|_| DigestError::Config(format!("SMTP_PORT {:?} is not a port number", port)))?,
            None => 587,
        };
        Ok((
            require(&self.smtp_host, "SMTP_HOST")?,
            port,
            require(&self.smtp_username, "SMTP_USERNAME")?,
            require(&self.smtp_password, "SMTP_PASSWORD")?,
        ))
    }
}

fn require(value: &Option<String>, name: &str) -> Result<String> {
    value
        .clone()
        .ok_or_else(|| DigestError::Config(format!("environment variable {} is not set", name)))
}

fn redact(value: &Option<String>) -> &'static str {
    if value.is_some() {
        "<set>"
    } else {
        "<unset>"
    }
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets")
            .field("anthropic_api_key", &redact(&self.anthropic_api_key))
            .field("openai_api_key", &redact(&self.openai_api_key))
            .field("sendgrid_api_key", &redact(&self.sendgrid_api_key))
            .field("sender_email", &redact(&self.sender_email))
            .field("recipient_email", &redact(&self.recipient_email))
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &redact(&self.smtp_username))
            .field("smtp_password", &redact(&self.smtp_password))
            .finish()
    }
}

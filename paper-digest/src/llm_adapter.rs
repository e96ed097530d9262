use crate::fetcher::Fetcher;
use crate::traits::Summarizer;
use crate::types::{FailureKind, PaperRecord, SummaryResult};
use crate::utils::text::strip_list_marker;
use async_trait::async_trait;
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const USER_AGENT: &str = concat!("paper-digest/", env!("CARGO_PKG_VERSION"));

fn http_client(timeout: Duration) -> crate::types::Result<Client> {
    Ok(Client::builder().user_agent(USER_AGENT).timeout(timeout).build()?)
}

/// Which language-model backend summarizes papers. Chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProviderKind {
    Anthropic,
    OpenAi,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("no response within the time limit")]
    Timeout,

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("request rejected with HTTP {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("unexpected response shape: {0}")]
    Malformed(String),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::Timeout | ProviderError::Transient(_))
    }

    pub fn failure_kind(&self) -> FailureKind {
        match self {
            ProviderError::Timeout => FailureKind::Timeout,
            ProviderError::Transient(_) | ProviderError::Rejected { .. } => FailureKind::ProviderError,
            ProviderError::Malformed(_) => FailureKind::MalformedOutput,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else if err.is_decode() {
            ProviderError::Malformed(err.to_string())
        } else {
            ProviderError::Transient(err.to_string())
        }
    }
}

fn status_error(status: StatusCode, body: &str) -> ProviderError {
    // Both providers wrap errors as {"error": {"message": "..."}}
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string());

    // 529 is Anthropic's "overloaded"
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 529 {
        ProviderError::Transient(format!("HTTP {}: {}", status.as_u16(), message))
    } else {
        ProviderError::Rejected {
            status: status.as_u16(),
            message,
        }
    }
}

/// One completion call: a prompt plus, for providers that can fetch it, a document URL.
#[derive(Debug, Clone)]
pub struct CompletionRequest<'a> {
    pub prompt: &'a str,
    pub document_url: Option<&'a str>,
    pub max_tokens: u32,
}

/// A language-model backend able to answer a single completion request.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn provider_name(&self) -> String;

    /// Whether the provider can read a PDF by URL on its own
    fn accepts_document_url(&self) -> bool;

    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, ProviderError>;
}

/// Anthropic Messages API. The PDF is attached as a `document` block.
pub struct AnthropicProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl AnthropicProvider {
    pub fn new(api_key: String, model: String, timeout: Duration) -> crate::types::Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: ANTHROPIC_BASE_URL.to_string(),
            api_key,
            model,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn build_request_body(&self, request: &CompletionRequest<'_>) -> Value {
        let mut content = Vec::new();
        if let Some(url) = request.document_url {
            content.push(json!({
                "type": "document",
                "source": { "type": "url", "url": url },
            }));
        }
        content.push(json!({ "type": "text", "text": request.prompt }));

        json!({
            "model": self.model,
            "max_tokens": request.max_tokens,
            "messages": [{ "role": "user", "content": content }],
        })
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn provider_name(&self) -> String {
        format!("anthropic ({})", self.model)
    }

    fn accepts_document_url(&self) -> bool {
        true
    }

    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, ProviderError> {
        let url = format!("{}/messages", self.base_url.trim_end_matches('/'));
        debug!("POST {} (model {})", url, self.model);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&self.build_request_body(request))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(status_error(status, &body));
        }

        let value: Value = serde_json::from_str(&body)
            .map_err(|e| ProviderError::Malformed(format!("invalid JSON: {}", e)))?;

        value["content"]
            .as_array()
            .and_then(|blocks| {
                blocks
                    .iter()
                    .find(|block| block["type"] == "text")
                    .and_then(|block| block["text"].as_str())
            })
            .map(str::to_string)
            .ok_or_else(|| ProviderError::Malformed("no text block in response".to_string()))
    }
}

/// OpenAI Chat Completions. Paper metadata travels inside the prompt.
pub struct OpenAiProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, model: String, timeout: Duration) -> crate::types::Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: OPENAI_BASE_URL.to_string(),
            api_key,
            model,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn provider_name(&self) -> String {
        format!("openai ({})", self.model)
    }

    fn accepts_document_url(&self) -> bool {
        false
    }

    async fn complete(&self, request: &CompletionRequest<'_>) -> Result<String, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        debug!("POST {} (model {})", url, self.model);

        let body = json!({
            "model": self.model,
            "max_tokens": request.max_tokens,
            "messages": [{ "role": "user", "content": request.prompt }],
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(status_error(status, &text));
        }

        let value: Value = serde_json::from_str(&text)
            .map_err(|e| ProviderError::Malformed(format!("invalid JSON: {}", e)))?;

        value["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ProviderError::Malformed("no message content in response".to_string()))
    }
}

#[derive(Debug, Clone)]
pub struct SummarizerSettings {
    pub max_tokens: u32,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub max_document_bytes: u64,
    pub max_prompt_bytes: usize,
    /// Topics the summary should relate the paper to
    pub focus_topics: Vec<String>,
}

impl Default for SummarizerSettings {
    fn default() -> Self {
        Self {
            max_tokens: 5000,
            timeout: Duration::from_secs(180),
            max_retries: 2,
            retry_delay: Duration::from_secs(1),
            max_document_bytes: 32_000_000,
            max_prompt_bytes: 200_000,
            focus_topics: Vec::new(),
        }
    }
}

/// The four sections pulled out of a model answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSummary {
    pub synopsis: String,
    pub methods: Vec<String>,
    pub contributions: Vec<String>,
    pub limitations: Vec<String>,
}

/// Summarizer that drives any `LlmProvider`.
pub struct PaperSummarizer<P: LlmProvider> {
    provider: P,
    settings: SummarizerSettings,
    size_checker: Option<Fetcher>,
}

impl<P: LlmProvider> PaperSummarizer<P> {
    pub fn new(provider: P, settings: SummarizerSettings) -> Self {
        Self {
            provider,
            settings,
            size_checker: None,
        }
    }

    /// Check PDF sizes with a HEAD request before handing the URL to the provider.
    pub fn with_size_checker(mut self, fetcher: Fetcher) -> Self {
        self.size_checker = Some(fetcher);
        self
    }

    /// Returns a failure result when the document is known to be too large.
    async fn check_document_size(&self, paper: &PaperRecord, document_url: &str) -> Option<SummaryResult> {
        let checker = self.size_checker.as_ref()?;
        let url = Url::parse(document_url).ok()?;

        match checker.content_length(&url).await {
            Ok(Some(length)) if length > self.settings.max_document_bytes => Some(SummaryResult::failed(
                &paper.id,
                FailureKind::ContentTooLarge,
                format!(
                    "document is {} bytes, limit is {} bytes",
                    length, self.settings.max_document_bytes
                ),
            )),
            Ok(_) => None,
            Err(e) => {
                // The provider fetches the document itself, so let it try
                warn!("Could not read size of {}: {}", document_url, e);
                None
            }
        }
    }

    async fn complete_with_retry(&self, request: &CompletionRequest<'_>, paper_id: &str) -> Result<String, ProviderError> {
        let mut backoff = ExponentialBackoff::<backoff::SystemClock> {
            current_interval: self.settings.retry_delay,
            initial_interval: self.settings.retry_delay,
            max_interval: self.settings.retry_delay * 16,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        };

        let mut attempt = 0;
        loop {
            let outcome = match tokio::time::timeout(self.settings.timeout, self.provider.complete(request)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(ProviderError::Timeout),
            };

            match outcome {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt < self.settings.max_retries => {
                    attempt += 1;
                    let delay = backoff.next_backoff().unwrap_or(self.settings.retry_delay);
                    warn!("Summarizing {} failed ({}), retry {} in {:?}", paper_id, e, attempt, delay);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl<P: LlmProvider> Summarizer for PaperSummarizer<P> {
    fn summarizer_name(&self) -> String {
        self.provider.provider_name()
    }

    async fn summarize(&self, paper: &PaperRecord) -> SummaryResult {
        let document_url = if self.provider.accepts_document_url() {
            paper.pdf_url.as_deref()
        } else {
            None
        };

        if let Some(url) = document_url {
            if let Some(rejected) = self.check_document_size(paper, url).await {
                warn!("Skipping {}: document too large", paper.id);
                return rejected;
            }
        }

        let prompt = build_prompt(paper, document_url.is_none(), &self.settings.focus_topics);
        if prompt.len() > self.settings.max_prompt_bytes {
            return SummaryResult::failed(
                &paper.id,
                FailureKind::ContentTooLarge,
                format!(
                    "prompt is {} bytes, limit is {} bytes",
                    prompt.len(),
                    self.settings.max_prompt_bytes
                ),
            );
        }

        let request = CompletionRequest {
            prompt: &prompt,
            document_url,
            max_tokens: self.settings.max_tokens,
        };

        let answer = match self.complete_with_retry(&request, &paper.id).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!("Summarization of {} failed: {}", paper.id, e);
                return SummaryResult::failed(&paper.id, e.failure_kind(), e.to_string());
            }
        };

        match parse_model_output(&answer) {
            Ok(parsed) => {
                info!("Summarized {} with {}", paper.id, self.provider.provider_name());
                SummaryResult::succeeded(
                    &paper.id,
                    parsed.synopsis,
                    parsed.methods,
                    parsed.contributions,
                    parsed.limitations,
                )
            }
            Err(reason) => {
                warn!("Unusable answer for {}: {}", paper.id, reason);
                SummaryResult::failed(&paper.id, FailureKind::MalformedOutput, reason)
            }
        }
    }
}

/// Build the instruction sent with each paper.
///
/// With `embed_metadata` the paper's title, authors, categories and abstract
/// are written into the prompt (for providers that cannot read the PDF).
pub fn build_prompt(paper: &PaperRecord, embed_metadata: bool, focus_topics: &[String]) -> String {
    let mut prompt = String::new();

    if embed_metadata {
        prompt.push_str("Summarize the research paper described below.\n\n");
        prompt.push_str(&format!("Title: {}\n", paper.title));
        prompt.push_str(&format!("Authors: {}\n", paper.authors.join(", ")));
        if !paper.categories.is_empty() {
            let categories: Vec<&str> = paper.categories.iter().map(String::as_str).collect();
            prompt.push_str(&format!("Categories: {}\n", categories.join(", ")));
        }
        prompt.push_str(&format!("Abstract: {}\n\n", paper.abstract_text));
    } else {
        prompt.push_str("The attached PDF is a research paper. Read all of it and summarize it.\n\n");
    }

    prompt.push_str(
        "Provide:\n\
         1. A concise summary (250-300 words) of the main contributions and findings\n\
         2. The key methods used\n\
         3. The key contributions\n\
         4. Any notable limitations\n\n",
    );

    if !focus_topics.is_empty() {
        prompt.push_str(&format!(
            "Pay particular attention to how the paper relates to: {}.\n\n",
            focus_topics.join(", ")
        ));
    }

    prompt.push_str(
        "Write the final answer inside these XML tags, one item per line in the list sections:\n\
         <summary></summary>\n\
         <methods></methods>\n\
         <contributions></contributions>\n\
         <limitations></limitations>\n\n\
         You may plan your answer outside the tags first.",
    );

    prompt
}

/// Extract the tagged sections from a model answer.
///
/// A missing or empty `<summary>` is an error; the list sections default to empty.
pub fn parse_model_output(text: &str) -> Result<ParsedSummary, String> {
    let synopsis = extract_tag(text, "summary")
        .filter(|s| !s.is_empty())
        .ok_or_else(|| "answer has no <summary> section".to_string())?;

    let list = |tag: &str| -> Vec<String> {
        extract_tag(text, tag)
            .map(|section| {
                section
                    .lines()
                    .map(strip_list_marker)
                    .filter(|line| !line.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    };

    Ok(ParsedSummary {
        synopsis,
        methods: list("methods"),
        contributions: list("contributions"),
        limitations: list("limitations"),
    })
}

/// Content of the last complete `<tag>...</tag>` pair, trimmed. Tag match is
/// ASCII case-insensitive.
fn extract_tag(text: &str, tag: &str) -> Option<String> {
    // ASCII lowercasing keeps byte offsets valid for `text`
    let lower = text.to_ascii_lowercase();
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);

    let mut search_end = lower.len();
    while let Some(start) = lower[..search_end].rfind(&open) {
        let content_start = start + open.len();
        if let Some(len) = lower[content_start..].find(&close) {
            return Some(text[content_start..content_start + len].trim().to_string());
        }
        search_end = start;
    }
    None
}

/// Pick the provider named in configuration and wrap it in a `Summarizer`.
pub fn build_summarizer(
    kind: LlmProviderKind,
    api_key: String,
    model: String,
    base_url: Option<String>,
    settings: SummarizerSettings,
    size_checker: Option<Fetcher>,
) -> crate::types::Result<Box<dyn Summarizer>> {
    let summarizer: Box<dyn Summarizer> = match kind {
        LlmProviderKind::Anthropic => {
            let mut provider = AnthropicProvider::new(api_key, model, settings.timeout)?;
            if let Some(base_url) = base_url {
                provider = provider.with_base_url(base_url);
            }
            let mut summarizer = PaperSummarizer::new(provider, settings);
            if let Some(checker) = size_checker {
                summarizer = summarizer.with_size_checker(checker);
            }
            Box::new(summarizer)
        }
        LlmProviderKind::OpenAi => {
            let mut provider = OpenAiProvider::new(api_key, model, settings.timeout)?;
            if let Some(base_url) = base_url {
                provider = provider.with_base_url(base_url);
            }
            // OpenAI never receives the PDF URL, so a size check would be wasted
            Box::new(PaperSummarizer::new(provider, settings))
        }
    };
    Ok(summarizer)
}

mod common;

use async_trait::async_trait;
use common::{init_tracing, paper};
use paper_digest::llm_adapter::{
    build_prompt, build_summarizer, parse_model_output, CompletionRequest, LlmProviderKind, ProviderError,
    SummarizerSettings,
};
use paper_digest::{
    AnthropicProvider, FailureKind, Fetcher, LlmProvider, OpenAiProvider, PaperSummarizer, Summarizer,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, header_regex, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const GOOD_ANSWER: &str = "Let me plan: the paper studies classifiers. <summary> is the tag.\n\
    <summary>\nThe paper trains sparse classifiers on model activations.\n</summary>\n\
    <methods>\n- Sparse linear classifiers\n- Activation patching\n</methods>\n\
    <contributions>\n1. A feature benchmark\n2) Open-source code\n</contributions>\n\
    <limitations>\n* Only small models\n</limitations>";

struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<String, ProviderError>>>,
    calls: Arc<AtomicUsize>,
    delay: Option<Duration>,
    accepts_document_url: bool,
}

impl ScriptedProvider {
    fn new(replies: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            calls: Arc::new(AtomicUsize::new(0)),
            delay: None,
            accepts_document_url: false,
        }
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn reading_documents(mut self) -> Self {
        self.accepts_document_url = true;
        self
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn provider_name(&self) -> String {
        "scripted".to_string()
    }

    fn accepts_document_url(&self) -> bool {
        self.accepts_document_url
    }

    async fn complete(&self, _request: &CompletionRequest<'_>) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::Malformed("script exhausted".to_string())))
    }
}

fn settings() -> SummarizerSettings {
    SummarizerSettings {
        timeout: Duration::from_secs(5),
        retry_delay: Duration::ZERO,
        max_retries: 2,
        ..SummarizerSettings::default()
    }
}

#[test]
fn test_parse_model_output_takes_tagged_sections() {
    let parsed = parse_model_output(GOOD_ANSWER).unwrap();

    assert_eq!(parsed.synopsis, "The paper trains sparse classifiers on model activations.");
    assert_eq!(parsed.methods, vec!["Sparse linear classifiers", "Activation patching"]);
    assert_eq!(parsed.contributions, vec!["A feature benchmark", "Open-source code"]);
    assert_eq!(parsed.limitations, vec!["Only small models"]);
}

#[test]
fn test_parse_model_output_is_case_insensitive_and_lists_optional() {
    let parsed = parse_model_output("<SUMMARY>Short.</SUMMARY>").unwrap();
    assert_eq!(parsed.synopsis, "Short.");
    assert!(parsed.methods.is_empty());
    assert!(parsed.limitations.is_empty());
}

#[test]
fn test_parse_model_output_requires_summary() {
    assert!(parse_model_output("Here is my summary of the paper, without tags.").is_err());
    assert!(parse_model_output("<summary>   </summary><methods>- x</methods>").is_err());
}

#[test]
fn test_prompt_embeds_metadata_only_without_document() {
    let record = paper("2401.00001");
    let topics = vec!["interpretability".to_string()];

    let with_metadata = build_prompt(&record, true, &topics);
    assert!(with_metadata.contains("Title: Paper 2401.00001"));
    assert!(with_metadata.contains("Abstract of 2401.00001"));
    assert!(with_metadata.contains("interpretability"));
    assert!(with_metadata.contains("<summary></summary>"));

    let with_document = build_prompt(&record, false, &topics);
    assert!(!with_document.contains("Abstract of 2401.00001"));
}

#[tokio::test]
async fn test_summarize_success() {
    init_tracing();

    let provider = ScriptedProvider::new(vec![Ok(GOOD_ANSWER.to_string())]);
    let summarizer = PaperSummarizer::new(provider, settings());

    let result = summarizer.summarize(&paper("2401.00001")).await;
    assert!(result.is_success());
    assert_eq!(result.paper_id, "2401.00001");
    assert_eq!(result.methods.len(), 2);
}

#[tokio::test]
async fn test_transient_errors_are_retried() {
    let provider = ScriptedProvider::new(vec![
        Err(ProviderError::Transient("HTTP 529: overloaded".to_string())),
        Err(ProviderError::Transient("connection reset".to_string())),
        Ok(GOOD_ANSWER.to_string()),
    ]);
    let calls = provider.calls.clone();
    let summarizer = PaperSummarizer::new(provider, settings());

    let result = summarizer.summarize(&paper("2401.00001")).await;
    assert!(result.is_success());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_rejected_request_is_not_retried() {
    let provider = ScriptedProvider::new(vec![Err(ProviderError::Rejected {
        status: 400,
        message: "bad model".to_string(),
    })]);
    let calls = provider.calls.clone();
    let summarizer = PaperSummarizer::new(provider, settings());

    let result = summarizer.summarize(&paper("2401.00001")).await;
    let (kind, reason) = result.failure().unwrap();
    assert_eq!(kind, FailureKind::ProviderError);
    assert!(reason.contains("bad model"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_slow_provider_times_out() {
    let provider = ScriptedProvider::new(vec![]).slow(Duration::from_secs(5));
    let calls = provider.calls.clone();
    let summarizer = PaperSummarizer::new(
        provider,
        SummarizerSettings {
            timeout: Duration::from_millis(50),
            max_retries: 1,
            ..settings()
        },
    );

    let result = summarizer.summarize(&paper("2401.00001")).await;
    assert_eq!(result.failure().map(|(kind, _)| kind), Some(FailureKind::Timeout));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_untagged_answer_is_malformed_output() {
    let provider = ScriptedProvider::new(vec![Ok("I could not read the PDF.".to_string())]);
    let calls = provider.calls.clone();
    let summarizer = PaperSummarizer::new(provider, settings());

    let result = summarizer.summarize(&paper("2401.00001")).await;
    assert_eq!(result.failure().map(|(kind, _)| kind), Some(FailureKind::MalformedOutput));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_oversized_prompt_is_content_too_large() {
    let provider = ScriptedProvider::new(vec![Ok(GOOD_ANSWER.to_string())]);
    let calls = provider.calls.clone();
    let summarizer = PaperSummarizer::new(
        provider,
        SummarizerSettings {
            max_prompt_bytes: 64,
            ..settings()
        },
    );

    let result = summarizer.summarize(&paper("2401.00001")).await;
    assert_eq!(result.failure().map(|(kind, _)| kind), Some(FailureKind::ContentTooLarge));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_oversized_document_is_content_too_large() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/pdf/2401.00001"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 4096]))
        .mount(&server)
        .await;

    let provider = ScriptedProvider::new(vec![Ok(GOOD_ANSWER.to_string())]).reading_documents();
    let calls = provider.calls.clone();
    let summarizer = PaperSummarizer::new(
        provider,
        SummarizerSettings {
            max_document_bytes: 1024,
            ..settings()
        },
    )
    .with_size_checker(Fetcher::new(common::fast_fetch_config()).unwrap());

    let mut record = paper("2401.00001");
    record.pdf_url = Some(format!("{}/pdf/2401.00001", server.uri()));

    let result = summarizer.summarize(&record).await;
    let (kind, reason) = result.failure().unwrap();
    assert_eq!(kind, FailureKind::ContentTooLarge);
    assert!(reason.contains("4096"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_anthropic_provider_sends_document_block() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "sk-ant-test"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(header_regex("user-agent", "^paper-digest/"))
        .and(body_partial_json(serde_json::json!({
            "model": "claude-test",
            "max_tokens": 5000,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "msg_1",
            "type": "message",
            "content": [{ "type": "text", "text": GOOD_ANSWER }],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = AnthropicProvider::new("sk-ant-test".to_string(), "claude-test".to_string(), Duration::from_secs(30))
        .unwrap()
        .with_base_url(format!("{}/v1", server.uri()));
    let summarizer = PaperSummarizer::new(provider, settings());

    let result = summarizer.summarize(&paper("2401.00001")).await;
    assert!(result.is_success(), "{:?}", result.status);

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let content = &body["messages"][0]["content"];
    assert_eq!(content[0]["type"], "document");
    assert_eq!(content[0]["source"]["url"], "https://arxiv.org/pdf/2401.00001");
    assert_eq!(content[1]["type"], "text");
}

#[tokio::test]
async fn test_anthropic_overload_then_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(529).set_body_json(serde_json::json!({
            "type": "error",
            "error": { "type": "overloaded_error", "message": "Overloaded" },
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "content": [{ "type": "text", "text": "<summary>Recovered.</summary>" }],
        })))
        .mount(&server)
        .await;

    let provider = AnthropicProvider::new("sk-ant-test".to_string(), "claude-test".to_string(), Duration::from_secs(30))
        .unwrap()
        .with_base_url(format!("{}/v1", server.uri()));
    let summarizer = PaperSummarizer::new(provider, settings());

    let result = summarizer.summarize(&paper("2401.00001")).await;
    assert_eq!(result.synopsis, "Recovered.");
}

#[tokio::test]
async fn test_openai_provider_rejection_is_provider_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-openai-test"))
        .and(header_regex("user-agent", "^paper-digest/"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "error": { "message": "Incorrect API key provided" },
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = OpenAiProvider::new("sk-openai-test".to_string(), "gpt-test".to_string(), Duration::from_secs(30))
        .unwrap()
        .with_base_url(format!("{}/v1", server.uri()));
    let summarizer = PaperSummarizer::new(provider, settings());

    let result = summarizer.summarize(&paper("2401.00001")).await;
    let (kind, reason) = result.failure().unwrap();
    assert_eq!(kind, FailureKind::ProviderError);
    assert!(reason.contains("Incorrect API key"));
}

#[tokio::test]
async fn test_openai_provider_reads_message_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{ "index": 0, "message": { "role": "assistant", "content": GOOD_ANSWER } }],
        })))
        .mount(&server)
        .await;

    let provider = OpenAiProvider::new("sk-openai-test".to_string(), "gpt-test".to_string(), Duration::from_secs(30))
        .unwrap()
        .with_base_url(format!("{}/v1", server.uri()));
    let summarizer = PaperSummarizer::new(provider, settings());

    let result = summarizer.summarize(&paper("2401.00001")).await;
    assert!(result.is_success());

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let prompt = body["messages"][0]["content"].as_str().unwrap();
    assert!(prompt.contains("Title: Paper 2401.00001"));
}

#[tokio::test]
async fn test_built_summarizer_uses_configured_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header_regex("user-agent", "^paper-digest/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{ "index": 0, "message": { "role": "assistant", "content": GOOD_ANSWER } }],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let summarizer = build_summarizer(
        LlmProviderKind::OpenAi,
        "sk-openai-test".to_string(),
        "gpt-test".to_string(),
        Some(format!("{}/v1", server.uri())),
        settings(),
        None,
    )
    .unwrap();

    assert!(summarizer.summarize(&paper("2401.00001")).await.is_success());
}

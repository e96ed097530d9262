use async_trait::async_trait;
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use interfaces::defs::{DeliveryClient, DeliveryError, OutgoingDigest};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const DEFAULT_BASE_URL: &str = "https://api.sendgrid.com";

#[derive(Clone)]
pub struct SendGridConfig {
    pub api_key: String,
    pub sender_email: String,
    pub base_url: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
}

impl SendGridConfig {
    pub fn new(api_key: String, sender_email: String) -> Self {
        Self {
            api_key,
            sender_email,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_seconds: 30,
            max_retries: 3,
            retry_delay_seconds: 2,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Serialize)]
struct Address<'a> {
    email: &'a str,
}

#[derive(Serialize)]
struct Personalization<'a> {
    to: Vec<Address<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(rename = "type")]
    content_type: &'a str,
    value: &'a str,
}

#[derive(Serialize)]
struct MailSend<'a> {
    personalizations: Vec<Personalization<'a>>,
    from: Address<'a>,
    subject: &'a str,
    content: Vec<Content<'a>>,
}

/// Delivers digests through the SendGrid v3 mail send endpoint.
pub struct SendGridDelivery {
    client: Client,
    config: SendGridConfig,
}

impl SendGridDelivery {
    pub fn new(config: SendGridConfig) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| DeliveryError::failed(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/v3/mail/send", self.config.base_url.trim_end_matches('/'))
    }

    fn build_body<'a>(&'a self, digest: &'a OutgoingDigest) -> MailSend<'a> {
        // SendGrid requires text/plain to come before text/html
        MailSend {
            personalizations: vec![Personalization {
                to: vec![Address { email: &digest.recipient }],
            }],
            from: Address { email: &self.config.sender_email },
            subject: &digest.subject,
            content: vec![
                Content { content_type: "text/plain", value: &digest.plain_text },
                Content { content_type: "text/html", value: &digest.rich_text },
            ],
        }
    }

    fn backoff(&self) -> ExponentialBackoff<backoff::SystemClock> {
        let base = Duration::from_secs(self.config.retry_delay_seconds);
        ExponentialBackoff {
            current_interval: base,
            initial_interval: base,
            max_interval: base * 32,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
}

#[async_trait]
impl DeliveryClient for SendGridDelivery {
    fn transport_name(&self) -> String {
        "sendgrid".to_string()
    }

    async fn send(&self, digest: &OutgoingDigest) -> Result<(), DeliveryError> {
        let body = self.build_body(digest);
        let url = self.endpoint();
        let mut backoff = self.backoff();
        let mut last_error = String::from("no attempt made");

        for attempt in 0..=self.config.max_retries {
            debug!("Sending digest via SendGrid (attempt {})", attempt + 1);

            let retryable = match self
                .client
                .post(&url)
                .bearer_auth(&self.config.api_key)
                .json(&body)
                .send()
                .await
            {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        info!("Email accepted by SendGrid ({})", status.as_u16());
                        return Ok(());
                    }

                    let detail = response.text().await.unwrap_or_default();
                    last_error = format!("HTTP {}: {}", status.as_u16(), detail.trim());
                    is_retryable(status)
                }
                Err(e) => {
                    last_error = e.to_string();
                    e.is_timeout() || e.is_connect()
                }
            };

            if !retryable {
                break;
            }

            if attempt < self.config.max_retries {
                if let Some(delay) = backoff.next_backoff() {
                    warn!("SendGrid attempt {} failed ({}), retrying in {:?}", attempt + 1, last_error, delay);
                    tokio::time::sleep(delay).await;
                }
            }
        }

        error!("SendGrid delivery failed: {}", last_error);
        Err(DeliveryError::failed(last_error))
    }
}

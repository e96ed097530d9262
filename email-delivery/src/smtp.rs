use async_trait::async_trait;
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use interfaces::defs::{DeliveryClient, DeliveryError, OutgoingDigest};
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::Error as SmtpError;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub sender_email: String,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
}

impl SmtpConfig {
    pub fn new(host: String, port: u16, username: String, password: String, sender_email: String) -> Self {
        Self {
            host,
            port,
            username,
            password,
            sender_email,
            max_retries: 3,
            retry_delay_seconds: 2,
        }
    }
}

/// Delivers digests over an authenticated STARTTLS relay.
pub struct SmtpDelivery {
    config: SmtpConfig,
}

impl SmtpDelivery {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    pub fn build_message(&self, digest: &OutgoingDigest) -> Result<Message, DeliveryError> {
        let from: Mailbox = parse_mailbox(&self.config.sender_email)?;
        let to: Mailbox = parse_mailbox(&digest.recipient)?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(digest.subject.clone())
            .multipart(MultiPart::alternative_plain_html(
                digest.plain_text.clone(),
                digest.rich_text.clone(),
            ))
            .map_err(|e| DeliveryError::failed(format!("failed to build message: {}", e)))
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

/// Whether a failed attempt is worth repeating. Transient replies and
/// connection failures are; permanent replies and TLS errors are final.
pub fn is_retryable(e: &SmtpError) -> bool {
    if e.is_transient() || e.is_timeout() {
        return true;
    }
    !(e.is_permanent() || e.is_tls() || e.is_client() || e.is_response())
}

fn parse_mailbox(address: &str) -> Result<Mailbox, DeliveryError> {
    address.parse().map_err(|e: lettre::address::AddressError| DeliveryError::InvalidAddress {
        address: address.to_string(),
        detail: e.to_string(),
    })
}

#[async_trait]
impl DeliveryClient for SmtpDelivery {
    fn transport_name(&self) -> String {
        format!("smtp ({})", self.config.host)
    }

    async fn send(&self, digest: &OutgoingDigest) -> Result<(), DeliveryError> {
        let message = self.build_message(digest)?;

        let credentials = Credentials::new(self.config.username.clone(), self.config.password.clone());
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.host)
            .map_err(|e| DeliveryError::failed(format!("SMTP relay error: {}", e)))?
            .port(self.config.port)
            .credentials(credentials)
            .build();

        let mut backoff = self.backoff();
        let mut last_error = String::from("no attempt made");
        let mut attempts = 0;

        for attempt in 0..=self.config.max_retries {
            attempts = attempt + 1;
            debug!("Sending digest via SMTP relay {} (attempt {})", self.config.host, attempts);

            match mailer.send(message.clone()).await {
                Ok(response) => {
                    info!("Email accepted by SMTP relay {} ({:?})", self.config.host, response.code());
                    return Ok(());
                }
                Err(e) => {
                    last_error = e.to_string();
                    if !is_retryable(&e) {
                        break;
                    }
                }
            }

            if attempt < self.config.max_retries {
                if let Some(delay) = backoff.next_backoff() {
                    warn!("SMTP attempt {} failed ({}), retrying in {:?}", attempts, last_error, delay);
                    tokio::time::sleep(delay).await;
                }
            }
        }

        error!("SMTP send to {} failed after {} attempt(s): {}", self.config.host, attempts, last_error);
        Err(DeliveryError::failed(format!(
            "SMTP send error after {} attempt(s): {}",
            attempts, last_error
        )))
    }
}

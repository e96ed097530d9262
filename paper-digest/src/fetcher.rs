use crate::types::{DigestError, FetchConfig, Result};
use backoff::{backoff::Backoff, exponential::ExponentialBackoff};
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use url::Url;

/// Polite HTTP GET/HEAD with per-host spacing and bounded retries.
pub struct Fetcher {
    client: Client,
    config: FetchConfig,
    rate_limiter: Arc<RwLock<HashMap<String, Instant>>>,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self {
            client,
            config,
            rate_limiter: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// GET `url` and return the body.
    ///
    /// Connection failures, timeouts, 5xx, 408 and 429 are retried with
    /// exponential backoff. Once the budget is spent the call fails with
    /// `SourceUnavailable`. Other non-success statuses fail immediately.
    pub async fn fetch_text(&self, url: &Url) -> Result<String> {
        let mut backoff = self.backoff();
        let mut last_error = String::from("no attempt made");
        let attempts = self.config.max_retries.saturating_add(1);

        for attempt in 0..attempts {
            self.apply_rate_limit(url).await;
            debug!("GET {} (attempt {}/{})", url, attempt + 1, attempts);

            match self.client.get(url.clone()).send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        match response.text().await {
                            Ok(body) => {
                                info!("Fetched {} ({} bytes)", url, body.len());
                                return Ok(body);
                            }
                            Err(e) => last_error = e.to_string(),
                        }
                    } else if is_retryable(status) {
                        last_error = format!(
                            "HTTP {}: {}",
                            status.as_u16(),
                            status.canonical_reason().unwrap_or("Unknown")
                        );
                    } else {
                        return Err(DigestError::HttpStatus {
                            status: status.as_u16(),
                            url: url.to_string(),
                        });
                    }
                }
                Err(e) if e.is_timeout() || e.is_connect() || e.is_body() => {
                    last_error = e.to_string();
                }
                Err(e) => return Err(DigestError::Http(e)),
            }

            if attempt + 1 < attempts {
                if let Some(delay) = backoff.next_backoff() {
                    warn!("Attempt {} failed for {} ({}), retrying in {:?}", attempt + 1, url, last_error, delay);
                    tokio::time::sleep(delay).await;
                }
            }
        }

        error!("Failed to fetch {} after {} attempts: {}", url, attempts, last_error);
        Err(DigestError::SourceUnavailable {
            source_name: url.host_str().unwrap_or("unknown").to_string(),
            attempts,
            detail: last_error,
        })
    }

    /// HEAD `url` and return the advertised `Content-Length`, if any.
    pub async fn content_length(&self, url: &Url) -> Result<Option<u64>> {
        self.apply_rate_limit(url).await;
        debug!("HEAD {}", url);

        let response = self.client.head(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DigestError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        // content_length() describes the body, which a HEAD response lacks
        let length = response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        Ok(length)
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

    async fn apply_rate_limit(&self, url: &Url) {
        let host = url.host_str().unwrap_or("").to_string();
        let min_interval = Duration::from_millis(self.config.request_interval_ms);

        let mut rate_limiter = self.rate_limiter.write().await;

        if let Some(last_request) = rate_limiter.get(&host) {
            let elapsed = last_request.elapsed();
            if elapsed < min_interval {
                let wait_time = min_interval - elapsed;
                debug!("Rate limiting {}: waiting {:?}", host, wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        rate_limiter.insert(host, Instant::now());
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
}

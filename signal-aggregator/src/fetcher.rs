use crate::traits::FeedClient;
use crate::types::{FetchConfig, PipelineError, Result};
use async_trait::async_trait;
use backoff::{backoff::Backoff, ExponentialBackoff};
use reqwest::{Client, StatusCode};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use url::Url;

/// HTTP feed retrieval with retries on transport errors and retryable statuses.
pub struct Fetcher {
    client: Client,
    config: FetchConfig,
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

        Ok(Self { client, config })
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: Duration::from_secs(self.config.retry_delay_seconds),
            initial_interval: Duration::from_secs(self.config.retry_delay_seconds),
            max_interval: Duration::from_secs(self.config.retry_delay_seconds * 32),
            multiplier: 2.0,
            max_elapsed_time: Some(Duration::from_secs(self.config.retry_delay_seconds * 60)),
            ..Default::default()
        }
    }

    async fn fetch_once(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(PipelineError::General(format!(
                "HTTP {}: {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )));
        }

        Ok(response.text().await?)
    }
}

fn is_retryable(error: &PipelineError) -> bool {
    match error {
        PipelineError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
        PipelineError::General(message) => {
            message.starts_with("HTTP 5") || message.starts_with(&format!("HTTP {}", StatusCode::TOO_MANY_REQUESTS.as_u16()))
        }
        _ => false,
    }
}

#[async_trait]
impl FeedClient for Fetcher {
    async fn retrieve(&self, url: &str) -> Result<String> {
        Url::parse(url)?;

        let start_time = Instant::now();
        let mut backoff = self.backoff();
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!("Fetching feed: {} (attempt {})", url, attempt);

            match self.fetch_once(url).await {
                Ok(content) => {
                    info!(
                        "Fetched feed: {} ({} bytes in {}ms)",
                        url,
                        content.len(),
                        start_time.elapsed().as_millis()
                    );
                    return Ok(content);
                }
                Err(e) if attempt <= self.config.max_retries && is_retryable(&e) => {
                    match backoff.next_backoff() {
                        Some(delay) => {
                            warn!("Attempt {} failed for {}: {}, retrying in {:?}", attempt, url, e, delay);
                            tokio::time::sleep(delay).await;
                        }
                        None => return Err(e),
                    }
                }
                Err(e) => {
                    error!("Failed to fetch feed after {} attempts: {}", attempt, url);
                    return Err(e);
                }
            }
        }
    }
}

//! Metadata provider interface and HTTP implementation
//!
//! The core depends only on the `MetadataProvider` trait. The bundled HTTP
//! provider fetches a show document from the configured backend, retrying
//! rate limits and transient network failures with bounded exponential
//! backoff and jitter inside a single `fetch`; higher-level retry policy
//! (stale acceptance) belongs to the metadata store.

use std::time::Duration;

use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{MetadataSettings, RetrySettings};
use crate::models::RawShow;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("rate limited by metadata backend")]
    RateLimited,
    #[error("transient network failure: {0}")]
    TransientNetwork(String),
    #[error("show '{0}' not found")]
    NotFound(String),
    #[error("authentication failed")]
    AuthFailure,
    #[error("failed to decode metadata payload: {0}")]
    Deserialize(String),
}

impl ProviderError {
    /// Retriable within a single fetch; terminal errors fail the sport.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::RateLimited | Self::TransientNetwork(_))
    }
}

/// Explicit retry policy, injected rather than baked into call sites.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub jitter: f64,
}

impl RetryPolicy {
    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_backoff: Duration::from_millis(settings.base_backoff_ms),
            jitter: settings.jitter,
        }
    }

    fn to_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.base_backoff,
            randomization_factor: self.jitter,
            multiplier: 2.0,
            max_interval: Duration::from_secs(30),
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

/// The narrow interface the core consumes. Returns the raw payload bytes
/// alongside the parsed document so the store can cache them verbatim.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn fetch(&self, show_ref: &str) -> Result<FetchedMetadata, ProviderError>;
}

#[derive(Debug, Clone)]
pub struct FetchedMetadata {
    pub raw: RawShow,
    pub payload: Vec<u8>,
}

/// HTTP-backed provider against `{base_url}/shows/{show_ref}`.
pub struct HttpMetadataProvider {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl HttpMetadataProvider {
    pub fn new(settings: &MetadataSettings) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            retry: RetryPolicy::from_settings(&settings.retry),
        })
    }

    async fn fetch_once(&self, show_ref: &str) -> Result<FetchedMetadata, ProviderError> {
        let url = format!("{}/shows/{}", self.base_url, show_ref);
        debug!(url = %url, "Fetching show metadata");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProviderError::TransientNetwork(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => return Err(ProviderError::NotFound(show_ref.to_string())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(ProviderError::AuthFailure)
            }
            StatusCode::TOO_MANY_REQUESTS => return Err(ProviderError::RateLimited),
            status if status.is_server_error() => {
                return Err(ProviderError::TransientNetwork(format!(
                    "server returned {status}"
                )))
            }
            status if !status.is_success() => {
                return Err(ProviderError::TransientNetwork(format!(
                    "unexpected status {status}"
                )))
            }
            _ => {}
        }

        let payload = response
            .bytes()
            .await
            .map_err(|e| ProviderError::TransientNetwork(e.to_string()))?
            .to_vec();
        let raw: RawShow = serde_json::from_slice(&payload)
            .map_err(|e| ProviderError::Deserialize(e.to_string()))?;
        Ok(FetchedMetadata { raw, payload })
    }
}

#[async_trait]
impl MetadataProvider for HttpMetadataProvider {
    async fn fetch(&self, show_ref: &str) -> Result<FetchedMetadata, ProviderError> {
        let mut backoff = self.retry.to_backoff();
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.fetch_once(show_ref).await {
                Ok(fetched) => return Ok(fetched),
                Err(err) if err.is_retriable() && attempt < self.retry.max_attempts => {
                    let delay = backoff
                        .next_backoff()
                        .unwrap_or(self.retry.base_backoff);
                    warn!(
                        show_ref,
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %err,
                        "Metadata fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

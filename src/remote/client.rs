//! Gateway HTTP client
//!
//! Every gateway call goes through [`HttpClient::request`]. Failures it
//! cannot recover from surface as transient errors (see
//! [`Error::is_transient`]).

use super::rate_limit::{RateLimiter, RateLimiterConfig};
use crate::error::{Error, Result};
use crate::types::BackoffType;
use bytes::Bytes;
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

/// How failed requests are retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub backoff: BackoffType,
    pub initial: Duration,
    /// Cap applied to every computed delay
    pub max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: BackoffType::Exponential,
            initial: Duration::from_millis(100),
            max: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt + 1`
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = match self.backoff {
            BackoffType::Constant => 1,
            BackoffType::Linear => attempt.saturating_add(1),
            BackoffType::Exponential => 2u32.saturating_pow(attempt),
        };
        self.initial.saturating_mul(factor).min(self.max)
    }
}

/// Gateway client settings
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Prefix for relative request paths
    pub base_url: Option<String>,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    /// Shared token bucket, if requests are paced
    pub rate_limit: Option<RateLimiterConfig>,
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            rate_limit: None,
            user_agent: format!("{}/{}", crate::NAME, crate::VERSION),
        }
    }
}

impl HttpClientConfig {
    pub fn builder() -> HttpClientConfigBuilder {
        HttpClientConfigBuilder::default()
    }
}

/// Builder for [`HttpClientConfig`]
#[derive(Default)]
pub struct HttpClientConfigBuilder {
    config: HttpClientConfig,
}

impl HttpClientConfigBuilder {
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.retry.max_retries = retries;
        self
    }

    #[must_use]
    pub fn backoff(mut self, backoff: BackoffType, initial: Duration, max: Duration) -> Self {
        self.config.retry = RetryPolicy {
            backoff,
            initial,
            max,
            ..self.config.retry
        };
        self
    }

    #[must_use]
    pub fn rate_limit(mut self, config: RateLimiterConfig) -> Self {
        self.config.rate_limit = Some(config);
        self
    }

    #[must_use]
    pub fn no_rate_limit(mut self) -> Self {
        self.config.rate_limit = None;
        self
    }

    pub fn build(self) -> HttpClientConfig {
        self.config
    }
}

/// Per-request options
#[derive(Debug, Clone, Default)]
pub struct RequestConfig {
    /// Sent in key order
    pub query: BTreeMap<String, String>,
    pub timeout: Option<Duration>,
    pub max_retries: Option<u32>,
}

impl RequestConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.insert(key.into(), value.to_string());
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }
}

/// Retrying, paced client for the history gateway
pub struct HttpClient {
    inner: Client,
    config: HttpClientConfig,
    limiter: Option<RateLimiter>,
}

impl HttpClient {
    pub fn with_config(config: HttpClientConfig) -> Result<Self> {
        let inner = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout)
            .build()?;
        let limiter = config.rate_limit.as_ref().map(RateLimiter::new);

        Ok(Self {
            inner,
            config,
            limiter,
        })
    }

    /// GET a path and decode the JSON body
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str, config: RequestConfig) -> Result<T> {
        let body = self.get_bytes(path, config).await?;
        serde_json::from_slice(&body)
            .map_err(|e| Error::transient(format!("Malformed response from {path}: {e}")))
    }

    /// GET a path and return the raw body
    pub async fn get_bytes(&self, path: &str, config: RequestConfig) -> Result<Bytes> {
        let response = self.request(Method::GET, path, config).await?;
        Ok(response.bytes().await?)
    }

    /// Send a request, retrying what is retryable.
    ///
    /// The token bucket is waited on before every attempt. A 429 waits for
    /// its `retry-after`, other retryable failures for the configured backoff.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        config: RequestConfig,
    ) -> Result<Response> {
        let url = self.resolve(path);
        let policy = self.config.retry;
        let max_retries = config.max_retries.unwrap_or(policy.max_retries);
        let timeout = config.timeout.unwrap_or(self.config.timeout);

        for attempt in 0..=max_retries {
            if let Some(limiter) = &self.limiter {
                limiter.wait().await;
            }

            let mut builder = self.inner.request(method.clone(), &url).timeout(timeout);
            if !config.query.is_empty() {
                builder = builder.query(&config.query);
            }

            let error = match builder.send().await {
                Ok(response) if !is_error_status(response.status()) => {
                    debug!(%method, %url, attempt, "Request succeeded");
                    return Ok(response);
                }
                Ok(response) => status_error(response).await,
                Err(e) if e.is_timeout() => Error::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                },
                Err(e) => Error::Http(e),
            };

            if attempt == max_retries || !error.is_retryable() {
                return Err(error);
            }

            let delay = match &error {
                Error::RateLimited {
                    retry_after_seconds,
                } => Duration::from_secs(*retry_after_seconds),
                _ => policy.delay(attempt),
            };
            warn!(
                %url,
                attempt = attempt + 1,
                attempts = max_retries + 1,
                ?delay,
                "Retrying request: {error}"
            );
            tokio::time::sleep(delay).await;
        }

        Err(Error::MaxRetriesExceeded { max_retries })
    }

    fn resolve(&self, path: &str) -> String {
        let Some(base) = self.config.base_url.as_deref() else {
            return path.to_string();
        };
        if path.contains("://") {
            return path.to_string();
        }
        format!(
            "{}/{}",
            base.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("config", &self.config)
            .field("paced", &self.limiter.is_some())
            .finish_non_exhaustive()
    }
}

fn is_error_status(status: StatusCode) -> bool {
    status.is_client_error() || status.is_server_error()
}

/// Map a failed response to an error, keeping the body for diagnostics
async fn status_error(response: Response) -> Error {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_seconds = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok())
            .unwrap_or(60);
        return Error::RateLimited {
            retry_after_seconds,
        };
    }
    let body = response.text().await.unwrap_or_default();
    Error::http_status(status.as_u16(), body)
}

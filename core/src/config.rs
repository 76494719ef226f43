//! Client configuration.
//!
//! `PodioConfig` carries the API base URL, the OAuth client credentials used
//! by every token request, timeouts and the retry policy. It can be built in
//! code or read from the environment.

use std::time::Duration;

use crate::error::{PodioError, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.podio.com";

/// Retry policy for idempotent requests that failed with a 5xx status or
/// never reached the server. Rate-limited and rejected requests are never
/// retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each following attempt.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PodioConfig {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub retry: RetryPolicy,
}

impl PodioConfig {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            retry: RetryPolicy::default(),
        }
    }

    /// Point the client at another API host. A trailing slash is stripped.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Read the configuration from the environment.
    ///
    /// `PODIO_CLIENT_ID` and `PODIO_CLIENT_SECRET` are required.
    /// `PODIO_API_URL`, `PODIO_TIMEOUT_SECS` and `PODIO_MAX_RETRIES` are
    /// optional.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let client_id = lookup("PODIO_CLIENT_ID")
            .ok_or_else(|| PodioError::Config("PODIO_CLIENT_ID is not set".to_string()))?;
        let client_secret = lookup("PODIO_CLIENT_SECRET")
            .ok_or_else(|| PodioError::Config("PODIO_CLIENT_SECRET is not set".to_string()))?;

        let mut config = Self::new(client_id, client_secret);
        if let Some(url) = lookup("PODIO_API_URL") {
            config = config.with_base_url(&url);
        }
        if let Some(raw) = lookup("PODIO_TIMEOUT_SECS") {
            let secs: u64 = raw
                .parse()
                .map_err(|_| PodioError::Config(format!("invalid PODIO_TIMEOUT_SECS: {raw}")))?;
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(raw) = lookup("PODIO_MAX_RETRIES") {
            config.retry.max_retries = raw
                .parse()
                .map_err(|_| PodioError::Config(format!("invalid PODIO_MAX_RETRIES: {raw}")))?;
        }
        Ok(config)
    }
}

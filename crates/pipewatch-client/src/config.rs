//! Client configuration.

use serde::Deserialize;
use url::Url;

use pipewatch_core::{SourceError, SourceResult};

/// Environment variable naming the backend base URL.
pub const BASE_URL_ENV: &str = "PIPEWATCH_BASE_URL";

/// Configuration for [`crate::LogApiClient`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Backend origin, e.g. `http://127.0.0.1:8080`. The client appends
    /// the versioned API base path itself.
    pub base_url: String,

    /// TCP/TLS connect timeout for every request (milliseconds).
    pub connect_timeout_ms: u64,

    /// Total timeout for plain REST requests (milliseconds).
    pub request_timeout_ms: u64,

    /// Read timeout for the push stream (milliseconds). Long, so quiet
    /// builds do not tear the connection down between frames.
    pub stream_read_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_owned(),
            connect_timeout_ms: 10_000,
            request_timeout_ms: 30_000,
            stream_read_timeout_ms: 90_000,
        }
    }
}

impl ClientConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Read the base URL from `PIPEWATCH_BASE_URL`, keeping defaults for
    /// everything else.
    #[must_use]
    pub fn from_env() -> Self {
        std::env::var(BASE_URL_ENV).map_or_else(|_| Self::default(), Self::new)
    }

    /// # Errors
    ///
    /// Returns [`SourceError::Config`] for a non-http(s) base URL or a
    /// zero timeout.
    pub fn validate(&self) -> SourceResult<()> {
        let url = Url::parse(&self.base_url)
            .map_err(|e| SourceError::Config(format!("invalid base_url: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(SourceError::Config(format!(
                "base_url must be http or https, got {}",
                url.scheme()
            )));
        }
        if self.connect_timeout_ms == 0
            || self.request_timeout_ms == 0
            || self.stream_read_timeout_ms == 0
        {
            return Err(SourceError::Config("timeouts must be > 0".into()));
        }
        Ok(())
    }
}

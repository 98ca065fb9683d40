//! Error taxonomy for the log source protocol.

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by a log source (REST calls or the push stream).
///
/// The source itself never retries; callers classify with
/// [`SourceError::is_retryable`] and own the retry policy.
#[derive(Error, Debug)]
pub enum SourceError {
    /// Network-level failure before an HTTP status was obtained.
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend answered with a non-2xx status.
    #[error("api error {status}: {message}")]
    Api {
        status: u16,
        /// Machine-readable code from the response body, when present.
        code: Option<String>,
        message: String,
        /// Retry-After hint in seconds.
        retry_after: Option<u64>,
    },

    /// A response body failed to decode.
    #[error("decode error: {0}")]
    Decode(String),

    /// The push-stream connection failed mid-flight.
    #[error("stream error: {0}")]
    Stream(String),

    /// Invalid configuration or query (bad base URL, invalid regex, ...).
    #[error("configuration error: {0}")]
    Config(String),
}

impl SourceError {
    pub fn transport(err: impl std::fmt::Display) -> Self {
        Self::Transport(err.to_string())
    }

    pub fn decode(err: impl std::fmt::Display) -> Self {
        Self::Decode(err.to_string())
    }

    /// Whether a caller-side retry can plausibly succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Stream(_) => true,
            Self::Api { status, .. } => {
                *status >= 500 || *status == 429 || *status == 408 || *status == 425
            }
            Self::Decode(_) | Self::Config(_) => false,
        }
    }

    /// Suggested retry delay, when the backend provided one.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Api {
                retry_after: Some(secs),
                ..
            } => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }
}

/// Result type for log source operations.
pub type SourceResult<T> = Result<T, SourceError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16, retry_after: Option<u64>) -> SourceError {
        SourceError::Api {
            status,
            code: None,
            message: "boom".into(),
            retry_after,
        }
    }

    #[test]
    fn server_errors_are_retryable() {
        assert!(api(500, None).is_retryable());
        assert!(api(503, None).is_retryable());
        assert!(api(429, None).is_retryable());
        assert!(api(408, None).is_retryable());
    }

    #[test]
    fn client_errors_are_terminal() {
        assert!(!api(400, None).is_retryable());
        assert!(!api(404, None).is_retryable());
        assert!(!SourceError::Config("bad regex".into()).is_retryable());
        assert!(!SourceError::Decode("bad json".into()).is_retryable());
    }

    #[test]
    fn transport_and_stream_are_retryable() {
        assert!(SourceError::transport("connection reset").is_retryable());
        assert!(SourceError::Stream("eof".into()).is_retryable());
    }

    #[test]
    fn retry_after_hint_only_from_api() {
        assert_eq!(api(429, Some(7)).retry_after(), Some(Duration::from_secs(7)));
        assert_eq!(api(500, None).retry_after(), None);
        assert_eq!(SourceError::Stream("eof".into()).retry_after(), None);
    }
}

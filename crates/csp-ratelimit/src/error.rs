//! Error types for rate limiting.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur in rate limiting operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimitError {
    /// The source key has used its admissions for the current window.
    #[error(
        "Rate limit exceeded for {key}: {limit} requests per window, retry after {}s",
        retry_after.as_secs()
    )]
    Exceeded {
        /// The rate-limited source key.
        key: String,
        /// Admissions allowed per window.
        limit: u32,
        /// Time until the next admission would succeed.
        retry_after: Duration,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RateLimitError {
    /// Returns the stable machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Exceeded { .. } => "RATE_LIMIT_EXCEEDED",
            Self::Config(_) => "INVALID_RATE_LIMIT_CONFIG",
        }
    }
}

/// Result type for rate limiting operations.
pub type RateLimitResult<T> = Result<T, RateLimitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_exceeded() {
        let err = RateLimitError::Exceeded {
            key: "1.2.3.4".into(),
            limit: 50,
            retry_after: Duration::from_secs(12),
        };
        let msg = err.to_string();
        assert!(msg.contains("Rate limit exceeded"));
        assert!(msg.contains("1.2.3.4"));
        assert!(msg.contains("retry after 12s"));
        assert_eq!(err.code(), "RATE_LIMIT_EXCEEDED");
    }

    #[test]
    fn test_error_display_config() {
        let err = RateLimitError::Config("invalid value".into());
        assert!(err.to_string().contains("invalid value"));
        assert_eq!(err.code(), "INVALID_RATE_LIMIT_CONFIG");
    }
}

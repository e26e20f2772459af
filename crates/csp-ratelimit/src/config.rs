//! Rate limiter configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RateLimitError, RateLimitResult};

/// Default admissions per window per source key.
pub const DEFAULT_MAX_REQUESTS: u32 = 50;

/// Default window length.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Configuration for request rate limiting.
///
/// In TOML the window is given in whole seconds:
///
/// ```toml
/// enabled = true
/// max_requests = 50
/// window_secs = 60
/// exempt_paths = ["/health"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Whether to enable rate limiting.
    pub enabled: bool,
    /// Maximum admitted requests per source key per window.
    pub max_requests: u32,
    /// Sliding window length.
    #[serde(rename = "window_secs", with = "duration_secs")]
    pub window: Duration,
    /// Paths never subject to limiting. An entry is either an exact path or
    /// `prefix/*`, which covers `prefix` and everything below it.
    pub exempt_paths: Vec<String>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: DEFAULT_MAX_REQUESTS,
            window: DEFAULT_WINDOW,
            exempt_paths: vec!["/health".to_string()],
        }
    }
}

impl RateLimitConfig {
    /// Creates a config admitting `max_requests` per `window`.
    #[must_use]
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            ..Self::default()
        }
    }

    /// Returns a disabled config.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Replaces the exempt path patterns.
    #[must_use]
    pub fn with_exempt_paths<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exempt_paths = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Returns true if `path` is covered by an exempt pattern.
    #[must_use]
    pub fn is_exempt(&self, path: &str) -> bool {
        self.exempt_paths
            .iter()
            .any(|pattern| path_matches(pattern, path))
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError::Config`] for a zero limit, a zero window, or an
    /// exempt pattern that is not an absolute path.
    pub fn validate(&self) -> RateLimitResult<()> {
        if self.max_requests == 0 {
            return Err(RateLimitError::Config("max_requests must be at least 1".into()));
        }
        if self.window.is_zero() {
            return Err(RateLimitError::Config("window must be non-zero".into()));
        }
        if let Some(bad) = self.exempt_paths.iter().find(|p| !p.starts_with('/')) {
            return Err(RateLimitError::Config(format!(
                "exempt path '{bad}' must start with '/'"
            )));
        }
        Ok(())
    }
}

/// Exact match, or `prefix/*` covering `prefix` and its sub-paths.
fn path_matches(pattern: &str, path: &str) -> bool {
    if let Some(prefix) = pattern.strip_suffix("/*") {
        path == prefix
            || path
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('/'))
    } else {
        pattern == path
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

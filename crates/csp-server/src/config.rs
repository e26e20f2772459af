//! Reporting service configuration.
//!
//! Loaded from TOML; every section and key is optional and falls back to the
//! defaults below.
//!
//! ```toml
//! bind_addr = "0.0.0.0:8080"
//! max_body_bytes = 51200
//! trust_forwarded_for = false
//! maintenance_interval_secs = 60
//!
//! [rate_limit]
//! max_requests = 50
//! window_secs = 60
//!
//! [audit]
//! max_events = 10000
//! mirror_threshold = "MEDIUM"
//!
//! [csp]
//! report_only = false
//! [csp.directives]
//! default-src = ["'self'"]
//! ```

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use csp_audit::{RetentionPolicy, Severity};
use csp_ratelimit::RateLimitConfig;
use csp_report::{ContentSecurityPolicy, DEFAULT_REPORT_URI};
use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

/// Default maximum accepted report body size (50 KiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 50 * 1024;

/// Default interval between maintenance sweeps.
pub const DEFAULT_MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);

/// Audit log retention and mirroring settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Maximum retained events.
    pub max_events: usize,
    /// Maximum event age in seconds; 0 disables age eviction.
    pub max_age_secs: u64,
    /// Maximum events returned by one query.
    pub max_page_size: usize,
    /// Lowest severity mirrored to the `csp_audit` log target. Every event is
    /// stored regardless.
    pub mirror_threshold: Severity,
}

impl Default for AuditConfig {
    fn default() -> Self {
        let retention = RetentionPolicy::default();
        Self {
            max_events: retention.max_events,
            max_age_secs: retention.max_age.map_or(0, |age| age.as_secs()),
            max_page_size: retention.max_page_size,
            mirror_threshold: Severity::Info,
        }
    }
}

impl AuditConfig {
    /// Converts to the store's retention policy.
    #[must_use]
    pub fn retention(&self) -> RetentionPolicy {
        RetentionPolicy::default()
            .with_max_events(self.max_events)
            .with_max_age((self.max_age_secs > 0).then_some(Duration::from_secs(self.max_age_secs)))
            .with_max_page_size(self.max_page_size)
    }
}

/// Content-Security-Policy header settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CspConfig {
    /// Send `Content-Security-Policy-Report-Only` instead of enforcing.
    pub report_only: bool,
    /// Where browsers send violation reports.
    pub report_uri: String,
    /// Directive name to sources. When absent, the baseline policy is used.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directives: Option<BTreeMap<String, Vec<String>>>,
}

impl Default for CspConfig {
    fn default() -> Self {
        Self {
            report_only: false,
            report_uri: DEFAULT_REPORT_URI.to_string(),
            directives: None,
        }
    }
}

impl CspConfig {
    /// Builds the policy delivered on every response.
    #[must_use]
    pub fn policy(&self) -> ContentSecurityPolicy {
        let base = match &self.directives {
            None => ContentSecurityPolicy::default(),
            Some(directives) => directives
                .iter()
                .fold(ContentSecurityPolicy::new(), |policy, (name, sources)| {
                    policy.directive(name.as_str(), sources.iter().map(String::as_str))
                }),
        };
        base.report_uri(self.report_uri.as_str())
            .report_only(self.report_only)
    }
}

/// Configuration for the reporting server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind the HTTP server to.
    pub bind_addr: SocketAddr,
    /// Largest accepted report body in bytes.
    pub max_body_bytes: usize,
    /// Use the first `X-Forwarded-For` hop as the request source.
    pub trust_forwarded_for: bool,
    /// Seconds between maintenance sweeps.
    pub maintenance_interval_secs: u64,
    /// Rate limiting.
    pub rate_limit: RateLimitConfig,
    /// Audit log retention.
    pub audit: AuditConfig,
    /// Response policy header.
    pub csp: CspConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            trust_forwarded_for: false,
            maintenance_interval_secs: DEFAULT_MAINTENANCE_INTERVAL.as_secs(),
            rate_limit: RateLimitConfig::default(),
            audit: AuditConfig::default(),
            csp: CspConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create a new configuration with the specified bind address.
    #[must_use]
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Self::default()
        }
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: impl AsRef<Path>) -> ServerResult<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ServerError::Config(format!(
                "failed to read config file '{}': {e}",
                path.as_ref().display()
            ))
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or fails validation.
    pub fn from_toml(content: &str) -> ServerResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ServerError::Config(format!("invalid TOML: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> ServerResult<()> {
        if self.max_body_bytes == 0 {
            return Err(ServerError::Config(
                "max_body_bytes must be greater than 0".to_string(),
            ));
        }

        if self.maintenance_interval_secs == 0 {
            return Err(ServerError::Config(
                "maintenance_interval_secs must be greater than 0".to_string(),
            ));
        }

        self.rate_limit
            .validate()
            .map_err(|e| ServerError::Config(format!("rate_limit: {e}")))?;

        if self.audit.max_events == 0 {
            return Err(ServerError::Config(
                "audit.max_events must be greater than 0".to_string(),
            ));
        }

        if self.audit.max_page_size == 0 {
            return Err(ServerError::Config(
                "audit.max_page_size must be greater than 0".to_string(),
            ));
        }

        if !self.csp.report_uri.starts_with('/') && !self.csp.report_uri.starts_with("http") {
            return Err(ServerError::Config(
                "csp.report_uri must be a path or an http(s) URL".to_string(),
            ));
        }

        self.csp
            .policy()
            .validate()
            .map_err(|e| ServerError::Config(format!("csp: {e}")))?;

        Ok(())
    }

    /// Interval between maintenance sweeps.
    #[must_use]
    pub const fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs)
    }

    /// Set the bind address.
    #[must_use]
    pub const fn with_bind_addr(mut self, bind_addr: SocketAddr) -> Self {
        self.bind_addr = bind_addr;
        self
    }

    /// Set the maximum report body size.
    #[must_use]
    pub const fn with_max_body_bytes(mut self, max: usize) -> Self {
        self.max_body_bytes = max;
        self
    }

    /// Trust `X-Forwarded-For` for the request source.
    #[must_use]
    pub const fn with_trust_forwarded_for(mut self, trust: bool) -> Self {
        self.trust_forwarded_for = trust;
        self
    }

    /// Set the rate limit configuration.
    #[must_use]
    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    /// Set the audit retention configuration.
    #[must_use]
    pub const fn with_audit(mut self, audit: AuditConfig) -> Self {
        self.audit = audit;
        self
    }

    /// Set the policy header configuration.
    #[must_use]
    pub fn with_csp(mut self, csp: CspConfig) -> Self {
        self.csp = csp;
        self
    }
}

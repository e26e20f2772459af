//! Shared state for the reporting server.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use axum::http::{HeaderName, HeaderValue};
use csp_audit::{AuditStore, MemoryAuditStore, TracingAuditLogger};
use csp_ratelimit::RateLimiter;
use csp_report::{Classifier, ContentSecurityPolicy};

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};

/// Shared state for request handlers and middleware.
///
/// Collaborators are constructed once and injected; handlers never reach for
/// globals.
pub struct AppState {
    config: Arc<ServerConfig>,
    store: Arc<dyn AuditStore>,
    limiter: Arc<RateLimiter>,
    classifier: Classifier,
    policy_header: (HeaderName, HeaderValue),
    start_time: Instant,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("events", &self.store.len())
            .field("limiter", &self.limiter)
            .field("classifier", &self.classifier)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Builds state from configuration with an in-memory store mirrored to `tracing`.
    ///
    /// Only events at or above `audit.mirror_threshold` are mirrored.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] if the configuration is invalid.
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        let mirror =
            TracingAuditLogger::with_prefix("CSP").with_threshold(config.audit.mirror_threshold);
        let store = MemoryAuditStore::new(config.audit.retention()).with_logger(Arc::new(mirror));
        Self::with_store(config, Arc::new(store))
    }

    /// Builds state around an existing audit store.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] if the configuration is invalid.
    pub fn with_store(config: ServerConfig, store: Arc<dyn AuditStore>) -> ServerResult<Self> {
        config.validate()?;

        let policy = config.csp.policy();
        let policy_header = policy_header(&policy)?;
        let limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));

        Ok(Self {
            config: Arc::new(config),
            store,
            limiter,
            classifier: Classifier::default(),
            policy_header,
            start_time: Instant::now(),
        })
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the audit store.
    #[must_use]
    pub fn store(&self) -> Arc<dyn AuditStore> {
        Arc::clone(&self.store)
    }

    /// Get the rate limiter.
    #[must_use]
    pub fn limiter(&self) -> Arc<RateLimiter> {
        Arc::clone(&self.limiter)
    }

    /// Get the severity classifier.
    #[must_use]
    pub const fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Policy header name and value stamped on every response.
    #[must_use]
    pub fn policy_header(&self) -> (HeaderName, HeaderValue) {
        self.policy_header.clone()
    }

    /// Get server uptime in seconds.
    #[must_use]
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

fn policy_header(policy: &ContentSecurityPolicy) -> ServerResult<(HeaderName, HeaderValue)> {
    let value = HeaderValue::from_str(&policy.header_value())
        .map_err(|e| ServerError::Config(format!("policy is not a valid header value: {e}")))?;
    Ok((HeaderName::from_static(policy.header_name()), value))
}

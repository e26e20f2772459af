//! Audit mirrors.
//!
//! An [`AuditLogger`] sees every event after a store has committed it. The
//! default [`TracingAuditLogger`] forwards events to `tracing` under the
//! `csp_audit` target, so operators can tail violations without querying the
//! store.

use crate::events::{SecurityEvent, Severity};

/// Receives committed events.
pub trait AuditLogger: Send + Sync {
    /// Mirrors a committed event.
    fn log(&self, event: &SecurityEvent);
}

/// Mirrors events to `tracing`.
///
/// | Severity | Level |
/// |----------|-------|
/// | INFO, LOW | `info` |
/// | MEDIUM | `warn` |
/// | HIGH, CRITICAL | `error` |
#[derive(Debug, Clone, Default)]
pub struct TracingAuditLogger {
    prefix: Option<String>,
    threshold: Severity,
}

impl TracingAuditLogger {
    /// Mirrors every event with the `AUDIT` prefix.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirrors every event, tagging messages with `prefix`.
    #[must_use]
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            ..Self::default()
        }
    }

    /// Skips events below `threshold`.
    #[must_use]
    pub const fn with_threshold(mut self, threshold: Severity) -> Self {
        self.threshold = threshold;
        self
    }

    fn mirrors(&self, severity: Severity) -> bool {
        severity >= self.threshold
    }
}

macro_rules! mirror {
    ($level:ident, $prefix:expr, $event:expr) => {{
        let event: &SecurityEvent = $event;
        let details = event.details();
        tracing::$level!(
            target: "csp_audit",
            event_id = %event.event_id(),
            sequence = event.sequence(),
            event_type = %event.event_type(),
            severity = %event.severity(),
            source_ip = event.source().ip.as_deref().unwrap_or("-"),
            directive = details.get("violated-directive").and_then(|v| v.as_str()).unwrap_or("-"),
            blocked = details.get("blocked-uri").and_then(|v| v.as_str()).unwrap_or("-"),
            "[{}] {}",
            $prefix,
            event.event_type()
        );
    }};
}

impl AuditLogger for TracingAuditLogger {
    fn log(&self, event: &SecurityEvent) {
        if !self.mirrors(event.severity()) {
            return;
        }
        let prefix = self.prefix.as_deref().unwrap_or("AUDIT");
        match event.severity() {
            Severity::Info | Severity::Low => mirror!(info, prefix, event),
            Severity::Medium => mirror!(warn, prefix, event),
            Severity::High | Severity::Critical => mirror!(error, prefix, event),
        }
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAuditLogger;

impl NoopAuditLogger {
    /// Creates a logger that discards everything.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl AuditLogger for NoopAuditLogger {
    fn log(&self, _event: &SecurityEvent) {}
}

//! Security event types.
//!
//! A [`SecurityEvent`] is created exclusively by an [`AuditStore`](crate::AuditStore)
//! when a [`NewEvent`] is appended. Identity, ordering and timestamp are assigned
//! by the store; callers only supply what happened.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AuditError, AuditResult};

/// Normalized attributes attached to an event. Always an object, never null.
pub type EventDetails = serde_json::Map<String, serde_json::Value>;

/// Severity level for security events, ordered by urgency.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Informational; the baseline level.
    #[default]
    Info = 0,
    /// Low severity (e.g., cosmetic resource blocked).
    Low = 1,
    /// Medium severity (e.g., inline violation).
    Medium = 2,
    /// High severity (e.g., remote script blocked).
    High = 3,
    /// Critical severity.
    Critical = 4,
}

impl Severity {
    /// All levels, most urgent first.
    pub const ALL: [Self; 5] = [
        Self::Critical,
        Self::High,
        Self::Medium,
        Self::Low,
        Self::Info,
    ];

    /// Returns the wire representation of this severity.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Severity {
    type Err = AuditError;

    fn from_str(s: &str) -> AuditResult<Self> {
        Self::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| AuditError::InvalidData(format!("unknown severity: {s}")))
    }
}

/// Kind of security event recorded in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum EventType {
    /// A browser reported a Content-Security-Policy violation.
    CspViolation,
    /// An authentication attempt failed.
    AuthFailure,
    /// A caller exceeded a request quota.
    RateLimitExceeded,
    /// A request was flagged as suspicious.
    SuspiciousRequest,
}

impl EventType {
    /// All known event types.
    pub const ALL: [Self; 4] = [
        Self::CspViolation,
        Self::AuthFailure,
        Self::RateLimitExceeded,
        Self::SuspiciousRequest,
    ];

    /// Returns the wire representation of this event type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::CspViolation => "CSP_VIOLATION",
            Self::AuthFailure => "AUTH_FAILURE",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::SuspiciousRequest => "SUSPICIOUS_REQUEST",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EventType {
    type Err = AuditError;

    fn from_str(s: &str) -> AuditResult<Self> {
        let wanted = s.trim().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| AuditError::InvalidData(format!("unknown event type: {s}")))
    }
}

/// Request metadata captured at ingestion.
///
/// Informational only: none of these values are authenticated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceContext {
    /// Caller address as seen by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    /// Caller user agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl SourceContext {
    /// Creates an empty source context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the caller address.
    #[must_use]
    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    /// Sets the caller user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

/// An event waiting to be appended to the log.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub(crate) event_type: EventType,
    pub(crate) severity: Severity,
    pub(crate) details: EventDetails,
    pub(crate) source: SourceContext,
}

impl NewEvent {
    /// Starts a new event of the given type at the baseline severity.
    #[must_use]
    pub fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            severity: Severity::default(),
            details: EventDetails::new(),
            source: SourceContext::default(),
        }
    }

    /// Creates a CSP violation event.
    #[must_use]
    pub fn csp_violation(severity: Severity, details: EventDetails) -> Self {
        Self::new(EventType::CspViolation)
            .severity(severity)
            .details(details)
    }

    /// Creates an authentication failure event.
    #[must_use]
    pub fn auth_failure(reason: impl Into<String>) -> Self {
        Self::new(EventType::AuthFailure)
            .severity(Severity::Medium)
            .detail("reason", serde_json::Value::String(reason.into()))
    }

    /// Sets the severity level.
    #[must_use]
    pub const fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Replaces all details.
    #[must_use]
    pub fn details(mut self, details: EventDetails) -> Self {
        self.details = details;
        self
    }

    /// Adds a single detail entry.
    #[must_use]
    pub fn detail(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }

    /// Sets the request metadata.
    #[must_use]
    pub fn source(mut self, source: SourceContext) -> Self {
        self.source = source;
        self
    }
}

/// A security event as recorded by the audit log. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvent {
    event_id: Uuid,
    sequence: u64,
    timestamp: DateTime<Utc>,
    event_type: EventType,
    severity: Severity,
    #[serde(default)]
    details: EventDetails,
    #[serde(default)]
    source: SourceContext,
}

impl SecurityEvent {
    pub(crate) fn record(event: NewEvent, sequence: u64, timestamp: DateTime<Utc>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            sequence,
            timestamp,
            event_type: event.event_type,
            severity: event.severity,
            details: event.details,
            source: event.source,
        }
    }

    /// Returns the event ID.
    #[must_use]
    pub const fn event_id(&self) -> Uuid {
        self.event_id
    }

    /// Returns the position of this event in the store's commit order.
    #[must_use]
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Returns the time the store accepted the event.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Returns the event type.
    #[must_use]
    pub const fn event_type(&self) -> EventType {
        self.event_type
    }

    /// Returns the severity level.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        self.severity
    }

    /// Returns the normalized details.
    #[must_use]
    pub const fn details(&self) -> &EventDetails {
        &self.details
    }

    /// Returns the request metadata captured at ingestion.
    #[must_use]
    pub const fn source(&self) -> &SourceContext {
        &self.source
    }
}

//! # csp-audit
//!
//! Append-only audit log for security events raised by the CSP reporting
//! pipeline.
//!
//! ## Features
//!
//! - [`SecurityEvent`] - immutable record with store-assigned id, sequence and timestamp
//! - [`AuditStore`] - pluggable storage trait; [`MemoryAuditStore`] is the bounded default
//! - [`EventFilter`] - type, time window and severity selection for queries
//! - [`AuditLogger`] - mirrors committed events, e.g. to `tracing` via [`TracingAuditLogger`]
//!
//! ## Example
//!
//! ```rust
//! use csp_audit::{AuditStore, EventFilter, EventType, MemoryAuditStore, NewEvent, Severity};
//!
//! let store = MemoryAuditStore::default();
//! let receipt = store.append(NewEvent::auth_failure("invalid_credentials"))?;
//!
//! let events = store.query(&EventFilter::for_type(EventType::AuthFailure))?;
//! assert_eq!(events[0].event_id(), receipt.event_id);
//! assert_eq!(events[0].severity(), Severity::Medium);
//! # Ok::<(), csp_audit::AuditError>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod events;
pub mod logger;
pub mod store;

pub use error::{AuditError, AuditResult};
pub use events::{EventDetails, EventType, NewEvent, SecurityEvent, Severity, SourceContext};
pub use logger::{AuditLogger, NoopAuditLogger, TracingAuditLogger};
pub use store::{
    AppendReceipt, AuditStore, EventFilter, MemoryAuditStore, RetentionPolicy, StoreStats,
};

//! Error types for the audit log.

use thiserror::Error;

/// Errors that can occur during audit log operations.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The backing storage cannot accept or serve events.
    #[error("audit storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Invalid event data.
    #[error("invalid event data: {0}")]
    InvalidData(String),
}

/// Result type alias for audit operations.
pub type AuditResult<T> = std::result::Result<T, AuditError>;

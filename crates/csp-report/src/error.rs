//! Report rejection types.

use std::fmt;
use thiserror::Error;

/// Stable error code returned to clients for malformed reports.
pub const INVALID_CSP_REPORT: &str = "INVALID_CSP_REPORT";

/// Why a report body was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// The body could not be decoded as JSON.
    Undecodable {
        /// Decoder message.
        message: String,
    },
    /// The candidate report is not a JSON object.
    NotAnObject {
        /// JSON type that was found instead.
        found: &'static str,
    },
    /// The `csp-report` wrapper holds something other than an object.
    WrapperNotAnObject {
        /// JSON type that was found under the wrapper key.
        found: &'static str,
    },
    /// The candidate report has no keys.
    EmptyReport,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undecodable { message } => write!(f, "body is not valid JSON: {message}"),
            Self::NotAnObject { found } => write!(f, "expected a JSON object, got {found}"),
            Self::WrapperNotAnObject { found } => {
                write!(f, "'csp-report' must hold a JSON object, got {found}")
            }
            Self::EmptyReport => write!(f, "report object has no fields"),
        }
    }
}

/// Errors raised by the reporting pipeline's pure stages.
#[derive(Debug, Clone, Error)]
pub enum ReportError {
    /// The report is not a non-empty JSON object.
    #[error("invalid CSP report format: {0}")]
    InvalidReportFormat(RejectReason),

    /// A Content-Security-Policy definition is malformed.
    #[error("invalid policy: {0}")]
    InvalidPolicy(String),
}

impl ReportError {
    /// Returns the stable machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidReportFormat(_) => INVALID_CSP_REPORT,
            Self::InvalidPolicy(_) => "INVALID_CSP_POLICY",
        }
    }

    /// Returns the rejection reason for malformed reports.
    #[must_use]
    pub const fn reason(&self) -> Option<&RejectReason> {
        match self {
            Self::InvalidReportFormat(reason) => Some(reason),
            Self::InvalidPolicy(_) => None,
        }
    }
}

/// Result type for report operations.
pub type ReportResult<T> = Result<T, ReportError>;

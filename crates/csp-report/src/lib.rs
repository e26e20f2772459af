//! Pure stages of the CSP reporting pipeline.
//!
//! Nothing in this crate performs I/O. The server decodes a request body with
//! [`parse_report_body`], grades it with a [`Classifier`], and records the result
//! through `csp-audit`.
//!
//! # Normalization
//!
//! Both the wrapped (`{"csp-report": {...}}`) and the bare report shape are
//! accepted and produce the same [`NormalizedReport`]:
//!
//! ```
//! use csp_report::{normalize, ReportShape, normalize_with_shape};
//! use serde_json::json;
//!
//! let fields = json!({ "blocked-uri": "inline", "violated-directive": "style-src" });
//! let (shape, report) = normalize_with_shape(&json!({ "csp-report": fields.clone() }))?;
//! assert_eq!(shape, ReportShape::Wrapped);
//! assert_eq!(report, normalize(&fields)?);
//! # Ok::<(), csp_report::ReportError>(())
//! ```
//!
//! # Classification
//!
//! ```
//! use csp_audit::Severity;
//! use csp_report::{parse_report_body, Classifier};
//!
//! let report = parse_report_body(br#"{"violated-directive": "script-src 'self'"}"#)?;
//! assert_eq!(Classifier::default().classify(&report), Severity::High);
//! # Ok::<(), csp_report::ReportError>(())
//! ```
//!
//! # Policy headers
//!
//! [`ContentSecurityPolicy`] renders the header that points browsers at the
//! reporting endpoint.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod classify;
mod error;
pub mod normalize;
pub mod policy;

pub use classify::{Classification, Classifier, DEFAULT_RULES, FALLBACK_SEVERITY, Rule, classify};
pub use error::{INVALID_CSP_REPORT, RejectReason, ReportError, ReportResult};
pub use normalize::{
    MAX_FIELD_LENGTH, NormalizedReport, ReportShape, WRAPPER_KEY, normalize, normalize_with_shape,
    parse_report_body,
};
pub use policy::{ContentSecurityPolicy, DEFAULT_REPORT_URI};

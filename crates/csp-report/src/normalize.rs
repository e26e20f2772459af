//! CSP report normalization.
//!
//! Browsers deliver violation reports in two shapes, both accepted here:
//!
//! - **wrapped**: `{"csp-report": { ...fields... }}` (CSP level 2 `report-uri`)
//! - **bare**: `{ ...fields... }` (the same fields, sent without the wrapper)
//!
//! Shape detection is explicit: the presence of the `csp-report` key selects the
//! wrapped shape, and its value must then be a non-empty object. Any other
//! object is treated as a bare report.

use csp_audit::EventDetails;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{RejectReason, ReportError, ReportResult};

/// Key under which wrapped reports carry their fields.
pub const WRAPPER_KEY: &str = "csp-report";

/// Longest string kept for any single report field, in characters.
pub const MAX_FIELD_LENGTH: usize = 2048;

/// Which of the accepted shapes a report arrived in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportShape {
    /// `{"csp-report": {...}}`
    Wrapped,
    /// A bare object of report fields.
    Bare,
}

/// A validated violation report. Every field is optional; absent input stays absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NormalizedReport {
    /// Page on which the violation occurred.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_uri: Option<String>,
    /// Referrer of the violating page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    /// Resource that was blocked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_uri: Option<String>,
    /// Directive that was violated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub violated_directive: Option<String>,
    /// Directive whose enforcement caused the violation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_directive: Option<String>,
    /// Full policy in force.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_policy: Option<String>,
    /// Script file in which the violation occurred.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    /// Line in `source_file`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_number: Option<u64>,
    /// Column in `source_file`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_number: Option<u64>,
    /// `enforce` or `report`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disposition: Option<String>,
    /// HTTP status of the violating document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u64>,
    /// First characters of the offending inline script or style.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_sample: Option<String>,
}

impl NormalizedReport {
    /// Returns true if no recognised field was present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Converts the report into audit event details (kebab-case keys, absent fields omitted).
    #[must_use]
    pub fn to_details(&self) -> EventDetails {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => EventDetails::new(),
        }
    }

    fn from_fields(fields: &Map<String, Value>) -> Self {
        Self {
            document_uri: text(fields, "document-uri"),
            referrer: text(fields, "referrer"),
            blocked_uri: text(fields, "blocked-uri"),
            violated_directive: text(fields, "violated-directive"),
            effective_directive: text(fields, "effective-directive"),
            original_policy: text(fields, "original-policy"),
            source_file: text(fields, "source-file"),
            line_number: number(fields, "line-number"),
            column_number: number(fields, "column-number"),
            disposition: text(fields, "disposition"),
            status_code: number(fields, "status-code"),
            script_sample: text(fields, "script-sample"),
        }
    }
}

/// Validates a decoded request body and extracts the report fields.
///
/// # Errors
///
/// Returns [`ReportError::InvalidReportFormat`] if the candidate report is not a
/// JSON object or has no keys.
pub fn normalize(body: &Value) -> ReportResult<NormalizedReport> {
    normalize_with_shape(body).map(|(_, report)| report)
}

/// Like [`normalize`], also reporting which shape was detected.
///
/// # Errors
///
/// Returns [`ReportError::InvalidReportFormat`] on malformed input.
pub fn normalize_with_shape(body: &Value) -> ReportResult<(ReportShape, NormalizedReport)> {
    let (shape, candidate) = detect_shape(body)?;

    let Value::Object(fields) = candidate else {
        return Err(reject(RejectReason::NotAnObject {
            found: json_type(candidate),
        }));
    };

    if fields.is_empty() {
        return Err(reject(RejectReason::EmptyReport));
    }

    Ok((shape, NormalizedReport::from_fields(fields)))
}

/// Decodes raw request bytes and normalizes the result.
///
/// # Errors
///
/// Returns [`ReportError::InvalidReportFormat`] if the bytes are not JSON or the
/// decoded value is not a valid report.
pub fn parse_report_body(bytes: &[u8]) -> ReportResult<NormalizedReport> {
    let body: Value = serde_json::from_slice(bytes).map_err(|e| {
        reject(RejectReason::Undecodable {
            message: e.to_string(),
        })
    })?;
    normalize(&body)
}

fn detect_shape(body: &Value) -> ReportResult<(ReportShape, &Value)> {
    match body.get(WRAPPER_KEY) {
        Some(inner @ Value::Object(_)) => Ok((ReportShape::Wrapped, inner)),
        Some(other) => Err(reject(RejectReason::WrapperNotAnObject {
            found: json_type(other),
        })),
        None => Ok((ReportShape::Bare, body)),
    }
}

fn reject(reason: RejectReason) -> ReportError {
    ReportError::InvalidReportFormat(reason)
}

const fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn text(fields: &Map<String, Value>, key: &str) -> Option<String> {
    let raw = match fields.get(key)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => return None,
    };
    if raw.is_empty() {
        return None;
    }
    if raw.chars().count() > MAX_FIELD_LENGTH {
        return Some(raw.chars().take(MAX_FIELD_LENGTH).collect());
    }
    Some(raw)
}

fn number(fields: &Map<String, Value>, key: &str) -> Option<u64> {
    match fields.get(key)? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    fn fields() -> Value {
        json!({
            "document-uri": "http://example.com/page",
            "referrer": "",
            "blocked-uri": "http://evil.com/malicious.js",
            "violated-directive": "script-src 'self'",
            "original-policy": "default-src 'self'; report-uri /security/csp-report",
            "source-file": "http://example.com/app.js",
            "line-number": 42,
            "column-number": "7"
        })
    }

    #[test]
    fn wrapped_report_is_unwrapped() {
        let (shape, report) = normalize_with_shape(&json!({ "csp-report": fields() })).unwrap();
        assert_eq!(shape, ReportShape::Wrapped);
        assert_eq!(
            report.blocked_uri.as_deref(),
            Some("http://evil.com/malicious.js")
        );
        assert_eq!(report.violated_directive.as_deref(), Some("script-src 'self'"));
        assert_eq!(report.line_number, Some(42));
        assert_eq!(report.column_number, Some(7));
    }

    #[test]
    fn bare_report_is_accepted() {
        let (shape, report) = normalize_with_shape(&fields()).unwrap();
        assert_eq!(shape, ReportShape::Bare);
        assert_eq!(report.document_uri.as_deref(), Some("http://example.com/page"));
    }

    #[test]
    fn wrapped_and_bare_are_equivalent() {
        let wrapped = normalize(&json!({ "csp-report": fields() })).unwrap();
        let bare = normalize(&fields()).unwrap();
        assert_eq!(wrapped, bare);
    }

    #[test]
    fn absent_fields_stay_absent() {
        let report = normalize(&json!({ "violated-directive": "img-src" })).unwrap();
        assert_eq!(report.violated_directive.as_deref(), Some("img-src"));
        assert!(report.blocked_uri.is_none());
        assert!(report.document_uri.is_none());
        assert!(report.line_number.is_none());
    }

    #[test]
    fn empty_strings_are_absent() {
        let report = normalize(&fields()).unwrap();
        assert!(report.referrer.is_none());
    }

    #[test]
    fn unknown_keys_are_ignored_but_count_as_content() {
        let report = normalize(&json!({ "something-else": 1 })).unwrap();
        assert!(report.is_empty());
    }

    #[test]
    fn non_string_scalars_render_as_text() {
        let report = normalize(&json!({ "blocked-uri": 123, "disposition": true })).unwrap();
        assert_eq!(report.blocked_uri.as_deref(), Some("123"));
        assert_eq!(report.disposition.as_deref(), Some("true"));
    }

    #[test]
    fn bad_numbers_are_absent() {
        let report = normalize(&json!({ "line-number": "abc", "column-number": -3 })).unwrap();
        assert!(report.line_number.is_none());
        assert!(report.column_number.is_none());
    }

    #[test]
    fn long_fields_are_truncated() {
        let long = "a".repeat(MAX_FIELD_LENGTH + 100);
        let report = normalize(&json!({ "script-sample": long })).unwrap();
        assert_eq!(
            report.script_sample.map(|s| s.chars().count()),
            Some(MAX_FIELD_LENGTH)
        );
    }

    #[test_case(json!({}), RejectReason::EmptyReport ; "empty object")]
    #[test_case(json!({"csp-report": {}}), RejectReason::EmptyReport ; "empty wrapped object")]
    #[test_case(json!("report"), RejectReason::NotAnObject { found: "string" } ; "string")]
    #[test_case(json!([1, 2]), RejectReason::NotAnObject { found: "array" } ; "array")]
    #[test_case(json!(42), RejectReason::NotAnObject { found: "number" } ; "number")]
    #[test_case(json!(null), RejectReason::NotAnObject { found: "null" } ; "null")]
    #[test_case(json!(false), RejectReason::NotAnObject { found: "boolean" } ; "boolean")]
    #[test_case(json!({"csp-report": "x"}), RejectReason::WrapperNotAnObject { found: "string" } ; "wrapped string")]
    #[test_case(json!({"csp-report": null}), RejectReason::WrapperNotAnObject { found: "null" } ; "wrapped null")]
    #[test_case(json!({"csp-report": [{}]}), RejectReason::WrapperNotAnObject { found: "array" } ; "wrapped array")]
    fn invalid_candidates_rejected(body: Value, expected: RejectReason) {
        let err = normalize(&body).unwrap_err();
        assert_eq!(err.reason(), Some(&expected));
        assert_eq!(err.code(), "INVALID_CSP_REPORT");
    }

    #[test]
    fn parse_body_rejects_non_json() {
        let err = parse_report_body(b"not json at all").unwrap_err();
        assert!(matches!(
            err.reason(),
            Some(RejectReason::Undecodable { .. })
        ));
    }

    #[test]
    fn parse_body_rejects_bare_string() {
        let err = parse_report_body(br#""just a string""#).unwrap_err();
        assert_eq!(
            err.reason(),
            Some(&RejectReason::NotAnObject { found: "string" })
        );
    }

    #[test]
    fn parse_body_accepts_wrapped_report() {
        let report = parse_report_body(
            br#"{"csp-report": {"document-uri": "http://x/", "violated-directive": "script-src"}}"#,
        )
        .unwrap();
        assert_eq!(report.document_uri.as_deref(), Some("http://x/"));
    }

    #[test]
    fn details_use_kebab_case_and_skip_absent() {
        let details = normalize(&fields()).unwrap().to_details();
        assert_eq!(details["blocked-uri"], "http://evil.com/malicious.js");
        assert_eq!(details["line-number"], 42);
        assert!(!details.contains_key("referrer"));
        assert!(!details.contains_key("script-sample"));
    }

    #[test]
    fn empty_report_has_empty_details() {
        let details = NormalizedReport::default().to_details();
        assert!(details.is_empty());
    }
}

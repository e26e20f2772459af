//! HTTP request handlers for the reporting API.

use std::str::FromStr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::{BytesRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use csp_audit::{EventFilter, EventType, NewEvent, SecurityEvent, Severity, SourceContext};
use csp_report::{RejectReason, ReportError, parse_report_body};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::error::{ServerError, ServerResult};
use crate::middleware::SourceKey;
use crate::state::AppState;

/// Query parameters for violation listing. Values are parsed by the handler so
/// that every malformed parameter yields the same error shape.
#[derive(Debug, Default, Deserialize)]
pub struct ViolationQuery {
    /// Event type, `CSP_VIOLATION` when absent.
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    /// RFC 3339 lower time bound (inclusive).
    pub since: Option<String>,
    /// RFC 3339 upper time bound (inclusive).
    pub until: Option<String>,
    /// Minimum severity.
    pub severity: Option<String>,
    /// Maximum number of events.
    pub limit: Option<String>,
}

impl ViolationQuery {
    /// Converts raw parameters into a store filter.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::InvalidQuery`] naming the first bad parameter.
    pub fn to_filter(&self) -> ServerResult<EventFilter> {
        let event_type = match non_empty(self.event_type.as_deref()) {
            Some(raw) => EventType::from_str(raw)
                .map_err(|_| ServerError::InvalidQuery(format!("unknown event type '{raw}'")))?,
            None => EventType::CspViolation,
        };
        let mut filter = EventFilter::for_type(event_type);

        if let Some(raw) = non_empty(self.since.as_deref()) {
            filter = filter.with_since(parse_time("since", raw)?);
        }
        if let Some(raw) = non_empty(self.until.as_deref()) {
            filter = filter.with_until(parse_time("until", raw)?);
        }
        if let (Some(since), Some(until)) = (filter.since, filter.until) {
            if since > until {
                return Err(ServerError::InvalidQuery(
                    "'since' must not be after 'until'".to_string(),
                ));
            }
        }
        if let Some(raw) = non_empty(self.severity.as_deref()) {
            let severity = Severity::from_str(raw)
                .map_err(|_| ServerError::InvalidQuery(format!("unknown severity '{raw}'")))?;
            filter = filter.with_min_severity(severity);
        }
        if let Some(raw) = non_empty(self.limit.as_deref()) {
            let limit = raw
                .parse::<usize>()
                .ok()
                .filter(|l| *l > 0)
                .ok_or_else(|| {
                    ServerError::InvalidQuery(format!(
                        "limit must be a positive integer, got '{raw}'"
                    ))
                })?;
            filter = filter.with_limit(limit);
        }

        Ok(filter)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn parse_time(name: &str, raw: &str) -> ServerResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| ServerError::InvalidQuery(format!("'{name}' must be an RFC 3339 timestamp")))
}

/// Violation listing response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ViolationsResponse {
    /// Number of returned events.
    pub count: usize,
    /// Matching events, most recent first.
    pub violations: Vec<SecurityEvent>,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Status message.
    pub status: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Events currently retained by the audit log.
    pub events: usize,
}

/// Handle POST /security/csp-report - ingest one violation report.
pub async fn report_csp(
    State(state): State<Arc<AppState>>,
    source: Option<Extension<SourceKey>>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> ServerResult<StatusCode> {
    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ServerError::PayloadTooLarge {
                limit: state.config().max_body_bytes,
            }
        } else {
            ServerError::InvalidReport(ReportError::InvalidReportFormat(
                RejectReason::Undecodable {
                    message: rejection.body_text(),
                },
            ))
        }
    })?;

    let report = parse_report_body(&body).inspect_err(|e| {
        debug!(error = %e, "Rejected CSP report");
    })?;

    let classification = state.classifier().explain(&report);

    let mut context = SourceContext::new();
    if let Some(Extension(key)) = source {
        context = context.with_ip(key.0);
    }
    if let Some(agent) = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
    {
        context = context.with_user_agent(agent);
    }

    let event =
        NewEvent::csp_violation(classification.severity, report.to_details()).source(context);
    let receipt = state.store().append(event).inspect_err(|e| {
        error!(error = %e, "Failed to record CSP violation");
    })?;

    info!(
        event_id = %receipt.event_id,
        severity = %classification.severity,
        rule = classification.rule.unwrap_or("fallback"),
        "CSP violation recorded"
    );

    Ok(StatusCode::NO_CONTENT)
}

/// Handle GET /security/csp-violations - list recent violations.
pub async fn list_violations(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ViolationQuery>, QueryRejection>,
) -> ServerResult<Json<ViolationsResponse>> {
    let Query(query) = query.map_err(|e| ServerError::InvalidQuery(e.body_text()))?;
    let filter = query.to_filter()?;

    let violations = state.store().query(&filter)?;

    Ok(Json(ViolationsResponse {
        count: violations.len(),
        violations,
    }))
}

/// Handle GET /health - liveness.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: state.uptime_secs(),
        events: state.store().len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn query(pairs: &[(&str, &str)]) -> ViolationQuery {
        let mut q = ViolationQuery::default();
        for (key, value) in pairs {
            let value = Some((*value).to_string());
            match *key {
                "type" => q.event_type = value,
                "since" => q.since = value,
                "until" => q.until = value,
                "severity" => q.severity = value,
                "limit" => q.limit = value,
                other => panic!("unexpected key {other}"),
            }
        }
        q
    }

    #[test]
    fn test_default_filter_is_csp_violations() {
        let filter = ViolationQuery::default().to_filter().unwrap();
        assert_eq!(filter, EventFilter::for_type(EventType::CspViolation));
    }

    #[test]
    fn test_full_filter() {
        let filter = query(&[
            ("type", "auth_failure"),
            ("since", "2024-01-01T00:00:00Z"),
            ("until", "2024-01-02T00:00:00+02:00"),
            ("severity", "medium"),
            ("limit", "10"),
        ])
        .to_filter()
        .unwrap();

        assert_eq!(filter.event_type, Some(EventType::AuthFailure));
        assert_eq!(filter.min_severity, Some(Severity::Medium));
        assert_eq!(filter.limit, Some(10));
        assert_eq!(
            filter.until.map(|t| t.to_rfc3339()),
            Some("2024-01-01T22:00:00+00:00".to_string())
        );
    }

    #[test]
    fn test_blank_parameters_are_ignored() {
        let filter = query(&[("type", ""), ("severity", " "), ("limit", "")])
            .to_filter()
            .unwrap();
        assert_eq!(filter, EventFilter::for_type(EventType::CspViolation));
    }

    #[test_case("type", "NOT_A_TYPE" ; "unknown type")]
    #[test_case("since", "yesterday" ; "bad since")]
    #[test_case("until", "2024-13-01" ; "bad until")]
    #[test_case("severity", "urgent" ; "unknown severity")]
    #[test_case("limit", "ten" ; "non numeric limit")]
    #[test_case("limit", "0" ; "zero limit")]
    #[test_case("limit", "-5" ; "negative limit")]
    fn test_invalid_parameters(key: &str, value: &str) {
        let result = query(&[(key, value)]).to_filter();
        assert!(matches!(result, Err(ServerError::InvalidQuery(_))));
    }

    #[test]
    fn test_inverted_time_range() {
        let result = query(&[
            ("since", "2024-02-01T00:00:00Z"),
            ("until", "2024-01-01T00:00:00Z"),
        ])
        .to_filter();
        assert!(matches!(result, Err(ServerError::InvalidQuery(_))));
    }
}

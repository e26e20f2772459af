//! Error types for the reporting server.

use std::time::Duration;

use axum::Json;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use csp_audit::AuditError;
use csp_ratelimit::RateLimitError;
use csp_report::ReportError;
use serde::Serialize;
use thiserror::Error;

/// Result type alias for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the reporting server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The request body is not a valid CSP report.
    #[error(transparent)]
    InvalidReport(#[from] ReportError),

    /// A query parameter could not be parsed.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// The request body exceeds the configured limit.
    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge {
        /// Configured limit in bytes.
        limit: usize,
    },

    /// The request source exhausted its admissions.
    #[error(transparent)]
    RateLimited(#[from] RateLimitError),

    /// The audit store failed.
    #[error(transparent)]
    Storage(#[from] AuditError),

    /// Failed to bind to the specified address.
    #[error("failed to bind to {0}: {1}")]
    BindFailed(std::net::SocketAddr, std::io::Error),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Returns the HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidReport(_) | Self::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::RateLimited(RateLimitError::Exceeded { .. }) => StatusCode::TOO_MANY_REQUESTS,
            Self::RateLimited(RateLimitError::Config(_))
            | Self::Storage(_)
            | Self::BindFailed(_, _)
            | Self::Config(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the stable machine-readable code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidReport(err) => err.code(),
            Self::InvalidQuery(_) => "INVALID_QUERY",
            Self::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            Self::RateLimited(err) => err.code(),
            Self::Storage(_) => "AUDIT_STORAGE_UNAVAILABLE",
            Self::BindFailed(_, _) | Self::Config(_) => "CONFIGURATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
}

/// Whole seconds, rounded up.
pub(crate) fn ceil_secs(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorResponse {
            error: self.to_string(),
            code: self.code(),
        };

        let mut response = (status, Json(body)).into_response();

        if let Self::RateLimited(RateLimitError::Exceeded {
            limit, retry_after, ..
        }) = &self
        {
            let reset = ceil_secs(*retry_after).max(1);
            let headers = response.headers_mut();
            headers.insert(HeaderName::from_static("ratelimit-limit"), HeaderValue::from(*limit));
            headers.insert(HeaderName::from_static("ratelimit-remaining"), HeaderValue::from(0u32));
            headers.insert(HeaderName::from_static("ratelimit-reset"), HeaderValue::from(reset));
            headers.insert(axum::http::header::RETRY_AFTER, HeaderValue::from(reset));
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use csp_report::RejectReason;
    use http_body_util::BodyExt;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_invalid_report_response() {
        let err = ServerError::from(ReportError::InvalidReportFormat(RejectReason::EmptyReport));
        let response = err.into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["code"], "INVALID_CSP_REPORT");
        assert!(json["error"].as_str().unwrap().contains("no fields"));
    }

    #[tokio::test]
    async fn test_rate_limited_response_carries_headers() {
        let err = ServerError::from(RateLimitError::Exceeded {
            key: "10.0.0.1".into(),
            limit: 50,
            retry_after: Duration::from_millis(12_300),
        });
        let response = err.into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let headers = response.headers();
        assert_eq!(headers["ratelimit-limit"], "50");
        assert_eq!(headers["ratelimit-remaining"], "0");
        assert_eq!(headers["ratelimit-reset"], "13");
        assert_eq!(headers["retry-after"], "13");

        let json = body_json(response).await;
        assert_eq!(json["code"], "RATE_LIMIT_EXCEEDED");
    }

    #[tokio::test]
    async fn test_storage_error_response() {
        let err = ServerError::from(AuditError::StorageUnavailable("disk gone".into()));
        let response = err.into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["code"], "AUDIT_STORAGE_UNAVAILABLE");
    }

    #[tokio::test]
    async fn test_payload_too_large_response() {
        let response = ServerError::PayloadTooLarge { limit: 10 }.into_response();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let json = body_json(response).await;
        assert_eq!(json["code"], "PAYLOAD_TOO_LARGE");
    }

    #[test]
    fn test_invalid_query_status() {
        let err = ServerError::InvalidQuery("bad severity".into());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "INVALID_QUERY");
        assert_eq!(err.to_string(), "invalid query: bad severity");
    }

    #[test]
    fn test_internal_errors_are_500() {
        assert_eq!(
            ServerError::Config("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ServerError::Internal("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_ceil_secs() {
        assert_eq!(ceil_secs(Duration::ZERO), 0);
        assert_eq!(ceil_secs(Duration::from_secs(5)), 5);
        assert_eq!(ceil_secs(Duration::from_millis(5001)), 6);
    }
}

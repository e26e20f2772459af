//! Route configuration for the reporting API.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, header};
use axum::middleware;
use axum::routing::{Router, get, post};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{health_check, list_violations, report_csp};
use crate::middleware::rate_limit;
use crate::state::AppState;

/// Report ingestion path.
pub const REPORT_PATH: &str = "/security/csp-report";

/// Violation listing path.
pub const VIOLATIONS_PATH: &str = "/security/csp-violations";

/// Liveness path.
pub const HEALTH_PATH: &str = "/health";

/// Create the reporting API router.
///
/// Every response carries the configured policy header and the companion
/// security headers, including rate-limited and error responses.
///
/// Rate limiting runs only on matched routes. Report submissions and
/// violation reads draw on the same per-source budget; [`HEALTH_PATH`] is
/// exempt through the limiter config, and unmatched paths are never counted.
pub fn create_router(state: Arc<AppState>) -> Router {
    let (policy_name, policy_value) = state.policy_header();
    let max_body_bytes = state.config().max_body_bytes;

    Router::new()
        .route(REPORT_PATH, post(report_csp))
        .route(VIOLATIONS_PATH, get(list_violations))
        .route(HEALTH_PATH, get(health_check))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .route_layer(middleware::from_fn_with_state(Arc::clone(&state), rate_limit))
        .with_state(state)
        .layer(SetResponseHeaderLayer::overriding(policy_name, policy_value))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        ))
        .layer(TraceLayer::new_for_http())
}

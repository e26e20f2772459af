//! Request middleware: source identification and rate limiting.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::ExtensionRejection;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use csp_ratelimit::RateLimitDecision;
use tracing::warn;

use crate::error::{ServerError, ceil_secs};
use crate::state::AppState;

/// Key used when the request source cannot be determined.
pub const UNKNOWN_SOURCE: &str = "unknown";

/// The rate limiting key for a request, stored in request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceKey(pub String);

impl SourceKey {
    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Determines the source key for a request.
///
/// With `trust_forwarded_for`, the first `X-Forwarded-For` hop wins; otherwise
/// (or if the header is missing or empty) the peer address is used.
#[must_use]
pub fn source_key(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_forwarded_for: bool,
) -> SourceKey {
    if trust_forwarded_for {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|hop| !hop.is_empty());
        if let Some(hop) = forwarded {
            return SourceKey(hop.to_string());
        }
    }

    SourceKey(peer.map_or_else(|| UNKNOWN_SOURCE.to_string(), |addr| addr.ip().to_string()))
}

/// Tags the request with its [`SourceKey`] and applies the rate limiter.
///
/// The peer address comes from [`ConnectInfo`], so a router served without
/// connect info (or without a `MockConnectInfo` layer in tests) keys every
/// request as [`UNKNOWN_SOURCE`]. Refused requests never reach a handler.
/// Admitted requests carry `RateLimit-*` headers on the response.
pub async fn rate_limit(
    State(state): State<Arc<AppState>>,
    connect_info: Result<ConnectInfo<SocketAddr>, ExtensionRejection>,
    mut request: Request,
    next: Next,
) -> Response {
    let peer = connect_info.ok().map(|ConnectInfo(addr)| addr);
    let key = source_key(request.headers(), peer, state.config().trust_forwarded_for);

    let path = request.uri().path().to_string();
    let decision = match state.limiter().check_and_record(&path, key.as_str()) {
        Ok(decision) => decision,
        Err(err) => {
            warn!(source = key.as_str(), path = %path, "Rate limit exceeded");
            return ServerError::RateLimited(err).into_response();
        }
    };

    request.extensions_mut().insert(key);
    let mut response = next.run(request).await;

    if let RateLimitDecision::Allowed {
        limit,
        remaining,
        reset_after,
    } = decision
    {
        let headers = response.headers_mut();
        headers.insert(
            HeaderName::from_static("ratelimit-limit"),
            HeaderValue::from(limit),
        );
        headers.insert(
            HeaderName::from_static("ratelimit-remaining"),
            HeaderValue::from(remaining),
        );
        headers.insert(
            HeaderName::from_static("ratelimit-reset"),
            HeaderValue::from(ceil_secs(reset_after)),
        );
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn peer() -> Option<SocketAddr> {
        Some(SocketAddr::from(([192, 0, 2, 10], 54_321)))
    }

    fn forwarded(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_peer_address_used_by_default() {
        let key = source_key(&HeaderMap::new(), peer(), false);
        assert_eq!(key.as_str(), "192.0.2.10");
    }

    #[test]
    fn test_forwarded_for_ignored_unless_trusted() {
        let key = source_key(&forwarded("203.0.113.5"), peer(), false);
        assert_eq!(key.as_str(), "192.0.2.10");
    }

    #[test_case("203.0.113.5", "203.0.113.5" ; "single hop")]
    #[test_case("203.0.113.5, 10.0.0.1, 10.0.0.2", "203.0.113.5" ; "first of many")]
    #[test_case("  198.51.100.7 ,10.0.0.1", "198.51.100.7" ; "trimmed")]
    fn test_trusted_forwarded_for(header: &str, expected: &str) {
        let key = source_key(&forwarded(header), peer(), true);
        assert_eq!(key.as_str(), expected);
    }

    #[test]
    fn test_empty_forwarded_for_falls_back_to_peer() {
        let key = source_key(&forwarded(""), peer(), true);
        assert_eq!(key.as_str(), "192.0.2.10");
    }

    #[test]
    fn test_unknown_without_peer() {
        let key = source_key(&HeaderMap::new(), None, true);
        assert_eq!(key, SourceKey(UNKNOWN_SOURCE.to_string()));
    }
}

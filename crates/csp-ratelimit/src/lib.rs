//! # csp-ratelimit
//!
//! Sliding-window request rate limiting keyed by request source.
//!
//! - [`RateLimiter`] - per-key sliding window with atomic check-and-record
//! - [`RateLimitConfig`] - limit, window, enable switch and exempt paths
//! - [`RateLimitDecision`] - admission outcome with header metadata
//!
//! # Example
//!
//! ```rust
//! use csp_ratelimit::{RateLimitConfig, RateLimitDecision, RateLimiter};
//! use std::time::Duration;
//!
//! let limiter = RateLimiter::new(RateLimitConfig::new(2, Duration::from_secs(60)));
//!
//! assert!(limiter.allow("203.0.113.7"));
//! assert!(limiter.allow("203.0.113.7"));
//! assert!(matches!(
//!     limiter.check("203.0.113.7"),
//!     RateLimitDecision::Limited { limit: 2, .. }
//! ));
//!
//! // Health checks never consume admissions.
//! assert_eq!(
//!     limiter.check_request("/health", "203.0.113.7"),
//!     RateLimitDecision::Exempt
//! );
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod rate_limit;

pub use config::{DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW, RateLimitConfig};
pub use error::{RateLimitError, RateLimitResult};
pub use rate_limit::{RateLimitDecision, RateLimiter};

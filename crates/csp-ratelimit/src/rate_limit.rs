//! Per-source request rate limiting.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::debug;

use crate::config::RateLimitConfig;
use crate::error::{RateLimitError, RateLimitResult};

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// The request was admitted and recorded.
    Allowed {
        /// Admissions allowed per window.
        limit: u32,
        /// Admissions left in the current window.
        remaining: u32,
        /// Time until the oldest admission leaves the window.
        reset_after: Duration,
    },
    /// The request was refused; nothing was recorded.
    Limited {
        /// Admissions allowed per window.
        limit: u32,
        /// Time until the next admission would succeed.
        retry_after: Duration,
    },
    /// The request is not subject to limiting (exempt path or limiter disabled).
    Exempt,
}

impl RateLimitDecision {
    /// Returns true unless the request was refused.
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        !matches!(self, Self::Limited { .. })
    }
}

/// Sliding window of admission timestamps for one source key.
#[derive(Debug)]
struct SlidingWindow {
    /// Admission timestamps within the window, oldest first.
    timestamps: VecDeque<Instant>,
    /// Window duration.
    window_size: Duration,
    /// Maximum admissions allowed in window.
    max_requests: u32,
}

impl SlidingWindow {
    fn new(max_requests: u32, window_size: Duration) -> Self {
        Self {
            timestamps: VecDeque::with_capacity(max_requests.min(64) as usize),
            window_size,
            max_requests,
        }
    }

    /// Drops timestamps that have left the window.
    fn evict(&mut self, now: Instant) {
        let Some(cutoff) = now.checked_sub(self.window_size) else {
            return;
        };
        while self.timestamps.front().is_some_and(|t| *t <= cutoff) {
            self.timestamps.pop_front();
        }
    }

    fn len(&self) -> u32 {
        u32::try_from(self.timestamps.len()).unwrap_or(u32::MAX)
    }

    /// Time until the oldest admission expires.
    fn until_oldest_expires(&self, now: Instant) -> Duration {
        self.timestamps
            .front()
            .map_or(Duration::ZERO, |oldest| {
                (*oldest + self.window_size).saturating_duration_since(now)
            })
    }

    /// Admits and records a request if the window has room.
    fn try_request(&mut self, now: Instant) -> RateLimitDecision {
        self.evict(now);

        if self.len() < self.max_requests {
            self.timestamps.push_back(now);
            RateLimitDecision::Allowed {
                limit: self.max_requests,
                remaining: self.max_requests - self.len(),
                reset_after: self.until_oldest_expires(now),
            }
        } else {
            RateLimitDecision::Limited {
                limit: self.max_requests,
                retry_after: self.until_oldest_expires(now),
            }
        }
    }

    fn current_count(&mut self, now: Instant) -> u32 {
        self.evict(now);
        self.len()
    }
}

/// Request rate limiter using a sliding window per source key.
///
/// The check and the record happen under one write lock, so concurrent
/// requests from one key can never be over-admitted.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    /// Sliding windows per source key.
    windows: RwLock<HashMap<String, SlidingWindow>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

impl RateLimiter {
    /// Create a rate limiter from configuration.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: RwLock::new(HashMap::new()),
        }
    }

    /// Admits and records a request for `key` if its window has room.
    #[must_use]
    pub fn allow(&self, key: &str) -> bool {
        self.check(key).is_allowed()
    }

    /// Checks and records a request for `key`, returning the full decision.
    pub fn check(&self, key: &str) -> RateLimitDecision {
        if !self.config.enabled {
            return RateLimitDecision::Exempt;
        }

        let now = Instant::now();
        let mut windows = self.windows.write();

        let window = windows.entry(key.to_string()).or_insert_with(|| {
            SlidingWindow::new(self.config.max_requests, self.config.window)
        });

        let decision = window.try_request(now);
        match decision {
            RateLimitDecision::Allowed { remaining, .. } => {
                debug!(key, remaining, "Request allowed");
            }
            RateLimitDecision::Limited { retry_after, .. } => {
                debug!(
                    key,
                    retry_after_ms = retry_after.as_millis(),
                    "Request rate limited"
                );
            }
            RateLimitDecision::Exempt => {}
        }
        decision
    }

    /// Like [`check`](Self::check), but consults the exempt paths first.
    ///
    /// Exempt requests never touch any window.
    pub fn check_request(&self, path: &str, key: &str) -> RateLimitDecision {
        if self.is_exempt(path) {
            return RateLimitDecision::Exempt;
        }
        self.check(key)
    }

    /// Like [`check_request`](Self::check_request), returning refusals as errors.
    ///
    /// # Errors
    ///
    /// Returns `RateLimitError::Exceeded` if the key's window is full.
    pub fn check_and_record(&self, path: &str, key: &str) -> RateLimitResult<RateLimitDecision> {
        match self.check_request(path, key) {
            RateLimitDecision::Limited { limit, retry_after } => Err(RateLimitError::Exceeded {
                key: key.to_string(),
                limit,
                retry_after,
            }),
            decision => Ok(decision),
        }
    }

    /// Returns true if `path` is exempt from limiting.
    #[must_use]
    pub fn is_exempt(&self, path: &str) -> bool {
        self.config.is_exempt(path)
    }

    /// Drops keys whose windows have emptied. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let now = Instant::now();
        let mut windows = self.windows.write();
        let before = windows.len();
        windows.retain(|_, window| window.current_count(now) > 0);
        let pruned = before - windows.len();
        if pruned > 0 {
            debug!(pruned, remaining = windows.len(), "Pruned idle rate limit keys");
        }
        pruned
    }

    /// Get number of tracked keys.
    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.windows.read().len()
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &RateLimitConfig {
        &self.config
    }
}

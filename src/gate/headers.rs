//! Rate limit response headers.
//!
//! Every time value is sent as an absolute Unix timestamp in seconds, rounded
//! up so a client never retries before the limiter would admit it.

use http::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use std::time::Duration;

use crate::clock::duration_millis_ceil;
use crate::ratelimit::Decision;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Absolute Unix second at which `after` has elapsed from `now_ms`.
pub fn to_unix_seconds(now_ms: u64, after: Duration) -> u64 {
    now_ms.saturating_add(duration_millis_ceil(after)).div_ceil(1_000)
}

/// Time left from `now_ms` until the Unix second `timestamp`.
pub fn until_unix_seconds(timestamp: u64, now_ms: u64) -> Duration {
    Duration::from_millis(timestamp.saturating_mul(1_000).saturating_sub(now_ms))
}

/// The header values describing one decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitHeaders {
    pub limit: u64,
    pub remaining: u64,
    /// Unix second at which the quota is fully replenished
    pub reset_at: u64,
    /// Unix second of the next eligible request; only set on rejection
    pub retry_at: Option<u64>,
}

impl RateLimitHeaders {
    pub fn from_decision(decision: &Decision, now_ms: u64) -> Self {
        Self {
            limit: decision.limit,
            remaining: decision.remaining,
            reset_at: to_unix_seconds(now_ms, decision.reset_after),
            retry_at: (!decision.allowed).then(|| to_unix_seconds(now_ms, decision.retry_after)),
        }
    }

    /// Write the headers into `headers`, replacing existing values.
    pub fn apply(&self, headers: &mut HeaderMap) {
        headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(self.limit));
        headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(self.remaining));
        headers.insert(X_RATELIMIT_RESET, HeaderValue::from(self.reset_at));
        if let Some(retry_at) = self.retry_at {
            headers.insert(RETRY_AFTER, HeaderValue::from(retry_at));
        }
    }
}

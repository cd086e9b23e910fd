//! The outcome of a single admission check.

use std::time::Duration;

/// Result of one admission check.
///
/// Being over budget is a normal decision (`allowed == false`), never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the request may proceed
    pub allowed: bool,
    /// The configured rate of the limit that produced this decision
    pub limit: u64,
    /// Quota left after this request
    pub remaining: u64,
    /// Time until the quota is fully replenished
    pub reset_after: Duration,
    /// Time until the next single request would be allowed; zero when allowed
    pub retry_after: Duration,
}

impl Decision {
    pub fn allowed(limit: u64, remaining: u64, reset_after: Duration) -> Self {
        Self {
            allowed: true,
            limit,
            remaining,
            reset_after,
            retry_after: Duration::ZERO,
        }
    }

    pub fn denied(limit: u64, reset_after: Duration, retry_after: Duration) -> Self {
        Self {
            allowed: false,
            limit,
            remaining: 0,
            reset_after,
            retry_after,
        }
    }
}

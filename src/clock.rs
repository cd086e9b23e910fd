//! Time sources for rate decisions.
//!
//! Clocks report whole milliseconds since the Unix epoch. The rate
//! algorithms widen that to nanoseconds so emission intervals of fast limits
//! keep their precision. Tests swap in [`ManualClock`] to drive time by hand.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Clock abstraction so timing can be faked in tests.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> u64;
}

/// Wall clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Create a clock frozen at `start_millis`.
    pub fn new(start_millis: u64) -> Self {
        Self {
            now: AtomicU64::new(start_millis),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(duration_millis(by), Ordering::SeqCst);
    }

    /// Jump to an absolute instant.
    pub fn set(&self, millis: u64) {
        self.now.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

const NANOS_PER_MILLI: u64 = 1_000_000;

/// Convert a duration to whole milliseconds, saturating at `u64::MAX`.
pub fn duration_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Convert a duration to milliseconds, rounding any fraction up.
pub fn duration_millis_ceil(d: Duration) -> u64 {
    u64::try_from(d.as_nanos().div_ceil(u128::from(NANOS_PER_MILLI))).unwrap_or(u64::MAX)
}

/// Convert a duration to nanoseconds, saturating at `u64::MAX`.
pub fn duration_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

/// Widen a millisecond timestamp to nanoseconds.
pub fn millis_to_nanos(millis: u64) -> u64 {
    millis.saturating_mul(NANOS_PER_MILLI)
}

/// A nanosecond span rounded up to the next whole millisecond.
pub(crate) fn nanos_ceil_to_millis(nanos: u64) -> Duration {
    Duration::from_millis(nanos.div_ceil(NANOS_PER_MILLI))
}

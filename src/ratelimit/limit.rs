//! Limit specifications.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::algorithm::RateAlgorithm;
use super::gcra::Gcra;
use super::sliding_window::SlidingWindow;
use crate::clock::{duration_millis_ceil, duration_nanos};
use crate::error::{GateError, Result};

static SLIDING_WINDOW: SlidingWindow = SlidingWindow;
static GCRA: Gcra = Gcra;

/// Counting strategy used for a limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// Fixed-window counter, one bucket per period
    #[default]
    #[serde(alias = "simple")]
    SlidingWindow,
    /// Generic cell rate algorithm (leaky bucket)
    Gcra,
}

impl Algorithm {
    /// The tag embedded in every rate key built for this algorithm.
    pub fn tag(&self) -> &'static str {
        match self {
            Algorithm::SlidingWindow => "simple",
            Algorithm::Gcra => "gcra",
        }
    }

    pub(crate) fn strategy(&self) -> &'static dyn RateAlgorithm {
        match self {
            Algorithm::SlidingWindow => &SLIDING_WINDOW,
            Algorithm::Gcra => &GCRA,
        }
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// An immutable rate budget.
///
/// GCRA's emission interval `T = period / rate` and tolerance
/// `τ = T * (burst - 1)` are derived once here, in nanoseconds. `T` rounds
/// up so the steady-state rate never exceeds `rate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Limit {
    rate: u64,
    burst: u64,
    period_ns: u64,
    algorithm: Algorithm,
    emission_interval_ns: u64,
    tolerance_ns: u64,
}

impl Limit {
    /// Build a limit, rejecting zero rate, burst or period.
    pub fn new(rate: u64, burst: u64, period: Duration, algorithm: Algorithm) -> Result<Self> {
        if rate == 0 {
            return Err(GateError::Config("rate must be greater than zero".to_string()));
        }
        if burst == 0 {
            return Err(GateError::Config("burst must be greater than zero".to_string()));
        }
        let period_ns = duration_nanos(period);
        if period_ns == 0 {
            return Err(GateError::Config("period must be greater than zero".to_string()));
        }

        // period_ns > 0, so T is at least one nanosecond
        let emission_interval_ns = period_ns.div_ceil(rate);

        Ok(Self {
            rate,
            burst,
            period_ns,
            algorithm,
            emission_interval_ns,
            tolerance_ns: emission_interval_ns.saturating_mul(burst - 1),
        })
    }

    /// Requests per second.
    pub fn per_second(rate: u64, algorithm: Algorithm) -> Result<Self> {
        Self::new(rate, rate, Duration::from_secs(1), algorithm)
    }

    /// Requests per minute.
    pub fn per_minute(rate: u64, algorithm: Algorithm) -> Result<Self> {
        Self::new(rate, rate, Duration::from_secs(60), algorithm)
    }

    pub fn rate(&self) -> u64 {
        self.rate
    }

    pub fn burst(&self) -> u64 {
        self.burst
    }

    pub fn period(&self) -> Duration {
        Duration::from_nanos(self.period_ns)
    }

    /// The period in milliseconds, rounded up.
    pub fn period_millis(&self) -> u64 {
        duration_millis_ceil(self.period())
    }

    pub fn period_nanos(&self) -> u64 {
        self.period_ns
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// GCRA emission interval `T` in nanoseconds.
    pub fn emission_interval_nanos(&self) -> u64 {
        self.emission_interval_ns
    }

    /// GCRA burst tolerance `τ` in nanoseconds.
    pub fn tolerance_nanos(&self) -> u64 {
        self.tolerance_ns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_constants() {
        let limit = Limit::new(3, 3, Duration::from_secs(10), Algorithm::Gcra).unwrap();
        assert_eq!(limit.emission_interval_nanos(), 3_333_333_334);
        assert_eq!(limit.tolerance_nanos(), 6_666_666_668);
    }

    #[test]
    fn test_interval_rounds_against_the_caller() {
        let limit = Limit::new(7, 1, Duration::from_secs(1), Algorithm::Gcra).unwrap();
        assert_eq!(limit.emission_interval_nanos(), 142_857_143);
        assert!(limit.emission_interval_nanos() * 7 >= 1_000_000_000);
    }

    #[test]
    fn test_fast_gcra_limits_are_accepted() {
        let limit = Limit::new(2000, 2000, Duration::from_secs(1), Algorithm::Gcra).unwrap();
        assert_eq!(limit.emission_interval_nanos(), 500_000);
        assert_eq!(limit.tolerance_nanos(), 500_000 * 1_999);

        // More requests than nanoseconds in the period still yields T = 1ns
        let limit = Limit::new(10, 10, Duration::from_nanos(5), Algorithm::Gcra).unwrap();
        assert_eq!(limit.emission_interval_nanos(), 1);
    }

    #[test]
    fn test_same_fields_same_constants() {
        let a = Limit::new(7, 4, Duration::from_millis(1_500), Algorithm::Gcra).unwrap();
        let b = Limit::new(7, 4, Duration::from_millis(1_500), Algorithm::Gcra).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.emission_interval_nanos(), b.emission_interval_nanos());
        assert_eq!(a.tolerance_nanos(), b.tolerance_nanos());
    }

    #[test]
    fn test_burst_of_one_has_no_tolerance() {
        let limit = Limit::new(10, 1, Duration::from_secs(1), Algorithm::Gcra).unwrap();
        assert_eq!(limit.tolerance_nanos(), 0);
    }

    #[test]
    fn test_rejects_zero_fields() {
        let period = Duration::from_secs(1);
        assert!(Limit::new(0, 1, period, Algorithm::SlidingWindow).is_err());
        assert!(Limit::new(1, 0, period, Algorithm::SlidingWindow).is_err());
        assert!(Limit::new(1, 1, Duration::ZERO, Algorithm::SlidingWindow).is_err());
    }

    #[test]
    fn test_period_millis_rounds_up() {
        let period = Duration::from_micros(1_500);
        let limit = Limit::new(1, 1, period, Algorithm::SlidingWindow).unwrap();
        assert_eq!(limit.period_millis(), 2);
        assert_eq!(limit.period_nanos(), 1_500_000);
    }

    #[test]
    fn test_algorithm_tags_and_serde_names() {
        assert_eq!(Algorithm::SlidingWindow.tag(), "simple");
        assert_eq!(Algorithm::Gcra.tag(), "gcra");
        assert_eq!(Algorithm::default(), Algorithm::SlidingWindow);

        let parsed: Algorithm = serde_yaml::from_str("simple").unwrap();
        assert_eq!(parsed, Algorithm::SlidingWindow);
        let parsed: Algorithm = serde_yaml::from_str("sliding_window").unwrap();
        assert_eq!(parsed, Algorithm::SlidingWindow);
        let parsed: Algorithm = serde_yaml::from_str("gcra").unwrap();
        assert_eq!(parsed, Algorithm::Gcra);
    }
}

//! Core rate limiter implementation.

use std::sync::Arc;
use tracing::trace;

use super::decision::Decision;
use super::key::{RateKey, DEFAULT_KEY_PREFIX};
use super::limit::Limit;
use crate::clock::{millis_to_nanos, Clock, SystemClock};
use crate::error::StoreError;
use crate::store::CounterStore;

/// Builds namespaced keys and runs the configured algorithm against the store.
///
/// The limiter holds no per-key state and takes no locks; every piece of
/// shared state lives in the [`CounterStore`]. It is cheap to share across
/// tasks behind an `Arc`.
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    prefix: String,
}

impl RateLimiter {
    /// Create a rate limiter over `store` using the system clock and the
    /// default key prefix.
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }

    /// Replace the key prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Replace the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Check one request for `caller_key` against `limit`.
    ///
    /// Store failures come back as errors; this never turns a failure into
    /// an allow or a deny.
    pub async fn allow(&self, caller_key: &str, limit: &Limit) -> Result<Decision, StoreError> {
        self.allow_at(caller_key, limit, self.clock.now_millis()).await
    }

    /// Like [`RateLimiter::allow`], deciding as of `now_ms` instead of
    /// reading the clock.
    pub async fn allow_at(
        &self,
        caller_key: &str,
        limit: &Limit,
        now_ms: u64,
    ) -> Result<Decision, StoreError> {
        let key = self.key_for(caller_key, limit);

        trace!(
            key = %key,
            algorithm = %limit.algorithm(),
            now_ms = now_ms,
            "Checking rate limit"
        );

        limit
            .algorithm()
            .strategy()
            .check(self.store.as_ref(), &key, limit, millis_to_nanos(now_ms))
            .await
    }

    /// The rate key `caller_key` maps to under `limit`'s algorithm.
    pub fn key_for(&self, caller_key: &str, limit: &Limit) -> RateKey {
        RateKey::new(&self.prefix, limit.algorithm(), caller_key)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn store(&self) -> &Arc<dyn CounterStore> {
        &self.store
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("prefix", &self.prefix)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

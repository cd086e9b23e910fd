//! Window counting.
//!
//! Despite the name this is a fixed-window counter: each period gets its own
//! bucket and the count starts over at every boundary. A caller can therefore
//! be admitted up to twice the rate across a boundary (the tail of one bucket
//! plus the head of the next). Existing deployments size their budgets around
//! that capacity, so it is kept as is.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, trace};

use super::algorithm::RateAlgorithm;
use super::decision::Decision;
use super::key::RateKey;
use super::limit::Limit;
use crate::error::StoreError;
use crate::store::CounterStore;

/// One counter per `floor(now / period)` bucket, expiring after a period.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlidingWindow;

#[async_trait]
impl RateAlgorithm for SlidingWindow {
    async fn check(
        &self,
        store: &dyn CounterStore,
        key: &RateKey,
        limit: &Limit,
        now_ns: u64,
    ) -> Result<Decision, StoreError> {
        let period_ns = limit.period_nanos();
        let window = now_ns / period_ns;
        let bucket = key.bucket_key(window);

        // Creating the bucket and counting this request is one store operation
        let count = store.increment_and_expire(&bucket, limit.period()).await?;

        let window_end = (window + 1).saturating_mul(period_ns);
        let reset_after = Duration::from_nanos(window_end.saturating_sub(now_ns));

        trace!(bucket = %bucket, count = count, rate = limit.rate(), "Counted request");

        if count > limit.rate() {
            debug!(key = %key, count = count, rate = limit.rate(), "Window budget exhausted");
            return Ok(Decision::denied(limit.rate(), reset_after, reset_after));
        }

        Ok(Decision::allowed(limit.rate(), limit.rate() - count, reset_after))
    }
}

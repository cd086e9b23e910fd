//! GCRA (Generic Cell Rate Algorithm) implementation.
//!
//! Each key is a virtual leaky bucket described by a single theoretical
//! arrival time (TAT). A request at `now` conforms when
//! `now >= max(TAT, now) - τ`; conforming requests push the TAT forward by
//! one emission interval `T`.
//!
//! The TAT is read, updated and written back with compare-and-swap against
//! the value that was read. Losing the swap means another request moved the
//! TAT first, so the decision is recomputed from the value the store reports.
//! A plain read-then-write would let two racing requests both admit off the
//! same stale TAT.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, trace};

use super::algorithm::RateAlgorithm;
use super::decision::Decision;
use super::key::RateKey;
use super::limit::Limit;
use crate::clock::{duration_millis, nanos_ceil_to_millis};
use crate::error::StoreError;
use crate::store::CounterStore;

/// Maximum compare-and-swap rounds before giving up on a key.
pub const MAX_CAS_ATTEMPTS: u32 = 16;

/// Leaky-bucket limiter storing one TAT per key.
#[derive(Debug, Clone, Copy, Default)]
pub struct Gcra;

/// TATs are stored as decimal epoch nanoseconds.
pub(crate) fn encode_tat(tat_ns: u64) -> Vec<u8> {
    tat_ns.to_string().into_bytes()
}

pub(crate) fn decode_tat(bytes: &[u8]) -> Option<u64> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

#[async_trait]
impl RateAlgorithm for Gcra {
    async fn check(
        &self,
        store: &dyn CounterStore,
        key: &RateKey,
        limit: &Limit,
        now_ns: u64,
    ) -> Result<Decision, StoreError> {
        let store_key = key.to_string_key();
        let interval = limit.emission_interval_nanos();
        let tolerance = limit.tolerance_nanos();

        let mut observed = store.get(&store_key).await?;

        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let tat = match observed.as_deref() {
                Some(bytes) => {
                    decode_tat(bytes).ok_or_else(|| StoreError::Corrupt(store_key.clone()))?
                }
                None => now_ns,
            };
            let allow_at = tat.max(now_ns);

            if now_ns.saturating_add(tolerance) < allow_at {
                // Clocks tick in milliseconds; waits round up to the next tick
                let retry_after = nanos_ceil_to_millis(allow_at - tolerance - now_ns);
                debug!(
                    key = %key,
                    retry_after_ms = duration_millis(retry_after),
                    "GCRA request not conforming"
                );
                return Ok(Decision::denied(
                    limit.rate(),
                    nanos_ceil_to_millis(tat - now_ns),
                    retry_after,
                ));
            }

            let new_tat = allow_at.saturating_add(interval);
            let reset_after = new_tat - now_ns;
            let outcome = store
                .compare_and_swap(
                    &store_key,
                    observed.as_deref(),
                    &encode_tat(new_tat),
                    Duration::from_nanos(reset_after),
                )
                .await?;

            if outcome.swapped {
                // new_tat - now - T == allow_at - now, which is at most τ here
                let used = allow_at - now_ns;
                let remaining = (tolerance - used) / interval;
                trace!(key = %key, tat = new_tat, remaining = remaining, "GCRA request admitted");
                return Ok(Decision::allowed(
                    limit.rate(),
                    remaining,
                    nanos_ceil_to_millis(reset_after),
                ));
            }

            trace!(key = %key, attempt = attempt, "GCRA compare-and-swap lost, retrying");
            observed = outcome.current;
        }

        Err(StoreError::Contention {
            key: store_key,
            attempts: MAX_CAS_ATTEMPTS,
        })
    }
}

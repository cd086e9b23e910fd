//! Rate algorithm trait shared by the counting strategies.

use async_trait::async_trait;

use super::decision::Decision;
use super::key::RateKey;
use super::limit::Limit;
use crate::error::StoreError;
use crate::store::CounterStore;

/// A counting strategy.
///
/// Implementations turn one admission request at `now_ns`
/// (nanoseconds since the Unix epoch) into a decision by
/// running atomic operations against `store`. They keep no state of their own.
#[async_trait]
pub trait RateAlgorithm: Send + Sync {
    async fn check(
        &self,
        store: &dyn CounterStore,
        key: &RateKey,
        limit: &Limit,
        now_ns: u64,
    ) -> Result<Decision, StoreError>;
}

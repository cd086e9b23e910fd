//! Shared counter store contract.
//!
//! The rate algorithms never touch shared state except through the three
//! operations of [`CounterStore`]. Each must be linearizable per key: two
//! concurrent increments never lose an update and a compare-and-swap only
//! succeeds against the value actually stored at that moment.

mod memory;
#[cfg(feature = "redis")]
mod redis;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::StoreError;

pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisStore;

/// Outcome of a compare-and-swap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CasOutcome {
    /// Whether the new value was written
    pub swapped: bool,
    /// The value stored after the operation
    pub current: Option<Vec<u8>>,
}

impl CasOutcome {
    pub fn swapped(value: Vec<u8>) -> Self {
        Self {
            swapped: true,
            current: Some(value),
        }
    }

    pub fn conflict(current: Option<Vec<u8>>) -> Self {
        Self {
            swapped: false,
            current,
        }
    }
}

/// `url` with any `user:password@` part removed, for logging.
pub fn redacted_url(url: &str) -> String {
    let (scheme, rest) = match url.split_once("://") {
        Some((scheme, rest)) => (Some(scheme), rest),
        None => (None, url),
    };
    let authority_end = rest.find(|c| matches!(c, '/' | '?' | '#')).unwrap_or(rest.len());
    let (authority, tail) = rest.split_at(authority_end);
    let host = authority.rsplit_once('@').map_or(authority, |(_, host)| host);

    match scheme {
        Some(scheme) => format!("{}://{}{}", scheme, host, tail),
        None => format!("{}{}", host, tail),
    }
}

/// Atomic operations required from the shared counter store.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment the integer counter under `key` and return the new count.
    ///
    /// A missing or expired key is created at 1. The key's time to live is set
    /// to `ttl` by the same atomic operation.
    async fn increment_and_expire(&self, key: &str, ttl: Duration) -> Result<u64, StoreError>;

    /// Replace the value under `key` with `new` if it currently equals
    /// `expected`. `expected = None` means the key must be absent.
    ///
    /// On success the key's time to live becomes `ttl`.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: &[u8],
        ttl: Duration,
    ) -> Result<CasOutcome, StoreError>;

    /// Read the raw value under `key`. Counters read back as decimal text.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
}

//! In-process counter store.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

use super::{CasOutcome, CounterStore};
use crate::clock::{duration_millis_ceil, Clock, SystemClock};
use crate::error::StoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Value {
    Count(u64),
    Bytes(Vec<u8>),
}

impl Value {
    fn to_bytes(&self) -> Vec<u8> {
        match self {
            Value::Count(n) => n.to_string().into_bytes(),
            Value::Bytes(b) => b.clone(),
        }
    }
}

#[derive(Debug, Clone)]
struct StoredEntry {
    value: Value,
    /// Absolute expiry in epoch milliseconds
    expires_at: u64,
}

impl StoredEntry {
    fn is_live(&self, now: u64) -> bool {
        self.expires_at > now
    }
}

/// A [`CounterStore`] that keeps entries in a sharded concurrent map.
///
/// Each operation runs while holding the shard lock for its key, which makes
/// every operation atomic per key. Entries expire against the injected clock
/// and are evicted lazily on access or by [`MemoryStore::purge_expired`].
///
/// State is local to the process; share one instance (behind an `Arc`) across
/// every task that must see the same budgets.
#[derive(Debug)]
pub struct MemoryStore {
    entries: DashMap<String, StoredEntry>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    /// Create a store that expires entries against the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a store that expires entries against `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Drop every expired entry and return how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        let purged = before.saturating_sub(self.entries.len());
        if purged > 0 {
            debug!(purged = purged, "Purged expired counter entries");
        }
        purged
    }

    /// Number of entries currently held, including ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every entry.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn increment_and_expire(&self, key: &str, ttl: Duration) -> Result<u64, StoreError> {
        let now = self.clock.now_millis();
        let expires_at = now.saturating_add(duration_millis_ceil(ttl));

        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if !entry.is_live(now) {
                    *entry = StoredEntry {
                        value: Value::Count(1),
                        expires_at,
                    };
                    trace!(key = %key, "Recreated expired counter");
                    return Ok(1);
                }
                match entry.value {
                    Value::Count(ref mut count) => {
                        *count = count.saturating_add(1);
                        entry.expires_at = expires_at;
                        Ok(*count)
                    }
                    Value::Bytes(_) => Err(StoreError::Corrupt(key.to_string())),
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(StoredEntry {
                    value: Value::Count(1),
                    expires_at,
                });
                trace!(key = %key, "Created counter");
                Ok(1)
            }
        }
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: &[u8],
        ttl: Duration,
    ) -> Result<CasOutcome, StoreError> {
        let now = self.clock.now_millis();
        let replacement = StoredEntry {
            value: Value::Bytes(new.to_vec()),
            expires_at: now.saturating_add(duration_millis_ceil(ttl)),
        };

        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let current = occupied.get();
                let current_bytes = current.is_live(now).then(|| current.value.to_bytes());
                if current_bytes.as_deref() == expected {
                    occupied.insert(replacement);
                    Ok(CasOutcome::swapped(new.to_vec()))
                } else {
                    Ok(CasOutcome::conflict(current_bytes))
                }
            }
            Entry::Vacant(vacant) => {
                if expected.is_none() {
                    vacant.insert(replacement);
                    Ok(CasOutcome::swapped(new.to_vec()))
                } else {
                    Ok(CasOutcome::conflict(None))
                }
            }
        }
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let now = self.clock.now_millis();
        let value = self
            .entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.to_bytes());
        Ok(value)
    }
}

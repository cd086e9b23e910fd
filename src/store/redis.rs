//! Redis-backed counter store.
//!
//! Both writes run as Lua scripts so the read-modify-write happens inside the
//! server and stays atomic across every process sharing the instance.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;
use std::time::Duration;
use tracing::info;

use super::{redacted_url, CasOutcome, CounterStore};
use crate::clock::duration_millis_ceil;
use crate::error::StoreError;

const INCREMENT_SCRIPT: &str = r#"
local count = redis.call('INCR', KEYS[1])
redis.call('PEXPIRE', KEYS[1], ARGV[1])
return count
"#;

// Returns {1, new} on success or {0, current} on conflict. A `false` current
// means the key is absent.
const CAS_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
local expected_absent = ARGV[1] == '0'
if (expected_absent and current == false) or (not expected_absent and current == ARGV[2]) then
  redis.call('SET', KEYS[1], ARGV[3], 'PX', ARGV[4])
  return {1, ARGV[3]}
end
return {0, current}
"#;

/// A [`CounterStore`] talking to a Redis server.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    increment: Script,
    cas: Script,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connect to the Redis server at `url` (e.g. `redis://127.0.0.1:6379/0`).
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(unavailable)?;
        let connection = ConnectionManager::new(client).await.map_err(unavailable)?;
        info!(url = %redacted_url(url), "Connected to Redis counter store");
        Ok(Self {
            connection,
            increment: Script::new(INCREMENT_SCRIPT),
            cas: Script::new(CAS_SCRIPT),
        })
    }
}

/// Client-side timeouts keep the client's own message; the gate's
/// `store_timeout_ms` is what produces [`StoreError::Timeout`].
fn unavailable(err: redis::RedisError) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

/// Redis rejects a zero PX, so expiries are at least one millisecond.
fn ttl_millis(ttl: Duration) -> u64 {
    duration_millis_ceil(ttl).max(1)
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn increment_and_expire(&self, key: &str, ttl: Duration) -> Result<u64, StoreError> {
        let mut conn = self.connection.clone();
        let count: u64 = self
            .increment
            .key(key)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(count)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&[u8]>,
        new: &[u8],
        ttl: Duration,
    ) -> Result<CasOutcome, StoreError> {
        let mut conn = self.connection.clone();
        let (flag, expected) = match expected {
            Some(bytes) => ("1", bytes),
            None => ("0", &[][..]),
        };
        let (swapped, current): (i64, Option<Vec<u8>>) = self
            .cas
            .key(key)
            .arg(flag)
            .arg(expected)
            .arg(new)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await
            .map_err(unavailable)?;

        Ok(CasOutcome {
            swapped: swapped == 1,
            current,
        })
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.connection.clone();
        let value: Option<Vec<u8>> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_never_zero() {
        assert_eq!(ttl_millis(Duration::ZERO), 1);
        assert_eq!(ttl_millis(Duration::from_secs(2)), 2_000);
        assert_eq!(ttl_millis(Duration::from_micros(2_500)), 3);
    }

    #[test]
    fn test_client_timeout_maps_to_unavailable() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "read timed out");
        let err = redis::RedisError::from(io);
        assert!(err.is_timeout());

        match unavailable(err) {
            StoreError::Unavailable(message) => assert!(message.contains("timed out")),
            other => panic!("expected Unavailable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connect_rejects_malformed_url() {
        let err = RedisStore::connect("not a url").await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }
}

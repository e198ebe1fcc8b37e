//! `Redis` coordination cache for idempotent order creation.
//!
//! Implements `CoordinationCache` from `table-orders-core` on top of a single
//! `Redis` server (6.0 or later).
//!
//! # Commands
//!
//! - `set_if_absent`: `SET key value NX PX ttl`
//! - `get`: `GET key`
//! - `compare_and_set`: Lua script, `GET` then `SET ... KEEPTTL` if equal
//! - `compare_and_delete`: Lua script, `GET` then `DEL` if equal
//!
//! Each call is one round trip and atomic on the server. `Redis` enforces the
//! expiry, so a claimant that crashes never leaves a marker behind for longer
//! than its TTL.
//!
//! # Example
//!
//! ```no_run
//! use table_orders_redis::RedisCoordinationCache;
//! use table_orders_core::CoordinationCache;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = RedisCoordinationCache::new("redis://127.0.0.1:6379").await?;
//! let placed = cache
//!     .set_if_absent("idempotency:7:abc", "{}", Duration::from_secs(600))
//!     .await?;
//! # Ok(())
//! # }
//! ```

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use std::time::Duration;
use table_orders_core::{CoordinationCache, LedgerError, Result};

const COMPARE_AND_SET: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    redis.call('SET', KEYS[1], ARGV[2], 'KEEPTTL')
    return 1
end
return 0
";

const COMPARE_AND_DELETE: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
";

/// TTL in whole milliseconds for `PX`, never zero.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

fn cache_error(context: &str, e: &redis::RedisError) -> LedgerError {
    LedgerError::CacheUnavailable(format!("{context}: {e}"))
}

/// `Redis`-backed [`CoordinationCache`].
///
/// # Thread Safety
///
/// This type is `Clone` and can be safely shared across threads.
/// Each clone shares the same `ConnectionManager`, which reconnects on its
/// own after the server goes away.
#[derive(Clone)]
pub struct RedisCoordinationCache {
    conn_manager: ConnectionManager,
    compare_and_set: Script,
    compare_and_delete: Script,
}

impl RedisCoordinationCache {
    /// Connect to `Redis`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::CacheUnavailable`] if the URL is malformed or
    /// the server cannot be reached.
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| cache_error("Failed to create Redis client", &e))?;

        let conn_manager = ConnectionManager::new(client)
            .await
            .map_err(|e| cache_error("Failed to create Redis connection manager", &e))?;

        tracing::info!("RedisCoordinationCache initialized successfully");

        Ok(Self {
            conn_manager,
            compare_and_set: Script::new(COMPARE_AND_SET),
            compare_and_delete: Script::new(COMPARE_AND_DELETE),
        })
    }
}

impl std::fmt::Debug for RedisCoordinationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCoordinationCache").finish_non_exhaustive()
    }
}

impl CoordinationCache for RedisCoordinationCache {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn_manager.clone();

        // Nil reply when the key already exists.
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(|e| cache_error("SET NX failed", &e))?;

        Ok(reply.is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn_manager.clone();

        conn.get(key)
            .await
            .map_err(|e| cache_error("GET failed", &e))
    }

    async fn compare_and_set(&self, key: &str, expected: &str, new_value: &str) -> Result<bool> {
        let mut conn = self.conn_manager.clone();

        let swapped: i64 = self
            .compare_and_set
            .key(key)
            .arg(expected)
            .arg(new_value)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| cache_error("compare-and-set script failed", &e))?;

        Ok(swapped == 1)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool> {
        let mut conn = self.conn_manager.clone();

        let deleted: i64 = self
            .compare_and_delete
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| cache_error("compare-and-delete script failed", &e))?;

        Ok(deleted == 1)
    }
}

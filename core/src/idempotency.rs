//! Idempotency keys, claim markers and the coordination cache contract.
//!
//! A claim marker lives in the coordination cache under
//! `idempotency:{table_id}:{key}` and moves through explicit states:
//!
//! ```text
//!   absent ──set_if_absent──▶ Pending { claim_id } ──compare_and_set──▶ Committed { order_id }
//!     ▲                            │                                         │
//!     └──── compare_and_delete ────┘                                         │
//!     └──────────────────────────── TTL eviction ────────────────────────────┘
//! ```
//!
//! The TTL is fixed when the marker is first placed and is never extended.

use crate::error::{LedgerError, Result};
use crate::order::{OrderId, TableId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use uuid::Uuid;

/// Validity window of a claim, counted from the first attempt.
pub const IDEMPOTENCY_TTL: Duration = Duration::from_secs(10 * 60);

/// Longest accepted key, in bytes.
pub const MAX_KEY_LEN: usize = 255;

/// Client-supplied token deduplicating creation requests for a table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Parse and validate a key.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidInput`] if the key is empty, longer than
    /// [`MAX_KEY_LEN`] bytes, or contains anything but visible ASCII.
    pub fn parse(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(LedgerError::invalid("Idempotency key must not be empty"));
        }
        if key.len() > MAX_KEY_LEN {
            return Err(LedgerError::invalid(format!(
                "Idempotency key must be at most {MAX_KEY_LEN} bytes"
            )));
        }
        if !key.bytes().all(|b| b.is_ascii_graphic()) {
            return Err(LedgerError::invalid(
                "Idempotency key must contain only visible ASCII characters",
            ));
        }
        Ok(Self(key))
    }

    /// The key as given by the client.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Cache key of the claim marker, scoped by table.
    ///
    /// Two tables may reuse the same literal key without colliding.
    #[must_use]
    pub fn marker_key(&self, table_id: TableId) -> String {
        format!("idempotency:{table_id}:{}", self.0)
    }
}

impl TryFrom<String> for IdempotencyKey {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<IdempotencyKey> for String {
    fn from(key: IdempotencyKey) -> Self {
        key.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies one claim attempt, so a claimant only ever upgrades or
/// releases its own marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimId(Uuid);

impl ClaimId {
    /// A fresh random claim id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ClaimId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State of a claim marker present in the cache.
///
/// Absence of the marker is the third state and is represented by `None`
/// wherever a marker is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimState {
    /// Claim taken, insert not committed yet.
    Pending {
        /// The claimant's attempt id.
        claim_id: ClaimId,
    },
    /// Insert succeeded and produced this order.
    Committed {
        /// The order created under the key.
        order_id: OrderId,
    },
}

impl ClaimState {
    /// Serialize for storage in the cache.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Internal`] if serialization fails.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| LedgerError::Internal(format!("Failed to encode claim marker: {e}")))
    }

    /// Parse a marker read from the cache.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Internal`] if the payload is not a marker.
    pub fn decode(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| LedgerError::Internal(format!("Corrupt claim marker {raw:?}: {e}")))
    }
}

/// Low-latency keyed store with server-enforced expiry.
///
/// Only used to coordinate idempotency claims. Every method is a single
/// atomic operation on the cache server.
///
/// # Implementations
///
/// - `RedisCoordinationCache` (in `table-orders-redis`): production cache
/// - `InMemoryCoordinationCache` (in `table-orders-testing`): deterministic tests
pub trait CoordinationCache: Send + Sync {
    /// Store `value` under `key` with `ttl` only if `key` is absent.
    ///
    /// Returns `true` if this call placed the value.
    ///
    /// # Errors
    ///
    /// Returns `CacheUnavailable` if the cache cannot be reached.
    fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Read the value under `key`, `None` if absent or expired.
    ///
    /// # Errors
    ///
    /// Returns `CacheUnavailable` if the cache cannot be reached.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>>> + Send;

    /// Replace the value under `key` with `new_value` only if it currently
    /// equals `expected`. The remaining TTL is kept.
    ///
    /// # Errors
    ///
    /// Returns `CacheUnavailable` if the cache cannot be reached.
    fn compare_and_set(
        &self,
        key: &str,
        expected: &str,
        new_value: &str,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Delete `key` only if its value currently equals `expected`.
    ///
    /// # Errors
    ///
    /// Returns `CacheUnavailable` if the cache cannot be reached.
    fn compare_and_delete(
        &self,
        key: &str,
        expected: &str,
    ) -> impl Future<Output = Result<bool>> + Send;
}

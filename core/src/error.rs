//! Error taxonomy shared by the ledger, the coordinator and the facade.
//!
//! Errors are never swallowed on the way up: the store and cache adapters map
//! their driver errors into [`LedgerError`], and every layer above passes them
//! through unchanged.

use crate::order::{OrderId, TableId};
use thiserror::Error;

/// Errors that can occur during ledger and idempotency operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Malformed identifiers, keys or non-causal timestamps.
    ///
    /// Rejected immediately and never retried.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// No order with this id exists for the table.
    #[error("Order {order_id} not found for table {table_id}")]
    NotFound {
        /// The table that was searched.
        table_id: TableId,
        /// The order id that was requested.
        order_id: OrderId,
    },

    /// The durable store could not be reached or failed the query.
    ///
    /// Transient: callers may retry, the idempotency protocol keeps retries safe.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// The coordination cache could not be reached or failed the command.
    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    /// A state that should be impossible (corrupt marker, duplicate rows).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    /// Create an [`LedgerError::InvalidInput`] error.
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create a [`LedgerError::NotFound`] error.
    #[must_use]
    pub const fn not_found(table_id: TableId, order_id: OrderId) -> Self {
        Self::NotFound { table_id, order_id }
    }

    /// Whether the failure is transient and safe to retry.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_) | Self::CacheUnavailable(_))
    }
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

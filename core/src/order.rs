//! Orders and their identifiers.
//!
//! An [`Order`] belongs to exactly one table for its whole life. Its id is
//! allocated by the ledger at insert time and is only meaningful together with
//! the table id: two tables both have an order `1`.

use crate::error::{LedgerError, Result};
use crate::idempotency::IdempotencyKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a table; the shard key of the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableId(i64);

impl TableId {
    /// Create a table id.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// The raw value.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }

    /// Reject negative table ids.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidInput`] if the id is negative.
    pub fn validate(self) -> Result<Self> {
        if self.0 < 0 {
            return Err(LedgerError::invalid(format!("table_id must not be negative, got {}", self.0)));
        }
        Ok(self)
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an order within its table; also the pagination cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(i64);

impl OrderId {
    /// Create an order id.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// The raw value.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }

    /// The cursor for the page after one ending at this id.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the ordered dish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DishId(i64);

impl DishId {
    /// Create a dish id.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// The raw value.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for DishId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of an order. `Cancelled` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// The order is current.
    Active,
    /// The order was cancelled; it stays in the ledger.
    Cancelled,
}

impl OrderStatus {
    /// Convert status to its database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Parse status from its database string.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Internal`] if the string is not a known status.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "ACTIVE" => Ok(Self::Active),
            "CANCELLED" => Ok(Self::Cancelled),
            _ => Err(LedgerError::Internal(format!("Invalid order status: {s}"))),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An order as stored in a table's ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Position in the table's sequence.
    pub id: OrderId,
    /// Owning table.
    pub table_id: TableId,
    /// The ordered dish.
    pub dish_id: DishId,
    /// Current status.
    pub status: OrderStatus,
    /// When the dish is expected to be ready.
    pub ready_time: DateTime<Utc>,
    /// When the order was inserted.
    pub created_at: DateTime<Utc>,
    /// Client key the order was created under, if any.
    pub idempotency_key: Option<IdempotencyKey>,
}

impl Order {
    /// Whether the order is still current.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == OrderStatus::Active
    }

    /// Apply cancellation. Cancelling twice leaves the order unchanged.
    #[must_use]
    pub fn cancelled(mut self) -> Self {
        self.status = OrderStatus::Cancelled;
        self
    }
}

/// Insert request for the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    /// Table to append to.
    pub table_id: TableId,
    /// The ordered dish.
    pub dish_id: DishId,
    /// When the dish is expected to be ready; must be after insertion time.
    pub ready_time: DateTime<Utc>,
    /// Key the order is created under, recorded on the row.
    pub idempotency_key: Option<IdempotencyKey>,
}

impl NewOrder {
    /// Create an insert request without an idempotency key.
    #[must_use]
    pub const fn new(table_id: TableId, dish_id: DishId, ready_time: DateTime<Utc>) -> Self {
        Self {
            table_id,
            dish_id,
            ready_time,
            idempotency_key: None,
        }
    }

    /// Record the idempotency key on the inserted row.
    #[must_use]
    pub fn with_idempotency_key(mut self, key: Option<IdempotencyKey>) -> Self {
        self.idempotency_key = key;
        self
    }

    /// Check the request against the insertion time.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidInput`] if an id is negative or
    /// `ready_time` is not strictly after `created_at`.
    pub fn validate(&self, created_at: DateTime<Utc>) -> Result<()> {
        self.table_id.validate()?;
        if self.dish_id.get() < 0 {
            return Err(LedgerError::invalid(format!(
                "dish_id must not be negative, got {}",
                self.dish_id
            )));
        }
        if self.ready_time <= created_at {
            return Err(LedgerError::invalid(format!(
                "ready_time {} must be after created_at {created_at}",
                self.ready_time
            )));
        }
        Ok(())
    }

    /// Build the stored order once the ledger has allocated an id.
    #[must_use]
    pub fn into_order(self, id: OrderId, created_at: DateTime<Utc>) -> Order {
        Order {
            id,
            table_id: self.table_id,
            dish_id: self.dish_id,
            status: OrderStatus::Active,
            ready_time: self.ready_time,
            created_at,
            idempotency_key: self.idempotency_key,
        }
    }
}

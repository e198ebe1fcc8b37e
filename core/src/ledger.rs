//! The order ledger: the authoritative per-table sequence of orders.
//!
//! # Design
//!
//! The [`LedgerStore`] trait is the whole contract a durable store must
//! satisfy. Every operation takes a [`TableId`], and none spans two tables,
//! so a store may shard by table freely.
//!
//! Id allocation must be atomic in the store itself (an auto-increment scoped
//! to the table, or a per-table counter row updated in the insert
//! transaction). In-process locks do not protect a ledger shared by several
//! service instances.
//!
//! # Implementations
//!
//! - `PostgresLedgerStore` (in `table-orders-postgres`): production store
//! - `InMemoryLedgerStore` (in `table-orders-testing`): fast, deterministic tests

use crate::error::Result;
use crate::order::{NewOrder, Order, OrderId, TableId};
use std::future::Future;

/// Page size used when a listing does not ask for one.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Largest page a listing will return.
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Counter incremented by every [`LedgerStore`] on a successful insert.
pub const LEDGER_ORDERS_CREATED: &str = "ledger.orders_created";

/// Parameters of a cursor-paginated listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListQuery {
    /// Lowest id to return (inclusive).
    pub from_id: Option<OrderId>,
    /// Maximum number of orders to return.
    pub limit: Option<u32>,
    /// Whether cancelled orders are part of the listing.
    pub include_cancelled: bool,
}

impl ListQuery {
    /// All orders of a table, first page, default size, cancelled included.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            from_id: None,
            limit: None,
            include_cancelled: true,
        }
    }

    /// Only active orders.
    #[must_use]
    pub const fn active() -> Self {
        Self {
            from_id: None,
            limit: None,
            include_cancelled: false,
        }
    }

    /// Start the page at `from_id`.
    #[must_use]
    pub const fn from_id(mut self, from_id: Option<OrderId>) -> Self {
        self.from_id = from_id;
        self
    }

    /// Truncate the page to `limit` orders.
    #[must_use]
    pub const fn limit(mut self, limit: Option<u32>) -> Self {
        self.limit = limit;
        self
    }

    /// Lower bound to scan from.
    #[must_use]
    pub fn lower_bound(&self) -> OrderId {
        self.from_id.unwrap_or(OrderId::new(0))
    }

    /// Page size after defaulting and capping.
    #[must_use]
    pub fn effective_limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE)
    }

    /// Whether an order with this id and status belongs in the page range.
    #[must_use]
    pub fn matches(&self, order: &Order) -> bool {
        order.id >= self.lower_bound() && (self.include_cancelled || order.is_active())
    }
}

impl Default for ListQuery {
    fn default() -> Self {
        Self::all()
    }
}

/// Durable store holding the per-table order sequences.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; a single store is shared by all
/// concurrent requests.
pub trait LedgerStore: Send + Sync {
    /// Append a new `ACTIVE` order to its table, allocating the next id.
    ///
    /// Concurrent inserts for the same table never receive the same id, and a
    /// later insert always receives a larger id.
    ///
    /// # Errors
    ///
    /// - `InvalidInput`: negative ids or `ready_time` not after `created_at`
    /// - `StoreUnavailable`: the store could not be reached
    fn insert(&self, order: NewOrder) -> impl Future<Output = Result<Order>> + Send;

    /// Transition an order to `CANCELLED`.
    ///
    /// Cancelling an already cancelled order returns it unchanged.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no such order for the table
    /// - `StoreUnavailable`: the store could not be reached
    fn cancel(
        &self,
        table_id: TableId,
        order_id: OrderId,
    ) -> impl Future<Output = Result<Order>> + Send;

    /// Point lookup, whatever the status.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no such order for the table
    /// - `StoreUnavailable`: the store could not be reached
    fn get(&self, table_id: TableId, order_id: OrderId)
    -> impl Future<Output = Result<Order>> + Send;

    /// Orders of the table with `id >= from_id`, ascending by id, truncated
    /// to the effective limit. Cancelled orders are included only if the
    /// query asks for them; the filter applies before truncation.
    ///
    /// # Errors
    ///
    /// - `StoreUnavailable`: the store could not be reached
    fn list(
        &self,
        table_id: TableId,
        query: ListQuery,
    ) -> impl Future<Output = Result<Vec<Order>>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_defaults_and_caps() {
        assert_eq!(ListQuery::all().effective_limit(), DEFAULT_PAGE_SIZE);
        assert_eq!(ListQuery::all().limit(Some(5)).effective_limit(), 5);
        assert_eq!(ListQuery::all().limit(Some(0)).effective_limit(), 0);
        assert_eq!(ListQuery::all().limit(Some(u32::MAX)).effective_limit(), MAX_PAGE_SIZE);
    }

    #[test]
    fn lower_bound_defaults_to_lowest_id() {
        assert_eq!(ListQuery::active().lower_bound(), OrderId::new(0));
        assert_eq!(
            ListQuery::active().from_id(Some(OrderId::new(9))).lower_bound(),
            OrderId::new(9)
        );
    }
}

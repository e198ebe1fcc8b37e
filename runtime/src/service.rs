//! Order service facade.
//!
//! Composes the [`IdempotencyCoordinator`] and a [`LedgerStore`] into the
//! externally visible operations. It holds no state of its own; it only fixes
//! policy on top of the ledger primitives:
//!
//! - creation goes through the coordinator when a key is supplied
//! - "current orders" means `ACTIVE` orders
//! - lookups and cancellations go straight to the ledger

use crate::coordinator::IdempotencyCoordinator;
use chrono::{DateTime, Duration, Utc};
use table_orders_core::environment::{Clock, SystemClock};
use table_orders_core::{
    CoordinationCache, DishId, IdempotencyKey, LedgerStore, ListQuery, NewOrder, Order, OrderId,
    Result, TableId,
};

/// Facade over the order ledger and the idempotency coordinator.
#[derive(Debug, Clone)]
pub struct OrderService<L, C, K = SystemClock> {
    ledger: L,
    coordinator: IdempotencyCoordinator<C>,
    clock: K,
}

impl<L, C> OrderService<L, C, SystemClock>
where
    L: LedgerStore,
    C: CoordinationCache,
{
    /// Create a service reading wall-clock time.
    #[must_use]
    pub const fn new(ledger: L, coordinator: IdempotencyCoordinator<C>) -> Self {
        Self::with_clock(ledger, coordinator, SystemClock)
    }
}

impl<L, C, K> OrderService<L, C, K>
where
    L: LedgerStore,
    C: CoordinationCache,
    K: Clock,
{
    /// Create a service with an injected clock.
    #[must_use]
    pub const fn with_clock(ledger: L, coordinator: IdempotencyCoordinator<C>, clock: K) -> Self {
        Self {
            ledger,
            coordinator,
            clock,
        }
    }

    /// The underlying ledger.
    pub const fn ledger(&self) -> &L {
        &self.ledger
    }

    /// The idempotency coordinator.
    pub const fn coordinator(&self) -> &IdempotencyCoordinator<C> {
        &self.coordinator
    }

    /// Ready time of an order placed now that takes `preparation` to cook.
    #[must_use]
    pub fn ready_time_after(&self, preparation: Duration) -> DateTime<Utc> {
        self.clock.now() + preparation
    }

    /// Create an order, deduplicated by `idempotency_key` when one is given.
    ///
    /// A retry within the idempotency window returns the order created by the
    /// first attempt, in its current state.
    ///
    /// # Errors
    ///
    /// - `InvalidInput`: negative ids or a `ready_time` that is not in the future
    /// - `StoreUnavailable` / `CacheUnavailable`: a backing service failed
    pub async fn create_order(
        &self,
        table_id: TableId,
        dish_id: DishId,
        ready_time: DateTime<Utc>,
        idempotency_key: Option<IdempotencyKey>,
    ) -> Result<Order> {
        let new_order = NewOrder::new(table_id, dish_id, ready_time)
            .with_idempotency_key(idempotency_key.clone());
        new_order.validate(self.clock.now())?;

        self.coordinator
            .claim_or_join(
                table_id,
                idempotency_key.as_ref(),
                || self.ledger.insert(new_order),
                |order_id| self.ledger.get(table_id, order_id),
            )
            .await
    }

    /// Current (`ACTIVE`) orders of a table, ascending by id.
    ///
    /// Clients page with `from_id = last id of the previous page + 1`.
    ///
    /// # Errors
    ///
    /// - `InvalidInput`: negative table id
    /// - `StoreUnavailable`: the ledger failed
    pub async fn list_orders(
        &self,
        table_id: TableId,
        from_id: Option<OrderId>,
        limit: Option<u32>,
    ) -> Result<Vec<Order>> {
        let table_id = table_id.validate()?;
        let query = ListQuery::active().from_id(from_id).limit(limit);
        self.ledger.list(table_id, query).await
    }

    /// Fetch one order, cancelled or not.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no such order for the table
    /// - `StoreUnavailable`: the ledger failed
    pub async fn get_order(&self, table_id: TableId, order_id: OrderId) -> Result<Order> {
        self.ledger.get(table_id, order_id).await
    }

    /// Cancel an order; cancelling twice returns the cancelled order again.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no such order for the table
    /// - `StoreUnavailable`: the ledger failed
    pub async fn cancel_order(&self, table_id: TableId, order_id: OrderId) -> Result<Order> {
        self.ledger.cancel(table_id, order_id).await
    }
}

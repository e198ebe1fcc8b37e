//! In-memory ledger store.
//!
//! One mutex guards all tables, which makes id allocation trivially
//! linearizable. Each table is an append-only `Vec` kept in id order.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use table_orders_core::environment::{Clock, SystemClock};
use table_orders_core::ledger::LEDGER_ORDERS_CREATED;
use table_orders_core::{
    LedgerError, LedgerStore, ListQuery, NewOrder, Order, OrderId, OrderStatus, Result, TableId,
};

/// In-memory [`LedgerStore`] for fast, deterministic tests.
///
/// Clones share the same tables and switches.
#[derive(Clone)]
pub struct InMemoryLedgerStore {
    tables: Arc<Mutex<HashMap<TableId, Vec<Order>>>>,
    clock: Arc<dyn Clock>,
    unavailable: Arc<AtomicBool>,
    fail_inserts: Arc<AtomicBool>,
    insert_delay: Arc<Mutex<Duration>>,
    inserts: Arc<AtomicUsize>,
}

impl InMemoryLedgerStore {
    /// Create an empty store stamping orders with wall-clock time.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    /// Create an empty store stamping orders with `clock`.
    #[must_use]
    pub fn with_clock(clock: impl Clock + 'static) -> Self {
        Self {
            tables: Arc::new(Mutex::new(HashMap::new())),
            clock: Arc::new(clock),
            unavailable: Arc::new(AtomicBool::new(false)),
            fail_inserts: Arc::new(AtomicBool::new(false)),
            insert_delay: Arc::new(Mutex::new(Duration::ZERO)),
            inserts: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Make every operation fail with `StoreUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make inserts (only) fail with `StoreUnavailable`.
    pub fn set_fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    /// Sleep (on tokio time) before each insert, so concurrent creations overlap.
    pub fn set_insert_delay(&self, delay: Duration) {
        *self.insert_delay.lock().unwrap() = delay;
    }

    /// Number of orders successfully inserted so far, all tables.
    #[must_use]
    pub fn insert_count(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    /// Every order of a table, cancelled included, in id order.
    #[must_use]
    pub fn orders(&self, table_id: TableId) -> Vec<Order> {
        self.tables
            .lock()
            .unwrap()
            .get(&table_id)
            .cloned()
            .unwrap_or_default()
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LedgerError::StoreUnavailable("in-memory ledger switched off".into()));
        }
        Ok(())
    }
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryLedgerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryLedgerStore")
            .field("tables", &self.tables.lock().unwrap().len())
            .field("inserts", &self.insert_count())
            .finish_non_exhaustive()
    }
}

impl LedgerStore for InMemoryLedgerStore {
    async fn insert(&self, order: NewOrder) -> Result<Order> {
        let delay = *self.insert_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.check_available()?;
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(LedgerError::StoreUnavailable("in-memory ledger rejects inserts".into()));
        }

        let created_at = self.clock.now();
        order.validate(created_at)?;

        let mut tables = self.tables.lock().unwrap();
        let table = tables.entry(order.table_id).or_default();
        let id = table.last().map_or(OrderId::new(1), |last| last.id.next());
        let order = order.into_order(id, created_at);
        table.push(order.clone());
        drop(tables);

        self.inserts.fetch_add(1, Ordering::SeqCst);
        metrics::counter!(LEDGER_ORDERS_CREATED).increment(1);
        Ok(order)
    }

    async fn cancel(&self, table_id: TableId, order_id: OrderId) -> Result<Order> {
        self.check_available()?;

        let mut tables = self.tables.lock().unwrap();
        let order = tables
            .get_mut(&table_id)
            .and_then(|table| table.iter_mut().find(|o| o.id == order_id))
            .ok_or(LedgerError::not_found(table_id, order_id))?;
        order.status = OrderStatus::Cancelled;
        Ok(order.clone())
    }

    async fn get(&self, table_id: TableId, order_id: OrderId) -> Result<Order> {
        self.check_available()?;

        self.tables
            .lock()
            .unwrap()
            .get(&table_id)
            .and_then(|table| table.iter().find(|o| o.id == order_id))
            .cloned()
            .ok_or(LedgerError::not_found(table_id, order_id))
    }

    async fn list(&self, table_id: TableId, query: ListQuery) -> Result<Vec<Order>> {
        self.check_available()?;

        let limit = usize::try_from(query.effective_limit()).unwrap_or(usize::MAX);
        Ok(self
            .tables
            .lock()
            .unwrap()
            .get(&table_id)
            .map(|table| {
                table
                    .iter()
                    .filter(|o| query.matches(o))
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

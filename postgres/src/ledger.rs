//! `PostgreSQL` implementation of [`LedgerStore`].
//!
//! # Schema
//!
//! ```sql
//! table_sequences (table_id PK, last_order_id)
//! orders (table_id, id, dish_id, status, ready_time, created_at, idempotency_key,
//!         PRIMARY KEY (table_id, id))
//! ```
//!
//! See `migrations/` for the full definition.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use table_orders_core::environment::{Clock, SystemClock};
use table_orders_core::ledger::LEDGER_ORDERS_CREATED;
use table_orders_core::{
    DishId, IdempotencyKey, LedgerError, LedgerStore, ListQuery, NewOrder, Order, OrderId,
    OrderStatus, Result, TableId,
};

const ORDER_COLUMNS: &str = "id, table_id, dish_id, status, ready_time, created_at, idempotency_key";

/// Postgres error code for a violated CHECK constraint.
const CHECK_VIOLATION: &str = "23514";

/// Row shape shared by every query returning orders.
#[derive(sqlx::FromRow)]
struct OrderRow {
    id: i64,
    table_id: i64,
    dish_id: i64,
    status: String,
    ready_time: DateTime<Utc>,
    created_at: DateTime<Utc>,
    idempotency_key: Option<String>,
}

impl TryFrom<OrderRow> for Order {
    type Error = LedgerError;

    fn try_from(row: OrderRow) -> Result<Self> {
        let idempotency_key = row
            .idempotency_key
            .map(IdempotencyKey::parse)
            .transpose()
            .map_err(|e| LedgerError::Internal(format!("Stored idempotency key is invalid: {e}")))?;

        Ok(Self {
            id: OrderId::new(row.id),
            table_id: TableId::new(row.table_id),
            dish_id: DishId::new(row.dish_id),
            status: OrderStatus::parse(&row.status)?,
            ready_time: row.ready_time,
            created_at: row.created_at,
            idempotency_key,
        })
    }
}

/// Map a driver error into the ledger taxonomy.
fn store_error(context: &str, e: &sqlx::Error) -> LedgerError {
    match e {
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(CHECK_VIOLATION) => {
            LedgerError::invalid(format!("{context}: {}", db_err.message()))
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::ColumnNotFound(_) | sqlx::Error::Decode(_) => {
            LedgerError::Internal(format!("{context}: {e}"))
        }
        _ => LedgerError::StoreUnavailable(format!("{context}: {e}")),
    }
}

/// `PostgreSQL` ledger store.
///
/// Id allocation happens in the database, so any number of service instances
/// may share one store.
#[derive(Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
    clock: Arc<dyn Clock>,
}

impl PostgresLedgerStore {
    /// Create a store over an existing pool, stamping orders with wall-clock time.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self::with_clock(pool, SystemClock)
    }

    /// Create a store with an injected clock for `created_at`.
    #[must_use]
    pub fn with_clock(pool: PgPool, clock: impl Clock + 'static) -> Self {
        Self {
            pool,
            clock: Arc::new(clock),
        }
    }

    /// Connect with a small default pool.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::StoreUnavailable`] if the connection fails.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| LedgerError::StoreUnavailable(format!("Failed to connect: {e}")))?;

        Ok(Self::new(pool))
    }

    /// Run the embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::StoreUnavailable`] if a migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| LedgerError::StoreUnavailable(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl std::fmt::Debug for PostgresLedgerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresLedgerStore")
            .field("pool_size", &self.pool.size())
            .finish_non_exhaustive()
    }
}

impl LedgerStore for PostgresLedgerStore {
    #[tracing::instrument(skip_all, fields(table_id = %order.table_id))]
    async fn insert(&self, order: NewOrder) -> Result<Order> {
        let created_at = self.clock.now();
        order.validate(created_at)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| store_error("Failed to begin transaction", &e))?;

        // The counter row is locked until commit, serializing inserts per table.
        let (id,): (i64,) = sqlx::query_as(
            r"
            INSERT INTO table_sequences (table_id, last_order_id)
            VALUES ($1, 1)
            ON CONFLICT (table_id) DO UPDATE
            SET last_order_id = table_sequences.last_order_id + 1
            RETURNING last_order_id
            ",
        )
        .bind(order.table_id.get())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| store_error("Failed to allocate order id", &e))?;

        let row: OrderRow = sqlx::query_as(&format!(
            r"
            INSERT INTO orders (table_id, id, dish_id, status, ready_time, created_at, idempotency_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(order.table_id.get())
        .bind(id)
        .bind(order.dish_id.get())
        .bind(OrderStatus::Active.as_str())
        .bind(order.ready_time)
        .bind(created_at)
        .bind(order.idempotency_key.as_ref().map(IdempotencyKey::as_str))
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| store_error("Failed to insert order", &e))?;

        tx.commit()
            .await
            .map_err(|e| store_error("Failed to commit order", &e))?;

        let order = Order::try_from(row)?;

        tracing::debug!(
            table_id = %order.table_id,
            order_id = %order.id,
            dish_id = %order.dish_id,
            "Order inserted"
        );
        metrics::counter!(LEDGER_ORDERS_CREATED).increment(1);

        Ok(order)
    }

    #[tracing::instrument(skip_all, fields(table_id = %table_id, order_id = %order_id))]
    async fn cancel(&self, table_id: TableId, order_id: OrderId) -> Result<Order> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            r"
            UPDATE orders
            SET status = $3
            WHERE table_id = $1 AND id = $2
            RETURNING {ORDER_COLUMNS}
            "
        ))
        .bind(table_id.get())
        .bind(order_id.get())
        .bind(OrderStatus::Cancelled.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_error("Failed to cancel order", &e))?;

        let order = row
            .ok_or(LedgerError::not_found(table_id, order_id))
            .and_then(Order::try_from)?;

        tracing::debug!(table_id = %table_id, order_id = %order_id, "Order cancelled");
        Ok(order)
    }

    async fn get(&self, table_id: TableId, order_id: OrderId) -> Result<Order> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE table_id = $1 AND id = $2"
        ))
        .bind(table_id.get())
        .bind(order_id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| store_error("Failed to get order", &e))?;

        row.ok_or(LedgerError::not_found(table_id, order_id))
            .and_then(Order::try_from)
    }

    #[tracing::instrument(skip_all, fields(table_id = %table_id))]
    async fn list(&self, table_id: TableId, query: ListQuery) -> Result<Vec<Order>> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            r"
            SELECT {ORDER_COLUMNS}
            FROM orders
            WHERE table_id = $1
              AND id >= $2
              AND ($3 OR status = $4)
            ORDER BY id ASC
            LIMIT $5
            "
        ))
        .bind(table_id.get())
        .bind(query.lower_bound().get())
        .bind(query.include_cancelled)
        .bind(OrderStatus::Active.as_str())
        .bind(i64::from(query.effective_limit()))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_error("Failed to list orders", &e))?;

        rows.into_iter().map(Order::try_from).collect()
    }
}

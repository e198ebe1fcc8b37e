//! `PostgreSQL` ledger store for per-table order ledgers.
//!
//! This crate provides the production implementation of the `LedgerStore`
//! trait from `table-orders-core`:
//!
//! - Per-table id allocation through a counter row bumped in the insert
//!   transaction
//! - Cancellation as a status update (rows are never deleted)
//! - Cursor-paginated listing backed by the `(table_id, id)` primary key
//! - Embedded migrations
//!
//! # Example
//!
//! ```ignore
//! use table_orders_postgres::PostgresLedgerStore;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let ledger = PostgresLedgerStore::connect("postgres://localhost/orders").await?;
//!     ledger.migrate().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod ledger;

pub use ledger::PostgresLedgerStore;

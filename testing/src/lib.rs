//! # Table Orders Testing
//!
//! Testing utilities for the order ledger and the idempotency coordinator.
//!
//! This crate provides:
//! - [`InMemoryLedgerStore`]: a `LedgerStore` with per-table id sequences
//! - [`InMemoryCoordinationCache`]: a `CoordinationCache` whose TTLs run on
//!   tokio time, so `tokio::time::pause()` and `advance()` control expiry
//! - [`ManualClock`]: a clock tests can move forward
//! - fault injection switches on both stores
//!
//! ## Example
//!
//! ```
//! use table_orders_core::{DishId, LedgerStore, NewOrder, TableId};
//! use table_orders_testing::{InMemoryLedgerStore, test_clock};
//! use chrono::Duration;
//! use table_orders_core::environment::Clock;
//!
//! # tokio_test_block_on(async {
//! let clock = test_clock();
//! let ledger = InMemoryLedgerStore::with_clock(clock.clone());
//!
//! let order = ledger
//!     .insert(NewOrder::new(TableId::new(7), DishId::new(1), clock.now() + Duration::minutes(5)))
//!     .await
//!     .unwrap();
//! assert_eq!(order.id.get(), 1);
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

#![allow(clippy::unwrap_used)] // Test utilities can use unwrap on poisoned locks

pub mod cache;
pub mod clock;
pub mod ledger;

// Re-export commonly used items
pub use cache::InMemoryCoordinationCache;
pub use clock::{ManualClock, test_clock};
pub use ledger::InMemoryLedgerStore;

//! # Table Orders Core
//!
//! Domain types, validation and storage abstractions for per-table order
//! ledgers.
//!
//! This crate has no I/O of its own. It defines:
//!
//! - **Orders**: [`order::Order`] and its identifiers, status and validation
//! - **Ledger**: the [`ledger::LedgerStore`] trait every durable store implements
//! - **Idempotency**: keys, claim markers and the [`idempotency::CoordinationCache`] trait
//! - **Errors**: the [`error::LedgerError`] taxonomy shared by every layer
//! - **Environment**: the [`environment::Clock`] abstraction
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  OrderService (runtime)                 │  policy: "current" = ACTIVE
//! ├───────────────────────┬─────────────────┤
//! │ IdempotencyCoordinator│                 │
//! ├───────────────────────┤   LedgerStore   │  per-table id sequence
//! │   CoordinationCache   │                 │
//! └───────────────────────┴─────────────────┘
//! ```
//!
//! Every ledger operation is scoped by a single [`order::TableId`], so stores
//! may be partitioned by table without cross-partition coordination.
//!
//! ## Example
//!
//! ```
//! use table_orders_core::order::{DishId, NewOrder, TableId};
//! use chrono::{Duration, Utc};
//!
//! let now = Utc::now();
//! let order = NewOrder::new(TableId::new(7), DishId::new(3), now + Duration::minutes(5));
//! assert!(order.validate(now).is_ok());
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};

pub mod environment;
pub mod error;
pub mod idempotency;
pub mod ledger;
pub mod order;

pub use error::{LedgerError, Result};
pub use idempotency::{ClaimState, CoordinationCache, IdempotencyKey};
pub use ledger::{ListQuery, LedgerStore};
pub use order::{DishId, NewOrder, Order, OrderId, OrderStatus, TableId};

//! # Table Orders Runtime
//!
//! The parts of the order system that coordinate I/O:
//!
//! - [`coordinator::IdempotencyCoordinator`]: at most one order per
//!   `(table_id, idempotency key)` within the validity window
//! - [`service::OrderService`]: create, list, get and cancel on top of a
//!   ledger store and a coordination cache
//! - [`backoff::BackoffPolicy`]: bounded polling used while joining a
//!   pending claim
//! - [`metrics`]: counter names and the Prometheus exporter
//!
//! Stores are injected through the traits in `table-orders-core`, so the same
//! code runs against Postgres and Redis in production and against in-memory
//! doubles in tests.
//!
//! ## Example
//!
//! ```ignore
//! use table_orders_runtime::{IdempotencyCoordinator, OrderService};
//!
//! let service = OrderService::new(ledger, IdempotencyCoordinator::new(cache));
//! let order = service
//!     .create_order(table_id, dish_id, service.ready_time_after(prep), Some(key))
//!     .await?;
//! ```

pub mod backoff;
pub mod coordinator;
pub mod metrics;
pub mod service;

pub use backoff::BackoffPolicy;
pub use coordinator::IdempotencyCoordinator;
pub use metrics::MetricsServer;
pub use service::OrderService;

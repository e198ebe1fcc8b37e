//! Axum HTTP API for per-table order ledgers.
//!
//! Thin imperative shell over [`table_orders_runtime::OrderService`]: handlers
//! parse the request, call one service operation and map the result to a
//! response.
//!
//! # Routes
//!
//! ```text
//! GET    /health
//! POST   /v1/tables/:table_id/orders              (Idempotency-Key header optional)
//! GET    /v1/tables/:table_id/orders?from_id=&limit=
//! GET    /v1/tables/:table_id/orders/:order_id
//! DELETE /v1/tables/:table_id/orders/:order_id
//! ```
//!
//! # Example
//!
//! ```ignore
//! use table_orders_web::{build_router, AppState};
//!
//! let app = build_router(AppState::new(service, chrono::Duration::minutes(15)));
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, app).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

// Re-export key types for convenience
pub use error::AppError;
pub use extractors::{IDEMPOTENCY_KEY_HEADER, IdempotencyKeyHeader};
pub use middleware::{REQUEST_ID_HEADER, with_request_tracing};
pub use routes::build_router;
pub use state::AppState;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;

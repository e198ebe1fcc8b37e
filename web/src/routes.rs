//! Router assembly.

use crate::handlers::{cancel_order, create_order, get_order, health_check, list_orders};
use crate::middleware::with_request_tracing;
use crate::state::AppState;
use axum::{Router, routing::get};
use table_orders_core::{CoordinationCache, LedgerStore};

/// Build the application router.
///
/// ```text
/// GET    /health
/// POST   /v1/tables/:table_id/orders
/// GET    /v1/tables/:table_id/orders
/// GET    /v1/tables/:table_id/orders/:order_id
/// DELETE /v1/tables/:table_id/orders/:order_id
/// ```
pub fn build_router<L, C>(state: AppState<L, C>) -> Router
where
    L: LedgerStore + 'static,
    C: CoordinationCache + 'static,
{
    let orders = Router::new()
        .route(
            "/tables/:table_id/orders",
            get(list_orders::<L, C>).post(create_order::<L, C>),
        )
        .route(
            "/tables/:table_id/orders/:order_id",
            get(get_order::<L, C>).delete(cancel_order::<L, C>),
        );

    let router = Router::new()
        .route("/health", get(health_check))
        .nest("/v1", orders)
        .with_state(state);

    with_request_tracing(router)
}

//! Order endpoints under `/v1/tables/:table_id/orders`.
//!
//! Timestamps on the wire are unix seconds.

use crate::error::AppError;
use crate::extractors::IdempotencyKeyHeader;
use crate::state::AppState;
use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use table_orders_core::{
    CoordinationCache, DishId, LedgerStore, Order, OrderId, OrderStatus, TableId,
};

/// Body of `POST /v1/tables/:table_id/orders`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CreateOrderRequest {
    /// Dish to order.
    pub dish_id: i64,
    /// Minutes until the dish is ready; the server default when absent.
    #[serde(default)]
    pub preparation_minutes: Option<u32>,
}

/// Query string of `GET /v1/tables/:table_id/orders`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListOrdersQuery {
    /// Lowest order id to include.
    pub from_id: Option<i64>,
    /// Page size.
    pub limit: Option<u32>,
}

/// Order as returned by every endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderResponse {
    /// Order id, unique within the table.
    pub id: i64,
    /// Owning table.
    pub table_id: i64,
    /// Ordered dish.
    pub dish_id: i64,
    /// `ACTIVE` or `CANCELLED`.
    pub status: OrderStatus,
    /// When the dish is expected to be ready.
    #[serde(with = "chrono::serde::ts_seconds")]
    pub ready_time: DateTime<Utc>,
    /// When the order was created.
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id.get(),
            table_id: order.table_id.get(),
            dish_id: order.dish_id.get(),
            status: order.status,
            ready_time: order.ready_time,
            created_at: order.created_at,
        }
    }
}

/// Create an order for a table.
///
/// ```text
/// POST /v1/tables/:table_id/orders
/// Idempotency-Key: <optional>
/// { "dish_id": 3, "preparation_minutes": 10 }
/// ```
///
/// Returns `201 Created`. Retrying with the same `Idempotency-Key` within the
/// validity window returns the order created by the first attempt.
///
/// # Errors
///
/// 400 for malformed input, 503 if the ledger or cache is unavailable.
pub async fn create_order<L, C>(
    State(state): State<AppState<L, C>>,
    path: Result<Path<i64>, PathRejection>,
    IdempotencyKeyHeader(idempotency_key): IdempotencyKeyHeader,
    body: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<OrderResponse>), AppError>
where
    L: LedgerStore + 'static,
    C: CoordinationCache + 'static,
{
    let Path(table_id) = path?;
    let Json(request) = body?;

    let preparation = request
        .preparation_minutes
        .map_or(state.default_preparation, |m| Duration::minutes(i64::from(m)));
    let ready_time = state.orders.ready_time_after(preparation);

    let order = state
        .orders
        .create_order(
            TableId::new(table_id),
            DishId::new(request.dish_id),
            ready_time,
            idempotency_key,
        )
        .await?;

    tracing::info!(
        table_id = %order.table_id,
        order_id = %order.id,
        dish_id = %order.dish_id,
        "Order created"
    );

    Ok((StatusCode::CREATED, Json(order.into())))
}

/// Current orders of a table, ascending by id.
///
/// ```text
/// GET /v1/tables/:table_id/orders?from_id=&limit=
/// ```
///
/// The next page starts at `from_id = last id + 1`.
///
/// # Errors
///
/// 400 for a malformed table id or query, 503 if the ledger is unavailable.
pub async fn list_orders<L, C>(
    State(state): State<AppState<L, C>>,
    path: Result<Path<i64>, PathRejection>,
    query: Result<Query<ListOrdersQuery>, QueryRejection>,
) -> Result<Json<Vec<OrderResponse>>, AppError>
where
    L: LedgerStore + 'static,
    C: CoordinationCache + 'static,
{
    let Path(table_id) = path?;
    let Query(query) = query?;

    let orders = state
        .orders
        .list_orders(
            TableId::new(table_id),
            query.from_id.map(OrderId::new),
            query.limit,
        )
        .await?;

    Ok(Json(orders.into_iter().map(OrderResponse::from).collect()))
}

/// Fetch one order, cancelled or not.
///
/// ```text
/// GET /v1/tables/:table_id/orders/:order_id
/// ```
///
/// # Errors
///
/// 404 if the table has no such order.
pub async fn get_order<L, C>(
    State(state): State<AppState<L, C>>,
    path: Result<Path<(i64, i64)>, PathRejection>,
) -> Result<Json<OrderResponse>, AppError>
where
    L: LedgerStore + 'static,
    C: CoordinationCache + 'static,
{
    let Path((table_id, order_id)) = path?;

    let order = state
        .orders
        .get_order(TableId::new(table_id), OrderId::new(order_id))
        .await?;

    Ok(Json(order.into()))
}

/// Cancel an order. Cancelling twice returns the cancelled order again.
///
/// ```text
/// DELETE /v1/tables/:table_id/orders/:order_id
/// ```
///
/// # Errors
///
/// 404 if the table has no such order.
pub async fn cancel_order<L, C>(
    State(state): State<AppState<L, C>>,
    path: Result<Path<(i64, i64)>, PathRejection>,
) -> Result<Json<OrderResponse>, AppError>
where
    L: LedgerStore + 'static,
    C: CoordinationCache + 'static,
{
    let Path((table_id, order_id)) = path?;

    let order = state
        .orders
        .cancel_order(TableId::new(table_id), OrderId::new(order_id))
        .await?;

    tracing::info!(table_id = %order.table_id, order_id = %order.id, "Order cancelled");

    Ok(Json(order.into()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_order_response_uses_unix_seconds() {
        let created_at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let response = OrderResponse {
            id: 1,
            table_id: 7,
            dish_id: 3,
            status: OrderStatus::Active,
            ready_time: created_at + Duration::minutes(15),
            created_at,
        };

        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "id": 1,
                "table_id": 7,
                "dish_id": 3,
                "status": "ACTIVE",
                "ready_time": 1_700_000_900,
                "created_at": 1_700_000_000,
            })
        );
    }

    #[test]
    fn test_preparation_minutes_is_optional() {
        let request: CreateOrderRequest = serde_json::from_str(r#"{"dish_id": 3}"#).unwrap();
        assert_eq!(request.dish_id, 3);
        assert_eq!(request.preparation_minutes, None);
    }
}

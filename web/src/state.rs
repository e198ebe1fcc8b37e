//! Application state for Axum handlers.

use chrono::Duration;
use std::sync::Arc;
use table_orders_core::{CoordinationCache, LedgerStore};
use table_orders_runtime::OrderService;

/// Preparation time, in minutes, assumed when a create request does not give one.
pub const DEFAULT_PREPARATION_MINUTES: u32 = 15;

/// Application state shared across all HTTP handlers.
pub struct AppState<L, C> {
    /// The order service every handler calls into.
    pub orders: Arc<OrderService<L, C>>,
    /// Preparation time used when the request omits `preparation_minutes`.
    pub default_preparation: Duration,
}

impl<L, C> AppState<L, C>
where
    L: LedgerStore,
    C: CoordinationCache,
{
    /// Create a new application state.
    #[must_use]
    pub fn new(orders: OrderService<L, C>, default_preparation: Duration) -> Self {
        Self {
            orders: Arc::new(orders),
            default_preparation,
        }
    }
}

// Manual impl: the service is behind an `Arc`, so `L` and `C` need not be `Clone`.
impl<L, C> Clone for AppState<L, C> {
    fn clone(&self) -> Self {
        Self {
            orders: Arc::clone(&self.orders),
            default_preparation: self.default_preparation,
        }
    }
}

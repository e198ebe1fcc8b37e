//! HTTP request handlers.

pub mod health;
pub mod orders;

pub use health::health_check;
pub use orders::{cancel_order, create_order, get_order, list_orders};

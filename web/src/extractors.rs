//! Custom Axum extractors.
//!
//! - `IdempotencyKeyHeader`: the optional `Idempotency-Key` request header
//!
//! # Examples
//!
//! ```ignore
//! use table_orders_web::extractors::IdempotencyKeyHeader;
//!
//! async fn handler(IdempotencyKeyHeader(key): IdempotencyKeyHeader) -> String {
//!     key.map_or_else(|| "no key".to_string(), |k| k.to_string())
//! }
//! ```

use crate::error::AppError;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use table_orders_core::IdempotencyKey;

/// Header carrying the client's idempotency key.
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// Idempotency key supplied by the client, if any.
///
/// A missing header yields `None`. A header that is present but not a valid
/// key (empty, too long, not visible ASCII) is rejected with 400 rather than
/// silently creating an undeduplicated order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyKeyHeader(pub Option<IdempotencyKey>);

#[async_trait]
impl<S> FromRequestParts<S> for IdempotencyKeyHeader
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(value) = parts.headers.get(IDEMPOTENCY_KEY_HEADER) else {
            return Ok(Self(None));
        };

        let raw = value
            .to_str()
            .map_err(|_| AppError::bad_request("Idempotency-Key must be visible ASCII"))?;

        let key = IdempotencyKey::parse(raw)?;
        Ok(Self(Some(key)))
    }
}

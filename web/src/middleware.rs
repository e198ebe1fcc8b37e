//! Axum middleware for request tracking and observability.
//!
//! Every request gets an `x-request-id` (taken from the client or generated
//! as a UUID), a tracing span carrying it, and the same id echoed on the
//! response.
//!
//! # Example
//!
//! ```ignore
//! use table_orders_web::middleware::with_request_tracing;
//!
//! let app = with_request_tracing(Router::new().route("/health", get(health_check)));
//! ```

use axum::{Router, body::Body, http::Request};
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::Span;

/// Header name for request ids.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Wrap a router with request-id and HTTP tracing layers.
///
/// Layer order, outermost first:
/// 1. set `x-request-id` if the client did not send one
/// 2. open an `http_request` span with the id, method and URI
/// 3. copy the id onto the response
#[must_use]
pub fn with_request_tracing<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(PropagateRequestIdLayer::x_request_id()),
    )
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");

    tracing::info_span!(
        "http_request",
        request_id = %request_id,
        method = %request.method(),
        uri = %request.uri(),
    )
}

//! Cartwheel Storefront library.
//!
//! Cart reconciliation, order/invoice numbering, and order creation behind an
//! axum HTTP surface. The binary in `main.rs` wires configuration, tracing,
//! and Sentry around [`app`]; tests drive [`app`] directly.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;

use std::time::Duration;

use axum::{Router, http::Request, response::Response};
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tracing::Span;

use crate::middleware::{RateLimiterLayer, request_id_middleware};
use crate::state::AppState;

/// Build the full router: routes, request IDs, and request tracing.
///
/// Sentry layers are added by the binary, outermost.
pub fn app(state: AppState, checkout_limiter: Option<RateLimiterLayer>) -> Router {
    routes::routes(checkout_limiter)
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = tracing::field::Empty,
                        client_id = tracing::field::Empty,
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(|response: &Response<_>, latency: Duration, span: &Span| {
                    span.record("status", response.status().as_u16());
                    span.record(
                        "latency_ms",
                        u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                    );
                    DefaultOnResponse::default().on_response(response, latency, span);
                }),
        )
        .with_state(state)
}

//! HTTP route handlers for the storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health               - Liveness
//! GET    /health/ready         - Storage reachable
//!
//! # Cart (bearer identity required)
//! GET    /cart                 - Current cart
//! POST   /cart                 - Add item (optional Idempotency-Key header)
//! PUT    /cart                 - Tagged action: updateQuantity | replaceAll | removeItem | clear
//! DELETE /cart                 - Clear
//!
//! # Orders
//! POST   /orders               - Create order (public, rate limited)
//! GET    /orders               - List orders (admin)
//! GET    /orders/{number}      - Order by order or invoice number (admin)
//! PATCH  /orders/{number}      - Update status/notes (admin)
//! ```

pub mod cart;
pub mod health;
pub mod orders;

use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::middleware::{RateLimiterLayer, rate_limit_response};
use crate::state::AppState;

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new().route(
        "/",
        get(cart::show)
            .post(cart::add)
            .put(cart::update)
            .delete(cart::clear),
    )
}

/// Create the order routes router.
///
/// `checkout_limiter` applies to `POST /orders` only.
pub fn order_routes(checkout_limiter: Option<RateLimiterLayer>) -> Router<AppState> {
    let create = match checkout_limiter {
        Some(limiter) => post(orders::create)
            .layer(limiter)
            .layer(middleware::map_response(rate_limit_response)),
        None => post(orders::create),
    };

    Router::new()
        .route("/", create.get(orders::list))
        .route("/{number}", get(orders::show).patch(orders::update))
}

/// Create all routes for the storefront.
pub fn routes(checkout_limiter: Option<RateLimiterLayer>) -> Router<AppState> {
    Router::new()
        .route("/health", get(health::live))
        .route("/health/ready", get(health::ready))
        .nest("/cart", cart_routes())
        .nest("/orders", order_routes(checkout_limiter))
}

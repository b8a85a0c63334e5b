//! HTTP middleware stack for the storefront.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (hub per request, capture errors)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. Rate limiting (governor, `POST /orders` only)
//!
//! Authentication is not a layer: handlers take the extractors from
//! [`auth`].

pub mod auth;
pub mod rate_limit;
pub mod request_id;

pub use auth::{OptionalIdentity, RequireAdmin, RequireIdentity};
pub use rate_limit::{RateLimiterLayer, checkout_rate_limiter, rate_limit_response};
pub use request_id::{REQUEST_ID_HEADER, request_id_middleware};

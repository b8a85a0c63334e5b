//! Integration test harness for the Cartwheel storefront.
//!
//! Tests drive the full router in-process with `tower::ServiceExt::oneshot`
//! against in-memory storage, so no database or network is needed.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p cartwheel-integration-tests
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use secrecy::SecretString;
use serde_json::{Value, json};
use tower::ServiceExt;

use cartwheel_core::{ClientId, Role};
use cartwheel_storefront::config::StorefrontConfig;
use cartwheel_storefront::db::Storage;
use cartwheel_storefront::middleware::RateLimiterLayer;
use cartwheel_storefront::services::{Catalog, LogNotifier, Notifier, SignedTokenResolver};
use cartwheel_storefront::state::AppState;

/// Secret shared by the app under test and the token issuer.
pub const TEST_SECRET: &str = "integration-test-secret-0123456789abcdef";

/// A response with its body decoded as JSON (or as a JSON string when the
/// body is not JSON).
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    /// The `error.code` field of an error envelope.
    #[must_use]
    pub fn error_code(&self) -> Option<&str> {
        self.body["error"]["code"].as_str()
    }
}

/// An in-memory storefront plus a token issuer.
#[derive(Clone)]
pub struct TestApp {
    pub state: AppState,
    router: Router,
    tokens: Arc<SignedTokenResolver>,
}

impl TestApp {
    /// In-memory app with the log notifier, no catalog, no rate limiter.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    #[must_use]
    pub fn builder() -> TestAppBuilder {
        TestAppBuilder::default()
    }

    /// Token for a shopper.
    ///
    /// # Panics
    ///
    /// Panics if `client_id` is not a valid client identity.
    #[must_use]
    pub fn customer_token(&self, client_id: &str) -> String {
        self.token(client_id, Role::Customer)
    }

    /// Token for staff.
    #[must_use]
    pub fn admin_token(&self) -> String {
        self.token("ops@cartwheel.test", Role::Admin)
    }

    fn token(&self, client_id: &str, role: Role) -> String {
        #[allow(clippy::expect_used)]
        let client_id = ClientId::parse(client_id).expect("valid client id");
        self.tokens.issue(&client_id, role)
    }

    /// Send a request through the router.
    ///
    /// # Panics
    ///
    /// Panics if the request cannot be built or the body cannot be read.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        self.request_with_headers(method, uri, token, body, &[]).await
    }

    /// Send a request with extra headers.
    ///
    /// # Panics
    ///
    /// Panics if the request cannot be built or the body cannot be read.
    #[allow(clippy::expect_used)]
    pub async fn request_with_headers(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request builds");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body reads");
        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));

        TestResponse {
            status,
            headers,
            body,
        }
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

/// Configures a [`TestApp`].
#[derive(Default)]
pub struct TestAppBuilder {
    notifier: Option<Arc<dyn Notifier>>,
    catalog: Option<Arc<dyn Catalog>>,
    limiter: Option<RateLimiterLayer>,
}

impl TestAppBuilder {
    #[must_use]
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    #[must_use]
    pub fn catalog(mut self, catalog: Arc<dyn Catalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    #[must_use]
    pub fn rate_limiter(mut self, limiter: RateLimiterLayer) -> Self {
        self.limiter = Some(limiter);
        self
    }

    #[must_use]
    pub fn build(self) -> TestApp {
        let secret = SecretString::from(TEST_SECRET);
        let tokens = Arc::new(SignedTokenResolver::new(secret.clone()));
        let state = AppState::assemble(
            StorefrontConfig::in_memory(secret),
            Storage::in_memory(),
            tokens.clone(),
            self.notifier.unwrap_or_else(|| Arc::new(LogNotifier)),
            self.catalog,
        );
        let router = cartwheel_storefront::app(state.clone(), self.limiter);

        TestApp {
            state,
            router,
            tokens,
        }
    }
}

/// A cart line as posted to `POST /cart`.
#[must_use]
pub fn cart_item(product_ref: &str, unit_price: &str, quantity: i64) -> Value {
    json!({
        "productRef": product_ref,
        "name": format!("Product {product_ref}"),
        "unitPrice": unit_price,
        "imageRef": format!("/img/{product_ref}.jpg"),
        "quantity": quantity,
    })
}

/// A valid order request body.
#[must_use]
pub fn order_request() -> Value {
    json!({
        "customer": {
            "name": "Ada Lovelace",
            "email": "ada@example.com",
            "phone": "+44 20 7946 0000",
            "address": "12 Analytical Row",
            "city": "London",
            "postalCode": "N1 9GU",
            "country": "GB"
        },
        "items": [
            {"productRef": "1001", "name": "Coffee", "unitPrice": "8.00", "quantity": 2}
        ],
        "subtotal": "16.00",
        "tax": "1.60",
        "shipping": "4.99",
        "paymentMethod": "card"
    })
}

/// Read a money field serialized as a decimal string.
///
/// # Panics
///
/// Panics if `value` is not a decimal string.
#[must_use]
pub fn decimal(value: &Value) -> rust_decimal::Decimal {
    #[allow(clippy::expect_used)]
    value
        .as_str()
        .and_then(|s| s.parse().ok())
        .expect("decimal string")
}

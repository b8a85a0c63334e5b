//! Order-created notifications.
//!
//! Notifications are best-effort: the order service bounds each call with the
//! storage timeout and downgrades failures to warnings.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use thiserror::Error;
use url::Url;

use cartwheel_core::OrderCreated;

/// Errors that can occur when delivering a notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Receiver returned a non-success status.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// The notifier did not answer in time.
    #[error("notification timed out after {0:?}")]
    Timeout(Duration),
}

/// Receives order events.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn order_created(&self, event: &OrderCreated) -> Result<(), NotifyError>;
}

/// Emits a tracing event per order.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn order_created(&self, event: &OrderCreated) -> Result<(), NotifyError> {
        tracing::info!(
            order_number = %event.order_number,
            invoice_number = %event.invoice_number,
            customer_email = %event.customer.email,
            items = event.items.len(),
            total = %event.totals.total,
            "Order created"
        );
        Ok(())
    }
}

/// POSTs each [`OrderCreated`] as JSON to a webhook.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: Url,
}

impl WebhookNotifier {
    /// Create a notifier for `url`.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(url: Url, timeout: Duration) -> Result<Self, NotifyError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self { client, url })
    }

    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn order_created(&self, event: &OrderCreated) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(event)
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(NotifyError::Api {
                status: status.as_u16(),
                message,
            });
        }

        tracing::debug!(
            order_number = %event.order_number,
            status = status.as_u16(),
            "Delivered order webhook"
        );
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;
    use std::sync::{Arc, Mutex};

    use axum::{Json, Router, http::StatusCode, routing::post};
    use cartwheel_core::{Customer, Email, OrderTotals};
    use rust_decimal::Decimal;

    use super::*;

    fn event() -> OrderCreated {
        OrderCreated {
            order_number: "ORD-20250101-0001".into(),
            invoice_number: "INV-20250101-0001".into(),
            customer: Customer {
                name: "Ada Lovelace".into(),
                email: Email::parse("ada@example.com").unwrap(),
                phone: "+44 20 7946 0000".into(),
                address: "12 Analytical Row".into(),
                city: "London".into(),
                state: None,
                postal_code: "N1 9GU".into(),
                country: "GB".into(),
            },
            items: Vec::new(),
            totals: OrderTotals::compute(
                Decimal::from_str("10.00").unwrap(),
                Decimal::ZERO,
                Decimal::ZERO,
            )
            .unwrap(),
        }
    }

    async fn serve(router: Router) -> Url {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
        Url::parse(&format!("http://{addr}/hooks/orders")).unwrap()
    }

    #[tokio::test]
    async fn test_log_notifier_succeeds() {
        LogNotifier.order_created(&event()).await.unwrap();
    }

    #[tokio::test]
    async fn test_webhook_posts_event() {
        let received: Arc<Mutex<Option<serde_json::Value>>> = Arc::default();
        let sink = received.clone();
        let router = Router::new().route(
            "/hooks/orders",
            post(move |Json(body): Json<serde_json::Value>| {
                let sink = sink.clone();
                async move {
                    *sink.lock().unwrap() = Some(body);
                    StatusCode::NO_CONTENT
                }
            }),
        );
        let url = serve(router).await;

        let notifier = WebhookNotifier::new(url, Duration::from_secs(5)).unwrap();
        notifier.order_created(&event()).await.unwrap();

        let body = received.lock().unwrap().clone().unwrap();
        assert_eq!(body["orderNumber"], "ORD-20250101-0001");
        assert_eq!(body["customer"]["email"], "ada@example.com");
    }

    #[tokio::test]
    async fn test_webhook_non_success_is_api_error() {
        let router = Router::new().route(
            "/hooks/orders",
            post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "down for maintenance") }),
        );
        let url = serve(router).await;

        let notifier = WebhookNotifier::new(url, Duration::from_secs(5)).unwrap();
        let err = notifier.order_created(&event()).await.unwrap_err();
        assert!(matches!(
            err,
            NotifyError::Api { status: 503, ref message } if message == "down for maintenance"
        ));
    }
}

//! Cart API tests against in-memory storage.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use axum::http::{Method, StatusCode};
use rust_decimal::Decimal;
use serde_json::json;

use cartwheel_core::ProductRef;
use cartwheel_integration_tests::{TestApp, cart_item, decimal};
use cartwheel_storefront::services::{CatalogEntry, StaticCatalog};

// =============================================================================
// Authentication
// =============================================================================

#[tokio::test]
async fn test_cart_requires_identity() {
    let app = TestApp::new();

    let res = app.request(Method::GET, "/cart", None, None).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.error_code(), Some("unauthenticated"));
}

#[tokio::test]
async fn test_cart_rejects_forged_token() {
    let app = TestApp::new();
    let token = app.customer_token("device-1");
    let forged = token.replace("device-1", "device-2");

    let res = app.request(Method::GET, "/cart", Some(&forged), None).await;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_new_identity_sees_empty_cart() {
    let app = TestApp::new();
    let token = app.customer_token("device-1");

    let res = app.request(Method::GET, "/cart", Some(&token), None).await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["ownerId"], "device-1");
    assert_eq!(res.body["items"], json!([]));
    assert_eq!(res.body["itemCount"], 0);
}

// =============================================================================
// Mutations
// =============================================================================

#[tokio::test]
async fn test_add_same_product_increments_quantity() {
    let app = TestApp::new();
    let token = app.customer_token("device-1");

    app.request(Method::POST, "/cart", Some(&token), Some(cart_item("1001", "9.25", 2)))
        .await;
    let res = app
        .request(Method::POST, "/cart", Some(&token), Some(cart_item("1001", "9.25", 3)))
        .await;

    assert_eq!(res.status, StatusCode::OK);
    let items = res.body["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["quantity"], 5);
    assert_eq!(res.body["itemCount"], 5);
    assert_eq!(decimal(&res.body["subtotal"]), Decimal::new(4625, 2));
}

#[tokio::test]
async fn test_carts_are_isolated_per_identity() {
    let app = TestApp::new();
    let alice = app.customer_token("alice");
    let bob = app.customer_token("bob");

    app.request(Method::POST, "/cart", Some(&alice), Some(cart_item("1001", "5", 1)))
        .await;

    let res = app.request(Method::GET, "/cart", Some(&bob), None).await;
    assert_eq!(res.body["items"], json!([]));
}

#[tokio::test]
async fn test_concurrent_adds_are_not_lost() {
    let app = TestApp::new();
    let token = app.customer_token("device-1");

    let tasks: Vec<_> = (0..20)
        .map(|_| {
            let app = app.clone();
            let token = token.clone();
            tokio::spawn(async move {
                app.request(Method::POST, "/cart", Some(&token), Some(cart_item("1001", "1", 1)))
                    .await
            })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap().status, StatusCode::OK);
    }

    let res = app.request(Method::GET, "/cart", Some(&token), None).await;
    assert_eq!(res.body["items"][0]["quantity"], 20);
}

#[tokio::test]
async fn test_idempotency_key_replay_applies_once() {
    let app = TestApp::new();
    let token = app.customer_token("device-1");
    let headers = [("idempotency-key", "add-1001-once")];

    for _ in 0..3 {
        let res = app
            .request_with_headers(
                Method::POST,
                "/cart",
                Some(&token),
                Some(cart_item("1001", "2.50", 2)),
                &headers,
            )
            .await;
        assert_eq!(res.status, StatusCode::OK);
        assert_eq!(res.body["items"][0]["quantity"], 2);
    }
}

#[tokio::test]
async fn test_add_rejects_invalid_items() {
    let app = TestApp::new();
    let token = app.customer_token("device-1");

    let zero = app
        .request(Method::POST, "/cart", Some(&token), Some(cart_item("1001", "2", 0)))
        .await;
    assert_eq!(zero.status, StatusCode::BAD_REQUEST);
    assert_eq!(zero.error_code(), Some("validation_error"));

    let negative_price = app
        .request(Method::POST, "/cart", Some(&token), Some(cart_item("1001", "-1", 1)))
        .await;
    assert_eq!(negative_price.status, StatusCode::BAD_REQUEST);

    let missing = app
        .request(Method::POST, "/cart", Some(&token), Some(json!({"productRef": "1001"})))
        .await;
    assert_eq!(missing.status, StatusCode::BAD_REQUEST);

    let cart = app.request(Method::GET, "/cart", Some(&token), None).await;
    assert_eq!(cart.body["items"], json!([]));
}

#[tokio::test]
async fn test_unrepresentable_price_is_rejected_and_cart_stays_readable() {
    let app = TestApp::new();
    let token = app.customer_token("device-1");

    let res = app
        .request(
            Method::POST,
            "/cart",
            Some(&token),
            Some(cart_item("1001", "79228162514264337593543950335", 2)),
        )
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.error_code(), Some("validation_error"));

    let cart = app.request(Method::GET, "/cart", Some(&token), None).await;
    assert_eq!(cart.status, StatusCode::OK);
    assert_eq!(cart.body["items"], json!([]));
}

#[tokio::test]
async fn test_largest_accepted_lines_still_total() {
    let app = TestApp::new();
    let token = app.customer_token("device-1");

    let res = app
        .request(
            Method::PUT,
            "/cart",
            Some(&token),
            Some(json!({
                "action": "replaceAll",
                "items": [cart_item("1001", "1000000000", 999), cart_item("1002", "1000000000", 999)]
            })),
        )
        .await;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(decimal(&res.body["subtotal"]), Decimal::new(1_998_000_000_000, 0));

    let cart = app.request(Method::GET, "/cart", Some(&token), None).await;
    assert_eq!(cart.status, StatusCode::OK);
}

#[tokio::test]
async fn test_malformed_json_is_a_validation_error() {
    let app = TestApp::new();
    let token = app.customer_token("device-1");

    let res = app
        .request(Method::PUT, "/cart", Some(&token), Some(json!({"action": "explode"})))
        .await;
    assert_eq!(res.status, StatusCode::BAD_REQUEST);
    assert_eq!(res.error_code(), Some("validation_error"));
}

#[tokio::test]
async fn test_put_actions() {
    let app = TestApp::new();
    let token = app.customer_token("device-1");

    let replaced = app
        .request(
            Method::PUT,
            "/cart",
            Some(&token),
            Some(json!({
                "action": "replaceAll",
                "items": [cart_item("1001", "3", 1), cart_item("1002", "4", 2), cart_item("1001", "3", 2)]
            })),
        )
        .await;
    assert_eq!(replaced.status, StatusCode::OK);
    let items = replaced.body["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["productRef"], "1001");
    assert_eq!(items[0]["quantity"], 3);

    let updated = app
        .request(
            Method::PUT,
            "/cart",
            Some(&token),
            Some(json!({"action": "updateQuantity", "productRef": "1002", "quantity": 7})),
        )
        .await;
    assert_eq!(updated.body["items"][1]["quantity"], 7);

    let zeroed = app
        .request(
            Method::PUT,
            "/cart",
            Some(&token),
            Some(json!({"action": "updateQuantity", "productRef": "1002", "quantity": 0})),
        )
        .await;
    assert_eq!(zeroed.body["items"].as_array().unwrap().len(), 1);

    let removed = app
        .request(
            Method::PUT,
            "/cart",
            Some(&token),
            Some(json!({"action": "removeItem", "productRef": "1001"})),
        )
        .await;
    assert_eq!(removed.body["items"], json!([]));
}

#[tokio::test]
async fn test_delete_clears_cart() {
    let app = TestApp::new();
    let token = app.customer_token("device-1");

    app.request(Method::POST, "/cart", Some(&token), Some(cart_item("1001", "1", 4)))
        .await;
    let res = app.request(Method::DELETE, "/cart", Some(&token), None).await;

    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["items"], json!([]));
    assert_eq!(decimal(&res.body["subtotal"]), Decimal::ZERO);
}

#[tokio::test]
async fn test_catalog_fills_missing_display_fields() {
    let catalog = StaticCatalog::default().with_entry(
        ProductRef::parse("1001").unwrap(),
        CatalogEntry {
            name: "House Blend".to_owned(),
            unit_price: Decimal::new(1250, 2),
            image_ref: "/img/house-blend.jpg".to_owned(),
        },
    );
    let app = TestApp::builder().catalog(Arc::new(catalog)).build();
    let token = app.customer_token("device-1");

    let res = app
        .request(
            Method::POST,
            "/cart",
            Some(&token),
            Some(json!({"productRef": "1001", "quantity": 2})),
        )
        .await;

    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["items"][0]["name"], "House Blend");
    assert_eq!(decimal(&res.body["subtotal"]), Decimal::new(25, 0));
}

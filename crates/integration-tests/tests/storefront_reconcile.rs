//! Sign-in reconciliation between a file-backed client cache and the server
//! cart, observed through the HTTP API.

#![allow(clippy::unwrap_used)]

use axum::http::{Method, StatusCode};
use rust_decimal::Decimal;

use cartwheel_core::{CartItem, ClientId, Price, ProductRef};
use cartwheel_integration_tests::{TestApp, cart_item};
use cartwheel_storefront::services::{
    CartCache, FileCartCache, Reconciliation, reconcile_on_sign_in,
};

fn line(product_ref: &str, quantity: u32) -> CartItem {
    CartItem {
        product_ref: ProductRef::parse(product_ref).unwrap(),
        name: format!("Product {product_ref}"),
        unit_price: Price::new(Decimal::new(300, 2), "unitPrice").unwrap(),
        image_ref: format!("/img/{product_ref}.jpg"),
        quantity,
    }
}

#[tokio::test]
async fn test_local_cache_is_pushed_and_visible_over_http() {
    let app = TestApp::new();
    let dir = tempfile::tempdir().unwrap();
    let client = ClientId::parse("device-7").unwrap();
    let cache = FileCartCache::for_client(dir.path(), &client);
    cache
        .store(&[line("1001", 1), line("1002", 2), line("1001", 2)])
        .await
        .unwrap();

    let outcome = reconcile_on_sign_in(&cache, app.state.carts(), &client)
        .await
        .unwrap();
    assert!(matches!(outcome, Reconciliation::Pushed { .. }));

    let token = app.customer_token("device-7");
    let res = app.request(Method::GET, "/cart", Some(&token), None).await;
    assert_eq!(res.status, StatusCode::OK);
    let items = res.body["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["quantity"], 3);

    assert_eq!(cache.load().await.unwrap(), outcome.cart().items);
}

#[tokio::test]
async fn test_empty_cache_pulls_server_cart() {
    let app = TestApp::new();
    let token = app.customer_token("device-7");
    app.request(Method::POST, "/cart", Some(&token), Some(cart_item("2001", "4", 3)))
        .await;

    let dir = tempfile::tempdir().unwrap();
    let client = ClientId::parse("device-7").unwrap();
    let cache = FileCartCache::for_client(dir.path(), &client);

    let outcome = reconcile_on_sign_in(&cache, app.state.carts(), &client)
        .await
        .unwrap();

    assert!(matches!(outcome, Reconciliation::Pulled { .. }));
    let cached = cache.load().await.unwrap();
    assert_eq!(cached.len(), 1);
    assert_eq!(cached[0].quantity, 3);
}

#[tokio::test]
async fn test_push_replaces_server_lines() {
    let app = TestApp::new();
    let token = app.customer_token("device-7");
    app.request(Method::POST, "/cart", Some(&token), Some(cart_item("9999", "1", 1)))
        .await;

    let dir = tempfile::tempdir().unwrap();
    let client = ClientId::parse("device-7").unwrap();
    let cache = FileCartCache::for_client(dir.path(), &client);
    cache.store(&[line("1001", 1)]).await.unwrap();

    reconcile_on_sign_in(&cache, app.state.carts(), &client)
        .await
        .unwrap();

    let res = app.request(Method::GET, "/cart", Some(&token), None).await;
    let items = res.body["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["productRef"], "1001");
}

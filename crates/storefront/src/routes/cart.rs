//! Cart route handlers.
//!
//! Every cart route requires a bearer identity; the cart is the identity's
//! server-side cart.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::HeaderMap,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::instrument;

use cartwheel_core::{
    Cart, CartAction, CartActionRequest, CartItem, CartItemDraft, ClientId, IdempotencyKey, Price,
    ValidationError,
};

use crate::error::{Result, add_breadcrumb};
use crate::middleware::RequireIdentity;
use crate::state::AppState;

/// Header carrying the client's idempotency key on `POST /cart`.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Cart as returned by every cart route.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub owner_id: ClientId,
    pub items: Vec<CartItem>,
    pub item_count: u64,
    pub subtotal: Price,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<Cart> for CartView {
    type Error = ValidationError;

    fn try_from(cart: Cart) -> std::result::Result<Self, Self::Error> {
        Ok(Self {
            item_count: cart.item_count(),
            subtotal: cart.subtotal()?,
            owner_id: cart.owner_id,
            items: cart.items,
            updated_at: cart.updated_at,
        })
    }
}

fn idempotency_key(headers: &HeaderMap) -> Result<Option<IdempotencyKey>> {
    headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .map(|value| {
            let raw = value.to_str().unwrap_or_default();
            IdempotencyKey::parse(raw).map_err(Into::into)
        })
        .transpose()
}

/// `GET /cart`
#[instrument(skip(state, principal), fields(client_id = %principal.client_id))]
pub async fn show(
    State(state): State<AppState>,
    RequireIdentity(principal): RequireIdentity,
) -> Result<Json<CartView>> {
    let cart = state.carts().get(&principal.client_id).await?;
    Ok(Json(CartView::try_from(cart)?))
}

/// `POST /cart` - add an item.
#[instrument(skip(state, principal, headers, payload), fields(client_id = %principal.client_id))]
pub async fn add(
    State(state): State<AppState>,
    RequireIdentity(principal): RequireIdentity,
    headers: HeaderMap,
    payload: std::result::Result<Json<CartItemDraft>, JsonRejection>,
) -> Result<Json<CartView>> {
    let Json(draft) = payload?;
    let key = idempotency_key(&headers)?;

    if let Some(product_ref) = &draft.product_ref {
        add_breadcrumb("cart", "Add item", Some(&[("product_ref", product_ref.as_str())]));
    }

    let cart = state
        .carts()
        .add_item(&principal.client_id, draft, key.as_ref())
        .await?;
    Ok(Json(CartView::try_from(cart)?))
}

/// `PUT /cart` - apply a tagged action.
#[instrument(skip(state, principal, payload), fields(client_id = %principal.client_id))]
pub async fn update(
    State(state): State<AppState>,
    RequireIdentity(principal): RequireIdentity,
    payload: std::result::Result<Json<CartActionRequest>, JsonRejection>,
) -> Result<Json<CartView>> {
    let Json(request) = payload?;
    let action = CartAction::try_from(request)?;

    let cart = state
        .carts()
        .apply(&principal.client_id, action, None)
        .await?;
    Ok(Json(CartView::try_from(cart)?))
}

/// `DELETE /cart` - empty the cart.
#[instrument(skip(state, principal), fields(client_id = %principal.client_id))]
pub async fn clear(
    State(state): State<AppState>,
    RequireIdentity(principal): RequireIdentity,
) -> Result<Json<CartView>> {
    let cart = state.carts().clear(&principal.client_id).await?;
    Ok(Json(CartView::try_from(cart)?))
}

//! Order route handlers.
//!
//! `POST /orders` is public; listing, lookup, and updates are admin-only.

use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
};
use tracing::instrument;

use cartwheel_core::{Order, OrderRequest};

use crate::error::{Result, add_breadcrumb};
use crate::middleware::{OptionalIdentity, RequireAdmin};
use crate::services::{CreatedOrder, ListParams, OrderList, OrderUpdate};
use crate::state::AppState;

/// `POST /orders` - place an order.
///
/// When the request carries a valid identity, that identity's server cart is
/// cleared once the order is persisted. A failure to clear is logged only.
#[instrument(skip(state, principal, payload))]
pub async fn create(
    State(state): State<AppState>,
    OptionalIdentity(principal): OptionalIdentity,
    payload: std::result::Result<Json<OrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreatedOrder>)> {
    let Json(request) = payload?;
    let created = state.orders().create_order(request).await?;

    add_breadcrumb(
        "orders",
        "Order created",
        Some(&[("order_number", created.order.order_number.as_str())]),
    );

    if let Some(principal) = principal
        && let Err(e) = state.carts().clear(&principal.client_id).await
    {
        tracing::warn!(
            client_id = %principal.client_id,
            order_number = %created.order.order_number,
            error = %e,
            "Failed to clear cart after checkout"
        );
    }

    Ok((StatusCode::CREATED, Json(created)))
}

/// `GET /orders` - admin listing.
#[instrument(skip(state, _admin, params))]
pub async fn list(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    params: std::result::Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<OrderList>> {
    let Query(params) = params?;
    Ok(Json(state.orders().list(params).await?))
}

/// `GET /orders/{number}` - by order number or invoice number.
#[instrument(skip(state, _admin))]
pub async fn show(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(number): Path<String>,
) -> Result<Json<Order>> {
    Ok(Json(state.orders().get(&number).await?))
}

/// `PATCH /orders/{number}` - change status and/or notes.
#[instrument(skip(state, admin, payload), fields(admin = %admin.client_id))]
pub async fn update(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(number): Path<String>,
    payload: std::result::Result<Json<OrderUpdate>, JsonRejection>,
) -> Result<Json<Order>> {
    let Json(update) = payload?;
    Ok(Json(state.orders().update(&number, update).await?))
}

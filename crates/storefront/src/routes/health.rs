//! Liveness and readiness probes.

use axum::{Json, extract::State, http::StatusCode};
use serde_json::{Value, json};

use crate::state::AppState;

/// `GET /health` - the process is up.
pub async fn live() -> &'static str {
    "ok"
}

/// `GET /health/ready` - storage answers within the storage timeout.
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let storage = state.storage();
    let timeout = state.config().storage_timeout;

    match tokio::time::timeout(timeout, storage.ping()).await {
        Ok(Ok(())) => (
            StatusCode::OK,
            Json(json!({"status": "ready", "storage": storage.backend()})),
        ),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"status": "unavailable", "storage": storage.backend()})),
            )
        }
        Err(_) => {
            tracing::warn!(timeout = ?timeout, "Readiness check timed out");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"status": "unavailable", "storage": storage.backend()})),
            )
        }
    }
}

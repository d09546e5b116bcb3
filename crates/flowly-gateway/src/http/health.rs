use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// GET /health: liveness probe with hub counters.
pub async fn health_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, StatusCode> {
    let stats = state
        .hub
        .stats()
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;

    Ok(Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "viewers": stats.viewers,
        "registered": stats.registered,
        "evicted": stats.evicted,
        "broadcasts": stats.broadcasts,
    })))
}

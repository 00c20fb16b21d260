use axum::{extract::State, routing::post, Json, Router};
use serde_json::{json, Value};
use tracing::info;

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/database/reset-slots", post(reset_slots))
        .route("/api/sync", post(sync_now))
        .route("/api/sync-from-blynk", post(sync_now))
}

async fn reset_slots(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    state.service.reset_all().await?;
    Ok(Json(json!({ "success": true, "message": "All slots reset" })))
}

/// Run one reconciliation pass now instead of waiting for the next tick.
async fn sync_now(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let poller = state
        .poller
        .as_ref()
        .ok_or_else(|| AppError::UnavailableError("sensor feed is not configured".to_string()))?;

    let arrivals = poller.tick().await?;
    info!(arrivals, "Manual sync completed");

    Ok(Json(json!({
        "success": true,
        "message": "Sync completed",
        "arrivals": arrivals,
    })))
}

use axum::{
    extract::{Path, Query, State},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/history", get(list_history))
        .route("/api/history/pending", get(list_pending))
        .route("/api/history/revenue", get(revenue_stats))
        .route("/api/history/mark-paid/{session_id}", post(mark_paid))
        .route("/api/history/{session_id}/send-receipt", post(send_receipt))
        .route("/api/history/clear", delete(clear_history))
}

async fn list_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Value>, AppError> {
    let history = state.service.history(query.limit).await?;
    Ok(Json(json!({ "success": true, "history": history })))
}

async fn list_pending(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let pending = state.service.pending_sessions().await?;
    Ok(Json(json!({ "success": true, "pending": pending })))
}

async fn revenue_stats(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let stats = state.service.revenue().await?;
    Ok(Json(json!({ "success": true, "stats": stats })))
}

async fn mark_paid(
    State(state): State<AppState>,
    Path(session_id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    state.service.mark_paid(session_id).await?;
    Ok(Json(json!({ "success": true, "message": "Payment marked as paid" })))
}

async fn send_receipt(
    State(state): State<AppState>,
    Path(session_id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    let session = state.service.send_receipt(session_id).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Receipt sent",
        "billing": session,
    })))
}

async fn clear_history(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let cleared = state.service.clear_sessions().await?;
    Ok(Json(json!({
        "success": true,
        "message": "History cleared successfully",
        "cleared": cleared,
    })))
}

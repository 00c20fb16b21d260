use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use parkline_core::{Occupant, Session, Slot};
use parkline_engine::ReserveRequest;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ReserveBody {
    pub slot_id: i64,
    pub user_email: String,
    pub user_phone: String,
    pub vehicle_number: String,
    /// Unix seconds; the reservation lapses if nobody has arrived by then.
    pub arrival_time: Option<i64>,
    #[serde(default)]
    pub duration_hours: f64,
}

#[derive(Debug, Deserialize)]
pub struct CancelBody {
    pub slot_id: i64,
    #[serde(alias = "email")]
    pub email_id: String,
}

#[derive(Debug, Deserialize)]
pub struct PayBillBody {
    pub user_email: String,
    pub user_phone: String,
    pub vehicle_number: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/slots", get(list_slots))
        .route("/api/slots/{slot_id}", get(get_slot))
        .route("/api/slots/reserve", post(reserve_slot))
        .route("/api/slots/cancel", post(cancel_reservation))
        .route("/api/slots/occupy/{slot_id}", post(occupy_slot))
        .route("/api/slots/vacate/{slot_id}", post(vacate_slot))
        .route("/api/slots/pay-bill/{slot_id}", post(pay_bill))
}

fn occupant(vehicle_number: String, user_email: String, user_phone: String) -> Result<Occupant, AppError> {
    let occupant = Occupant {
        vehicle_number: vehicle_number.trim().to_string(),
        user_email: user_email.trim().to_string(),
        user_phone: user_phone.trim().to_string(),
    };

    if occupant.vehicle_number.is_empty() {
        return Err(AppError::ValidationError("vehicle_number is required".to_string()));
    }
    if !occupant.user_email.contains('@') {
        return Err(AppError::ValidationError("user_email is not a valid address".to_string()));
    }
    if occupant.user_phone.is_empty() {
        return Err(AppError::ValidationError("user_phone is required".to_string()));
    }
    Ok(occupant)
}

async fn list_slots(State(state): State<AppState>) -> Result<Json<Vec<Slot>>, AppError> {
    Ok(Json(state.service.list_slots().await?))
}

async fn get_slot(
    State(state): State<AppState>,
    Path(slot_id): Path<i64>,
) -> Result<Json<Slot>, AppError> {
    Ok(Json(state.service.get_slot(slot_id).await?))
}

async fn reserve_slot(
    State(state): State<AppState>,
    Json(body): Json<ReserveBody>,
) -> Result<Json<Value>, AppError> {
    let arrival_deadline = match body.arrival_time {
        Some(secs) => Some(
            DateTime::<Utc>::from_timestamp(secs, 0)
                .ok_or_else(|| AppError::ValidationError("arrival_time is out of range".to_string()))?,
        ),
        None => None,
    };

    let slot = state
        .service
        .reserve(ReserveRequest {
            slot_id: body.slot_id,
            occupant: occupant(body.vehicle_number, body.user_email, body.user_phone)?,
            arrival_deadline,
            duration_hours: body.duration_hours,
        })
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Slot reserved successfully",
        "slot": slot,
    })))
}

async fn cancel_reservation(
    State(state): State<AppState>,
    Json(body): Json<CancelBody>,
) -> Result<Json<Value>, AppError> {
    let outcome = state.service.cancel(body.slot_id, &body.email_id).await?;

    let message = if outcome.fee.is_some() {
        "Reservation cancelled and bill generated"
    } else {
        "Reservation cancelled successfully"
    };

    Ok(Json(json!({
        "success": true,
        "message": message,
        "slot_id": outcome.slot_id,
        "billing": outcome.fee,
    })))
}

async fn occupy_slot(
    State(state): State<AppState>,
    Path(slot_id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    let slot = state.service.occupy(slot_id).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Slot marked as occupied",
        "slot": slot,
    })))
}

async fn vacate_slot(
    State(state): State<AppState>,
    Path(slot_id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    let session = state.service.vacate(slot_id).await?;
    Ok(Json(billed("Slot vacated successfully", &session)))
}

async fn pay_bill(
    State(state): State<AppState>,
    Path(slot_id): Path<i64>,
    Json(body): Json<PayBillBody>,
) -> Result<Json<Value>, AppError> {
    let payer = occupant(body.vehicle_number, body.user_email, body.user_phone)?;
    let session = state.service.pay_and_vacate(slot_id, payer).await?;
    Ok(Json(billed("Payment successful", &session)))
}

fn billed(message: &str, session: &Session) -> Value {
    json!({
        "success": true,
        "message": message,
        "billing": session,
    })
}

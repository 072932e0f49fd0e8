use std::sync::Arc;

use axum::{
    extract::{Path, Query, State, Extension},
    Json,
};
use axum_extra::TypedHeader;
use chrono::Local;
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};

use notification_cell::Mailer;
use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::extractor::require_doctor;
use shared_utils::validation::{parse_date, parse_time, parse_uuid};

use crate::models::{AvailableSlotsQuery, CreateSlotsRequest, DoctorSlotsQuery, SlotError, SlotWindow};
use crate::services::slot::SlotService;

impl From<SlotError> for AppError {
    fn from(err: SlotError) -> Self {
        match err {
            SlotError::NotFound => AppError::NotFound(err.to_string()),
            SlotError::NotOwner => AppError::Forbidden(err.to_string()),
            SlotError::ValidationError(msg) => AppError::ValidationError(msg),
            SlotError::Busy => AppError::Conflict(err.to_string()),
            SlotError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}

#[axum::debug_handler]
pub async fn create_slots(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Extension(mailer): Extension<Arc<dyn Mailer>>,
    Json(request): Json<CreateSlotsRequest>,
) -> Result<Json<Value>, AppError> {
    require_doctor(&user)?;

    let window = SlotWindow {
        date: parse_date("date", &request.date)?,
        start_time: parse_time("start_time", &request.start_time)?,
        end_time: parse_time("end_time", &request.end_time)?,
    };

    let service = SlotService::with_mailer(&state, mailer);
    let result = service.create_slots(&user.id, window, auth.token()).await?;

    let message = if result.created.is_empty() {
        "All requested slots already exist".to_string()
    } else {
        format!("{} slot(s) added", result.created.len())
    };

    Ok(Json(json!({
        "success": true,
        "created_count": result.created.len(),
        "created": result.created,
        "skipped": result.skipped,
        "message": message
    })))
}

#[axum::debug_handler]
pub async fn list_my_slots(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Extension(mailer): Extension<Arc<dyn Mailer>>,
    Query(query): Query<DoctorSlotsQuery>,
) -> Result<Json<Value>, AppError> {
    require_doctor(&user)?;

    let from = match query.from.as_deref() {
        Some(raw) => parse_date("from", raw)?,
        None => Local::now().date_naive(),
    };

    let service = SlotService::with_mailer(&state, mailer);
    let slots = service.list_doctor_slots(&user.id, from, auth.token()).await?;

    Ok(Json(json!({
        "slots": slots,
        "total": slots.len()
    })))
}

#[axum::debug_handler]
pub async fn list_available_slots(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<String>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(mailer): Extension<Arc<dyn Mailer>>,
    Query(query): Query<AvailableSlotsQuery>,
) -> Result<Json<Value>, AppError> {
    let doctor_id = parse_uuid("doctor_id", &doctor_id)?;
    let date = parse_date("date", &query.date)?;

    let service = SlotService::with_mailer(&state, mailer);
    let slots = service.list_available_slots(&doctor_id.to_string(), date, auth.token()).await?;

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "date": date,
        "slots": slots,
        "total": slots.len()
    })))
}

#[axum::debug_handler]
pub async fn delete_slot(
    State(state): State<Arc<AppConfig>>,
    Path(slot_id): Path<String>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Extension(mailer): Extension<Arc<dyn Mailer>>,
) -> Result<Json<Value>, AppError> {
    require_doctor(&user)?;
    let slot_id = parse_uuid("slot_id", &slot_id)?;

    let service = SlotService::with_mailer(&state, mailer);
    let result = service.delete_slot(&user.id, &slot_id.to_string(), auth.token()).await?;

    let message = match result.canceled_appointment_id {
        Some(_) => "Slot deleted and the booked appointment was canceled",
        None => "Slot deleted",
    };

    Ok(Json(json!({
        "success": true,
        "slot_id": result.slot_id,
        "canceled_appointment_id": result.canceled_appointment_id,
        "notification_sent": result.notification_sent,
        "message": message
    })))
}

// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State, Extension},
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};

use notification_cell::Mailer;
use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::extractor::{require_doctor, require_patient};
use shared_utils::validation::{optional_text, parse_uuid};

use crate::models::{
    AppointmentError, AppointmentListQuery, BookAppointmentRequest, CancelAppointmentRequest,
};
use crate::services::booking::AppointmentBookingService;

const MAX_REASON_LEN: usize = 500;

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::NotFound | AppointmentError::SlotNotFound => AppError::NotFound(err.to_string()),
            AppointmentError::SlotInPast => AppError::ValidationError(err.to_string()),
            AppointmentError::SlotTaken
            | AppointmentError::DuplicateBooking
            | AppointmentError::Busy => AppError::Conflict(err.to_string()),
            AppointmentError::NotParticipant => AppError::Forbidden(err.to_string()),
            AppointmentError::InvalidStatusTransition { .. } => AppError::BadRequest(err.to_string()),
            AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
            AppointmentError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Extension(mailer): Extension<Arc<dyn Mailer>>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    require_patient(&user)?;

    let slot_id = parse_uuid("slot_id", &request.slot_id)?;
    let reason = optional_text("reason", request.reason.as_deref(), MAX_REASON_LEN)?;

    let booking_service = AppointmentBookingService::with_mailer(&state, mailer);
    let appointment = booking_service
        .book_appointment(&user.id, &slot_id.to_string(), reason, auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment booked successfully"
    })))
}

#[axum::debug_handler]
pub async fn list_my_appointments(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Extension(mailer): Extension<Arc<dyn Mailer>>,
    Query(query): Query<AppointmentListQuery>,
) -> Result<Json<Value>, AppError> {
    if !user.is_doctor() && !user.is_patient() {
        return Err(AppError::Forbidden("Only doctors and patients have appointments".to_string()));
    }

    let scope = query.scope.unwrap_or_default();
    let booking_service = AppointmentBookingService::with_mailer(&state, mailer);
    let appointments = booking_service.list_appointments(&user, scope, auth.token()).await?;

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len()
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<String>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Extension(mailer): Extension<Arc<dyn Mailer>>,
) -> Result<Json<Value>, AppError> {
    let appointment_id = parse_uuid("appointment_id", &appointment_id)?;

    let booking_service = AppointmentBookingService::with_mailer(&state, mailer);
    let appointment = booking_service
        .get_for_participant(&appointment_id.to_string(), &user.id, auth.token())
        .await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<String>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Extension(mailer): Extension<Arc<dyn Mailer>>,
    request: Option<Json<CancelAppointmentRequest>>,
) -> Result<Json<Value>, AppError> {
    let appointment_id = parse_uuid("appointment_id", &appointment_id)?;
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let reason = optional_text("reason", request.reason.as_deref(), MAX_REASON_LEN)?;

    let booking_service = AppointmentBookingService::with_mailer(&state, mailer);
    let result = booking_service
        .cancel_appointment(&user, &appointment_id.to_string(), reason, auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": result.appointment,
        "notification_sent": result.notification_sent,
        "message": "Appointment canceled"
    })))
}

#[axum::debug_handler]
pub async fn complete_appointment(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<String>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Extension(mailer): Extension<Arc<dyn Mailer>>,
) -> Result<Json<Value>, AppError> {
    require_doctor(&user)?;
    let appointment_id = parse_uuid("appointment_id", &appointment_id)?;

    let booking_service = AppointmentBookingService::with_mailer(&state, mailer);
    let appointment = booking_service
        .complete_appointment(&user, &appointment_id.to_string(), auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment marked as completed"
    })))
}

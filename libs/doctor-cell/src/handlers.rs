use std::sync::Arc;

use axum::{
    extract::{Path, Query, State, Extension},
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_models::profile::UpdateProfileRequest;
use shared_utils::extractor::{require_doctor, require_patient};
use shared_utils::validation::{optional_text, parse_uuid, profile_changes};

use crate::models::{DoctorError, DoctorSearchQuery, RateDoctorRequest};
use crate::services::doctor::DoctorService;

impl From<DoctorError> for AppError {
    fn from(err: DoctorError) -> Self {
        match err {
            DoctorError::NotFound | DoctorError::AppointmentNotFound => AppError::NotFound(err.to_string()),
            DoctorError::NotYourAppointment => AppError::Forbidden(err.to_string()),
            DoctorError::AppointmentNotCompleted => AppError::BadRequest(err.to_string()),
            DoctorError::AlreadyRated => AppError::Conflict(err.to_string()),
            DoctorError::ValidationError(msg) => AppError::ValidationError(msg),
            DoctorError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}

// ==============================================================================
// PUBLIC
// ==============================================================================

#[axum::debug_handler]
pub async fn list_doctors(
    State(state): State<Arc<AppConfig>>,
    Query(query): Query<DoctorSearchQuery>,
) -> Result<Json<Value>, AppError> {
    let doctor_service = DoctorService::new(&state);
    let doctors = doctor_service.list_doctors(&query).await?;

    Ok(Json(json!({
        "doctors": doctors,
        "total": doctors.len()
    })))
}

#[axum::debug_handler]
pub async fn get_doctor(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let doctor_id = parse_uuid("doctor_id", &doctor_id)?;

    let doctor_service = DoctorService::new(&state);
    let doctor = doctor_service.get_doctor(&doctor_id.to_string()).await?;

    Ok(Json(json!(doctor)))
}

#[axum::debug_handler]
pub async fn list_ratings(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let doctor_id = parse_uuid("doctor_id", &doctor_id)?;

    let doctor_service = DoctorService::new(&state);
    let ratings = doctor_service.list_ratings(&doctor_id.to_string()).await?;

    Ok(Json(json!({
        "ratings": ratings,
        "total": ratings.len()
    })))
}

// ==============================================================================
// PROTECTED
// ==============================================================================

#[axum::debug_handler]
pub async fn update_my_profile(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<Json<Value>, AppError> {
    require_doctor(&user)?;
    let changes = profile_changes(&request, true)?;

    let doctor_service = DoctorService::new(&state);
    let profile = doctor_service.update_profile(&user.id, changes, auth.token()).await?;

    Ok(Json(json!({
        "success": true,
        "profile": profile,
        "message": "Profile updated"
    })))
}

#[axum::debug_handler]
pub async fn rate_doctor(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<String>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<RateDoctorRequest>,
) -> Result<Json<Value>, AppError> {
    require_patient(&user)?;
    let doctor_id = parse_uuid("doctor_id", &doctor_id)?;
    let appointment_id = parse_uuid("appointment_id", &request.appointment_id)?;
    if !(1..=5).contains(&request.rating) {
        return Err(AppError::ValidationError("rating must be between 1 and 5".to_string()));
    }
    let comment = optional_text("comment", request.comment.as_deref(), 1000)?;

    let doctor_service = DoctorService::new(&state);
    let rating = doctor_service
        .rate_doctor(
            &user.id,
            &doctor_id.to_string(),
            &appointment_id.to_string(),
            request.rating as i32,
            comment,
            auth.token(),
        )
        .await?;

    Ok(Json(json!({
        "success": true,
        "rating": rating,
        "message": "Thank you for your feedback"
    })))
}

#[axum::debug_handler]
pub async fn my_dashboard(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_doctor(&user)?;

    let doctor_service = DoctorService::new(&state);
    let dashboard = doctor_service.dashboard(&user.id, auth.token()).await?;

    Ok(Json(json!(dashboard)))
}

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State, Extension},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use serde_json::{json, Value};

use notification_cell::Mailer;
use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::extractor::require_doctor;
use shared_utils::validation::{optional_text, parse_date, parse_uuid, require_non_empty};

use crate::models::{
    MedicineQuery, PrescriptionDraft, PrescriptionInput, ReportDraft, ReportError, SaveReportRequest,
};
use crate::services::report::ReportService;

const MAX_DIAGNOSIS_CHARS: usize = 2000;
const MAX_NOTES_CHARS: usize = 5000;
const MAX_DOSAGE_CHARS: usize = 100;
const MAX_INSTRUCTIONS_CHARS: usize = 500;
const MAX_DURATION_DAYS: i64 = 365;

impl From<ReportError> for AppError {
    fn from(err: ReportError) -> Self {
        match err {
            ReportError::NotFound | ReportError::AppointmentNotFound => AppError::NotFound(err.to_string()),
            ReportError::NotYourAppointment | ReportError::NotParticipant => AppError::Forbidden(err.to_string()),
            ReportError::AppointmentCanceled => AppError::BadRequest(err.to_string()),
            ReportError::UnknownMedicine(_) => AppError::ValidationError(err.to_string()),
            ReportError::ValidationError(msg) => AppError::ValidationError(msg),
            ReportError::PdfError(msg) => AppError::Internal(msg),
            ReportError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}

fn build_prescription(index: usize, input: &PrescriptionInput) -> Result<PrescriptionDraft, AppError> {
    let field = |name: &str| format!("medicines[{}].{}", index, name);

    if !(1..=MAX_DURATION_DAYS).contains(&input.duration_days) {
        return Err(AppError::ValidationError(format!(
            "{} must be between 1 and {}", field("duration_days"), MAX_DURATION_DAYS
        )));
    }

    Ok(PrescriptionDraft {
        medicine_id: parse_uuid(&field("medicine_id"), &input.medicine_id)?,
        dosage: require_non_empty(&field("dosage"), &input.dosage, MAX_DOSAGE_CHARS)?,
        frequency: require_non_empty(&field("frequency"), &input.frequency, MAX_DOSAGE_CHARS)?,
        duration_days: input.duration_days as i32,
        instructions: optional_text(&field("instructions"), input.instructions.as_deref(), MAX_INSTRUCTIONS_CHARS)?,
    })
}

/// Validate a report submission into a draft the service can save.
pub fn build_draft(request: SaveReportRequest) -> Result<ReportDraft, AppError> {
    let appointment_id = parse_uuid("appointment_id", &request.appointment_id)?;
    let diagnosis = require_non_empty("diagnosis", &request.diagnosis, MAX_DIAGNOSIS_CHARS)?;
    let symptoms = optional_text("symptoms", request.symptoms.as_deref(), MAX_NOTES_CHARS)?;
    let notes = optional_text("notes", request.notes.as_deref(), MAX_NOTES_CHARS)?;

    let follow_up_date = match request.follow_up_date.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(value) => Some(parse_date("follow_up_date", value)?),
    };

    let medicines = request
        .medicines
        .iter()
        .enumerate()
        .map(|(index, input)| build_prescription(index, input))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ReportDraft {
        appointment_id,
        diagnosis,
        symptoms,
        notes,
        follow_up_date,
        medicines,
        send_email: request.send_email,
    })
}

#[axum::debug_handler]
pub async fn list_medicines(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Extension(mailer): Extension<Arc<dyn Mailer>>,
    Query(query): Query<MedicineQuery>,
) -> Result<Json<Value>, AppError> {
    require_doctor(&user)?;

    let report_service = ReportService::with_mailer(&state, mailer);
    let medicines = report_service
        .list_medicines(&user.id, query.search.as_deref(), auth.token())
        .await?;

    Ok(Json(json!({
        "medicines": medicines,
        "total": medicines.len()
    })))
}

#[axum::debug_handler]
pub async fn get_report_for_edit(
    State(state): State<Arc<AppConfig>>,
    Path(appointment_id): Path<String>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Extension(mailer): Extension<Arc<dyn Mailer>>,
) -> Result<Json<Value>, AppError> {
    require_doctor(&user)?;
    let appointment_id = parse_uuid("appointment_id", &appointment_id)?;

    let report_service = ReportService::with_mailer(&state, mailer);
    let view = report_service
        .get_report_for_edit(&user.id, &appointment_id.to_string(), auth.token())
        .await?;

    Ok(Json(json!(view)))
}

#[axum::debug_handler]
pub async fn save_report(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Extension(mailer): Extension<Arc<dyn Mailer>>,
    Json(request): Json<SaveReportRequest>,
) -> Result<Json<Value>, AppError> {
    require_doctor(&user)?;
    let draft = build_draft(request)?;

    let report_service = ReportService::with_mailer(&state, mailer);
    let outcome = report_service.save_report(&user.id, draft, auth.token()).await?;

    let message = if outcome.created { "Report created" } else { "Report updated" };
    Ok(Json(json!({
        "success": true,
        "report": outcome.report,
        "created": outcome.created,
        "pdf_generated": outcome.pdf_generated,
        "email_sent": outcome.email_sent,
        "message": message
    })))
}

#[axum::debug_handler]
pub async fn list_my_reports(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Extension(mailer): Extension<Arc<dyn Mailer>>,
) -> Result<Json<Value>, AppError> {
    let report_service = ReportService::with_mailer(&state, mailer);
    let reports = report_service.list_reports(&user, auth.token()).await?;

    Ok(Json(json!({
        "reports": reports,
        "total": reports.len()
    })))
}

#[axum::debug_handler]
pub async fn get_report(
    State(state): State<Arc<AppConfig>>,
    Path(report_id): Path<String>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Extension(mailer): Extension<Arc<dyn Mailer>>,
) -> Result<Json<Value>, AppError> {
    let report_id = parse_uuid("report_id", &report_id)?;

    let report_service = ReportService::with_mailer(&state, mailer);
    let report = report_service.get_report(&user.id, &report_id.to_string(), auth.token()).await?;

    Ok(Json(json!(report)))
}

#[axum::debug_handler]
pub async fn download_report_pdf(
    State(state): State<Arc<AppConfig>>,
    Path(report_id): Path<String>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Extension(mailer): Extension<Arc<dyn Mailer>>,
) -> Result<Response, AppError> {
    let report_id = parse_uuid("report_id", &report_id)?;

    let report_service = ReportService::with_mailer(&state, mailer);
    let (filename, bytes) = report_service
        .report_pdf(&user.id, &report_id.to_string(), auth.token())
        .await?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", filename)),
        ],
        bytes,
    ).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn request() -> SaveReportRequest {
        serde_json::from_value(json!({
            "appointment_id": "7c9e6679-7425-40de-944b-e07fc1f90ae7",
            "diagnosis": "  Seasonal allergy  ",
            "symptoms": "",
            "follow_up_date": "2030-05-01",
            "medicines": [{
                "medicine_id": "a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11",
                "dosage": "10 mg",
                "frequency": "Once daily",
                "duration_days": 14,
                "instructions": null
            }]
        }))
        .unwrap()
    }

    #[test]
    fn test_build_draft_trims_and_parses() {
        let draft = build_draft(request()).unwrap();

        assert_eq!(draft.diagnosis, "Seasonal allergy");
        assert_eq!(draft.symptoms, None);
        assert_eq!(draft.follow_up_date.unwrap().to_string(), "2030-05-01");
        assert_eq!(draft.medicines.len(), 1);
        assert_eq!(draft.medicines[0].duration_days, 14);
        assert!(!draft.send_email);
    }

    #[test]
    fn test_build_draft_requires_diagnosis() {
        let mut request = request();
        request.diagnosis = "   ".to_string();

        assert_matches!(build_draft(request), Err(AppError::ValidationError(msg)) if msg.contains("diagnosis"));
    }

    #[test]
    fn test_build_draft_rejects_bad_duration() {
        for days in [0, 366, -3] {
            let mut request = request();
            request.medicines[0].duration_days = days;
            assert_matches!(
                build_draft(request),
                Err(AppError::ValidationError(msg)) if msg.contains("medicines[0].duration_days")
            );
        }
    }

    #[test]
    fn test_build_draft_requires_dosage_and_frequency() {
        let mut request = request();
        request.medicines[0].frequency = String::new();

        assert_matches!(
            build_draft(request),
            Err(AppError::ValidationError(msg)) if msg.contains("medicines[0].frequency")
        );
    }

    #[test]
    fn test_build_draft_rejects_bad_follow_up_date() {
        let mut request = request();
        request.follow_up_date = Some("next week".to_string());

        assert_matches!(build_draft(request), Err(AppError::ValidationError(_)));
    }

    #[test]
    fn test_report_error_mapping() {
        assert_matches!(AppError::from(ReportError::NotFound), AppError::NotFound(_));
        assert_matches!(AppError::from(ReportError::NotYourAppointment), AppError::Forbidden(_));
        assert_matches!(AppError::from(ReportError::AppointmentCanceled), AppError::BadRequest(_));
        assert_matches!(
            AppError::from(ReportError::UnknownMedicine(uuid::Uuid::nil())),
            AppError::ValidationError(_)
        );
    }
}

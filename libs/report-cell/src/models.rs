// libs/report-cell/src/models.rs
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use appointment_cell::Appointment;

// ==============================================================================
// CATALOGUE
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Medicine {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub form: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MedicineSpecialization {
    pub medicine_id: Uuid,
}

#[derive(Debug, Default, Deserialize)]
pub struct MedicineQuery {
    pub search: Option<String>,
}

// ==============================================================================
// REPORTS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicalReport {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub diagnosis: String,
    #[serde(default)]
    pub symptoms: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub follow_up_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl MedicalReport {
    pub fn is_participant(&self, user_id: &str) -> bool {
        self.doctor_id.to_string() == user_id || self.patient_id.to_string() == user_id
    }

    pub fn pdf_filename(&self) -> String {
        format!("report_{}.pdf", self.id)
    }
}

/// A row of `prescribed_medicines`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrescribedMedicine {
    pub id: Uuid,
    pub report_id: Uuid,
    pub medicine_id: Uuid,
    pub dosage: String,
    pub frequency: String,
    pub duration_days: i32,
    #[serde(default)]
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrescribedMedicineView {
    #[serde(flatten)]
    pub prescription: PrescribedMedicine,
    pub medicine_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportDetail {
    #[serde(flatten)]
    pub report: MedicalReport,
    pub medicines: Vec<PrescribedMedicineView>,
}

/// What the doctor sees when opening the report form of an appointment.
#[derive(Debug, Clone, Serialize)]
pub struct ReportEditView {
    pub appointment: Appointment,
    pub report: Option<ReportDetail>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SaveReportOutcome {
    pub report: ReportDetail,
    pub created: bool,
    pub pdf_generated: bool,
    pub email_sent: bool,
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct PrescriptionInput {
    pub medicine_id: String,
    #[serde(default)]
    pub dosage: String,
    #[serde(default)]
    pub frequency: String,
    pub duration_days: i64,
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SaveReportRequest {
    pub appointment_id: String,
    #[serde(default)]
    pub diagnosis: String,
    pub symptoms: Option<String>,
    pub notes: Option<String>,
    pub follow_up_date: Option<String>,
    #[serde(default)]
    pub medicines: Vec<PrescriptionInput>,
    #[serde(default)]
    pub send_email: bool,
}

/// A validated prescription line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrescriptionDraft {
    pub medicine_id: Uuid,
    pub dosage: String,
    pub frequency: String,
    pub duration_days: i32,
    pub instructions: Option<String>,
}

/// A validated report submission.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportDraft {
    pub appointment_id: Uuid,
    pub diagnosis: String,
    pub symptoms: Option<String>,
    pub notes: Option<String>,
    pub follow_up_date: Option<NaiveDate>,
    pub medicines: Vec<PrescriptionDraft>,
    pub send_email: bool,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Report not found")]
    NotFound,

    #[error("Appointment not found")]
    AppointmentNotFound,

    #[error("This appointment belongs to another doctor")]
    NotYourAppointment,

    #[error("Cannot write a report for a canceled appointment")]
    AppointmentCanceled,

    #[error("Unauthorized access to report")]
    NotParticipant,

    #[error("Unknown medicine: {0}")]
    UnknownMedicine(Uuid),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Could not render report PDF: {0}")]
    PdfError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<anyhow::Error> for ReportError {
    fn from(err: anyhow::Error) -> Self {
        ReportError::DatabaseError(err.to_string())
    }
}

impl From<appointment_cell::AppointmentError> for ReportError {
    fn from(err: appointment_cell::AppointmentError) -> Self {
        use appointment_cell::AppointmentError;
        match err {
            AppointmentError::NotFound => ReportError::AppointmentNotFound,
            AppointmentError::NotParticipant => ReportError::NotYourAppointment,
            AppointmentError::InvalidStatusTransition { .. } => ReportError::AppointmentCanceled,
            other => ReportError::DatabaseError(other.to_string()),
        }
    }
}

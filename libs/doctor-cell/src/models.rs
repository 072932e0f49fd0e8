use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::profile::UserProfile;

/// A doctor as shown to patients browsing the portal.
#[derive(Debug, Clone, Serialize)]
pub struct DoctorSummary {
    #[serde(flatten)]
    pub profile: UserProfile,
    pub average_rating: Option<f64>,
    pub rating_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rating {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub appointment_id: Uuid,
    pub rating: i32,
    #[serde(default)]
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RatingScore {
    pub doctor_id: Uuid,
    pub rating: i32,
}

/// Mean of the scores rounded to one decimal, `None` without scores.
pub fn average_rating(scores: &[i32]) -> Option<f64> {
    if scores.is_empty() {
        return None;
    }
    let mean = scores.iter().map(|s| f64::from(*s)).sum::<f64>() / scores.len() as f64;
    Some((mean * 10.0).round() / 10.0)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DoctorSearchQuery {
    pub specialization: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateDoctorRequest {
    pub appointment_id: String,
    pub rating: i64,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DoctorDashboard {
    pub todays_appointments: usize,
    pub upcoming_appointments: usize,
    pub pending_chats: usize,
    pub reports_written: usize,
    pub open_slots: usize,
    pub average_rating: Option<f64>,
    pub rating_count: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum DoctorError {
    #[error("Doctor not found")]
    NotFound,

    #[error("Appointment not found")]
    AppointmentNotFound,

    #[error("You can only rate doctors you had an appointment with")]
    NotYourAppointment,

    #[error("Only completed appointments can be rated")]
    AppointmentNotCompleted,

    #[error("This appointment has already been rated")]
    AlreadyRated,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<anyhow::Error> for DoctorError {
    fn from(err: anyhow::Error) -> Self {
        DoctorError::DatabaseError(err.to_string())
    }
}

use serde::Serialize;

use appointment_cell::Appointment;

#[derive(Debug, Clone, Serialize)]
pub struct PatientDashboard {
    pub next_appointment: Option<Appointment>,
    pub upcoming_appointments: usize,
    pub active_chats: usize,
    pub reports: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum PatientError {
    #[error("Patient not found")]
    NotFound,

    #[error("Unauthorized access to patient data")]
    Unauthorized,

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<anyhow::Error> for PatientError {
    fn from(err: anyhow::Error) -> Self {
        PatientError::DatabaseError(err.to_string())
    }
}

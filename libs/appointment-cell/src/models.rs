// libs/appointment-cell/src/models.rs
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_database::LockError;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    #[serde(default)]
    pub slot_id: Option<Uuid>,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Appointment {
    pub fn starts_at(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }

    pub fn is_participant(&self, user_id: &str) -> bool {
        self.doctor_id.to_string() == user_id || self.patient_id.to_string() == user_id
    }

    pub fn is_active(&self) -> bool {
        self.status == AppointmentStatus::Scheduled
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Completed,
    Canceled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Canceled => "canceled",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which of the caller's appointments a listing returns.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentScope {
    /// Scheduled, today or later.
    #[default]
    Upcoming,
    /// Finished, canceled, or dated before today.
    Past,
    All,
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct BookAppointmentRequest {
    pub slot_id: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CancelAppointmentRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AppointmentListQuery {
    pub scope: Option<AppointmentScope>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancellationResult {
    pub appointment: Appointment,
    pub notification_sent: bool,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Slot not found")]
    SlotNotFound,

    #[error("This slot is in the past")]
    SlotInPast,

    #[error("This slot has just been booked by someone else")]
    SlotTaken,

    #[error("You already have an appointment with this doctor on that day")]
    DuplicateBooking,

    #[error("Unauthorized access to appointment")]
    NotParticipant,

    #[error("Appointment cannot move from {from} to {to}")]
    InvalidStatusTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("The schedule is busy, please try again")]
    Busy,

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<anyhow::Error> for AppointmentError {
    fn from(err: anyhow::Error) -> Self {
        if LockError::is_busy(&err) {
            return AppointmentError::Busy;
        }
        match err.downcast::<AppointmentError>() {
            Ok(appointment_err) => appointment_err,
            Err(other) => AppointmentError::DatabaseError(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_typed_errors_survive_the_lock() {
        let err: anyhow::Error = AppointmentError::SlotTaken.into();
        assert_matches!(AppointmentError::from(err), AppointmentError::SlotTaken);

        let err: anyhow::Error = LockError::Busy.into();
        assert_matches!(AppointmentError::from(err), AppointmentError::Busy);

        let err = anyhow::anyhow!("connection reset");
        assert_matches!(AppointmentError::from(err), AppointmentError::DatabaseError(msg) if msg == "connection reset");
    }

    #[test]
    fn test_status_wire_format() {
        assert_eq!(serde_json::to_value(AppointmentStatus::Canceled).unwrap(), "canceled");
        let scope: AppointmentScope = serde_json::from_str("\"past\"").unwrap();
        assert_eq!(scope, AppointmentScope::Past);
        assert_eq!(AppointmentScope::default(), AppointmentScope::Upcoming);
    }
}

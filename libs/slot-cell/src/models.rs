// libs/slot-cell/src/models.rs
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_database::LockError;

// ==============================================================================
// SLOT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Slot {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub created_at: DateTime<Utc>,
}

impl Slot {
    pub fn starts_at(&self) -> chrono::NaiveDateTime {
        self.date.and_time(self.time)
    }
}

/// A slot as the owning doctor sees it.
#[derive(Debug, Clone, Serialize)]
pub struct SlotView {
    #[serde(flatten)]
    pub slot: Slot,
    pub is_booked: bool,
}

/// Raw form input. Parsed and range-checked before it reaches the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSlotsRequest {
    pub date: String,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotWindow {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct SlotGenerationResult {
    pub created: Vec<Slot>,
    pub skipped: Vec<NaiveTime>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SlotDeletionResult {
    pub slot_id: Uuid,
    pub canceled_appointment_id: Option<Uuid>,
    pub notification_sent: bool,
}

#[derive(Debug, Deserialize)]
pub struct DoctorSlotsQuery {
    pub from: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AvailableSlotsQuery {
    pub date: String,
}

/// The part of an appointment row the slot cascade needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookedAppointment {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub status: String,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SlotError {
    #[error("Slot not found")]
    NotFound,

    #[error("You can only manage your own slots")]
    NotOwner,

    #[error("{0}")]
    ValidationError(String),

    #[error("Slots for this day are being updated, please try again")]
    Busy,

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<anyhow::Error> for SlotError {
    fn from(err: anyhow::Error) -> Self {
        if LockError::is_busy(&err) {
            SlotError::Busy
        } else {
            SlotError::DatabaseError(err.to_string())
        }
    }
}

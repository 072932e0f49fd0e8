// libs/chat-cell/src/models.rs
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub status: ChatStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Chat {
    pub fn is_participant(&self, user_id: &str) -> bool {
        self.doctor_id.to_string() == user_id || self.patient_id.to_string() == user_id
    }

    pub fn is_doctor(&self, user_id: &str) -> bool {
        self.doctor_id.to_string() == user_id
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChatStatus {
    Pending,
    Accepted,
    Closed,
}

impl ChatStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatStatus::Pending => "pending",
            ChatStatus::Accepted => "accepted",
            ChatStatus::Closed => "closed",
        }
    }

    /// pending -> accepted, and pending or accepted -> closed.
    pub fn can_transition_to(&self, next: ChatStatus) -> bool {
        matches!(
            (self, next),
            (ChatStatus::Pending, ChatStatus::Accepted)
                | (ChatStatus::Pending, ChatStatus::Closed)
                | (ChatStatus::Accepted, ChatStatus::Closed)
        )
    }

    pub fn is_open(&self) -> bool {
        !matches!(self, ChatStatus::Closed)
    }
}

impl fmt::Display for ChatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestChatRequest {
    pub doctor_id: String,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChatListQuery {
    pub status: Option<ChatStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MessagesQuery {
    /// Only messages created strictly after this instant.
    pub after: Option<DateTime<Utc>>,
}

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Chat not found")]
    NotFound,

    #[error("Doctor not found")]
    DoctorNotFound,

    #[error("You already have an open chat with this doctor")]
    AlreadyOpen,

    #[error("Unauthorized access to chat")]
    NotParticipant,

    #[error("Chat cannot move from {from} to {to}")]
    InvalidStatus { from: ChatStatus, to: ChatStatus },

    #[error("Messages can only be sent once the doctor accepts the chat")]
    NotAccepted,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<anyhow::Error> for ChatError {
    fn from(err: anyhow::Error) -> Self {
        ChatError::DatabaseError(err.to_string())
    }
}

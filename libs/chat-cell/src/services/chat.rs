// libs/chat-cell/src/services/chat.rs
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Method;
use serde_json::json;
use tracing::{debug, error, info, instrument, warn};

use shared_config::AppConfig;
use shared_database::{return_representation, SupabaseClient};
use shared_models::auth::{User, ROLE_DOCTOR};

use crate::models::{Chat, ChatError, ChatMessage, ChatStatus};

pub const MAX_MESSAGE_CHARS: usize = 2000;

pub struct ChatService {
    supabase: SupabaseClient,
}

impl ChatService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    fn validate_content(content: &str) -> Result<String, ChatError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ChatError::ValidationError("Message cannot be empty".to_string()));
        }
        if content.chars().count() > MAX_MESSAGE_CHARS {
            return Err(ChatError::ValidationError(format!(
                "Message cannot exceed {} characters",
                MAX_MESSAGE_CHARS
            )));
        }
        Ok(content.to_string())
    }

    /// Open a pending chat with a doctor. One open chat per pair.
    #[instrument(skip(self, first_message, auth_token))]
    pub async fn request_chat(
        &self,
        patient_id: &str,
        doctor_id: &str,
        first_message: Option<&str>,
        auth_token: &str,
    ) -> Result<Chat, ChatError> {
        let first_message = first_message
            .filter(|m| !m.trim().is_empty())
            .map(Self::validate_content)
            .transpose()?;

        self.supabase
            .get_user(doctor_id, Some(ROLE_DOCTOR), auth_token)
            .await?
            .ok_or(ChatError::DoctorNotFound)?;

        let open_path = format!(
            "/rest/v1/chats?patient_id=eq.{}&doctor_id=eq.{}&status=in.(pending,accepted)&limit=1",
            patient_id, doctor_id
        );
        let open: Option<Chat> = self.supabase.fetch_one(&open_path, auth_token).await?;
        if let Some(existing) = open {
            debug!("Chat {} between {} and {} is still open", existing.id, patient_id, doctor_id);
            return Err(ChatError::AlreadyOpen);
        }

        let now = Utc::now().to_rfc3339();
        let created: Vec<Chat> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/chats",
            Some(auth_token),
            Some(json!({
                "patient_id": patient_id,
                "doctor_id": doctor_id,
                "status": ChatStatus::Pending,
                "created_at": now,
                "updated_at": now,
            })),
            Some(return_representation()),
        ).await?;

        let chat = created.into_iter().next()
            .ok_or_else(|| ChatError::DatabaseError("Insert returned no chat row".to_string()))?;

        if let Some(content) = first_message {
            if let Err(e) = self.insert_message(&chat, patient_id, &content, auth_token).await {
                warn!("First message of chat {} failed, removing the chat", chat.id);
                let delete_path = format!("/rest/v1/chats?id=eq.{}", chat.id);
                if let Err(cleanup_err) = self.supabase.execute(Method::DELETE, &delete_path, Some(auth_token), None).await {
                    error!("Could not remove chat {}: {}", chat.id, cleanup_err);
                }
                return Err(e.into());
            }
        }

        info!("Patient {} requested chat {} with doctor {}", patient_id, chat.id, doctor_id);
        Ok(chat)
    }

    pub async fn list_chats(
        &self,
        user: &User,
        status: Option<ChatStatus>,
        auth_token: &str,
    ) -> Result<Vec<Chat>, ChatError> {
        let column = if user.is_doctor() { "doctor_id" } else { "patient_id" };
        let mut path = format!("/rest/v1/chats?{}=eq.{}", column, user.id);
        if let Some(status) = status {
            path.push_str(&format!("&status=eq.{}", status));
        }
        path.push_str("&order=updated_at.desc");

        Ok(self.supabase.fetch_all(&path, auth_token).await?)
    }

    pub async fn get_chat(&self, chat_id: &str, user_id: &str, auth_token: &str) -> Result<Chat, ChatError> {
        let path = format!("/rest/v1/chats?id=eq.{}", chat_id);
        let chat: Chat = self.supabase.fetch_one(&path, auth_token).await?
            .ok_or(ChatError::NotFound)?;

        if !chat.is_participant(user_id) {
            return Err(ChatError::NotParticipant);
        }
        Ok(chat)
    }

    pub async fn accept_chat(&self, doctor_id: &str, chat_id: &str, auth_token: &str) -> Result<Chat, ChatError> {
        let chat = self.get_chat(chat_id, doctor_id, auth_token).await?;
        if !chat.is_doctor(doctor_id) {
            return Err(ChatError::NotParticipant);
        }

        let accepted = self.transition(&chat, ChatStatus::Accepted, auth_token).await?;
        info!("Doctor {} accepted chat {}", doctor_id, chat.id);
        Ok(accepted)
    }

    /// Either participant may close the chat.
    pub async fn close_chat(&self, user_id: &str, chat_id: &str, auth_token: &str) -> Result<Chat, ChatError> {
        let chat = self.get_chat(chat_id, user_id, auth_token).await?;
        let closed = self.transition(&chat, ChatStatus::Closed, auth_token).await?;
        info!("Chat {} closed by {}", chat.id, user_id);
        Ok(closed)
    }

    async fn transition(&self, chat: &Chat, next: ChatStatus, auth_token: &str) -> Result<Chat, ChatError> {
        if !chat.status.can_transition_to(next) {
            return Err(ChatError::InvalidStatus { from: chat.status, to: next });
        }

        let path = format!("/rest/v1/chats?id=eq.{}&status=eq.{}", chat.id, chat.status);
        let updated: Vec<Chat> = self.supabase.request_with_headers(
            Method::PATCH,
            &path,
            Some(auth_token),
            Some(json!({
                "status": next,
                "updated_at": Utc::now().to_rfc3339(),
            })),
            Some(return_representation()),
        ).await?;

        updated.into_iter().next()
            .ok_or(ChatError::InvalidStatus { from: chat.status, to: next })
    }

    #[instrument(skip(self, content, auth_token))]
    pub async fn send_message(
        &self,
        sender_id: &str,
        chat_id: &str,
        content: &str,
        auth_token: &str,
    ) -> Result<ChatMessage, ChatError> {
        let content = Self::validate_content(content)?;
        let chat = self.get_chat(chat_id, sender_id, auth_token).await?;

        if chat.status != ChatStatus::Accepted {
            return Err(ChatError::NotAccepted);
        }

        let message = self.insert_message(&chat, sender_id, &content, auth_token).await?;

        // Keeps the chat list ordered by activity; not worth failing the send over.
        let touch_path = format!("/rest/v1/chats?id=eq.{}", chat.id);
        if let Err(e) = self.supabase.execute(
            Method::PATCH,
            &touch_path,
            Some(auth_token),
            Some(json!({ "updated_at": message.created_at })),
        ).await {
            warn!("Could not bump chat {}: {}", chat.id, e);
        }

        Ok(message)
    }

    async fn insert_message(
        &self,
        chat: &Chat,
        sender_id: &str,
        content: &str,
        auth_token: &str,
    ) -> anyhow::Result<ChatMessage> {
        let inserted: Vec<ChatMessage> = self.supabase.request_with_headers(
            Method::POST,
            "/rest/v1/chat_messages",
            Some(auth_token),
            Some(json!({
                "chat_id": chat.id,
                "sender_id": sender_id,
                "content": content,
                "created_at": Utc::now().to_rfc3339(),
            })),
            Some(return_representation()),
        ).await?;

        inserted.into_iter().next()
            .ok_or_else(|| anyhow::anyhow!("Insert returned no message row"))
    }

    /// Messages of a chat in send order; `after` turns this into a poll for
    /// new messages.
    pub async fn list_messages(
        &self,
        user_id: &str,
        chat_id: &str,
        after: Option<DateTime<Utc>>,
        auth_token: &str,
    ) -> Result<Vec<ChatMessage>, ChatError> {
        let chat = self.get_chat(chat_id, user_id, auth_token).await?;

        let mut path = format!("/rest/v1/chat_messages?chat_id=eq.{}", chat.id);
        if let Some(after) = after {
            let cursor = after.to_rfc3339_opts(SecondsFormat::Micros, true);
            path.push_str(&format!("&created_at=gt.{}", urlencoding::encode(&cursor)));
        }
        path.push_str("&order=created_at.asc");

        Ok(self.supabase.fetch_all(&path, auth_token).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_is_trimmed_and_bounded() {
        assert_eq!(ChatService::validate_content("  hello  ").unwrap(), "hello");
        assert!(ChatService::validate_content("   ").is_err());
        assert!(ChatService::validate_content(&"é".repeat(MAX_MESSAGE_CHARS)).is_ok());
        assert!(ChatService::validate_content(&"a".repeat(MAX_MESSAGE_CHARS + 1)).is_err());
    }
}

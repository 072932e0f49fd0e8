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
use shared_utils::extractor::{require_doctor, require_patient};
use shared_utils::validation::parse_uuid;

use crate::models::{ChatError, ChatListQuery, MessagesQuery, RequestChatRequest, SendMessageRequest};
use crate::services::chat::ChatService;

impl From<ChatError> for AppError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::NotFound | ChatError::DoctorNotFound => AppError::NotFound(err.to_string()),
            ChatError::AlreadyOpen => AppError::Conflict(err.to_string()),
            ChatError::NotParticipant => AppError::Forbidden(err.to_string()),
            ChatError::InvalidStatus { .. } | ChatError::NotAccepted => AppError::BadRequest(err.to_string()),
            ChatError::ValidationError(msg) => AppError::ValidationError(msg),
            ChatError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}

#[axum::debug_handler]
pub async fn request_chat(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<RequestChatRequest>,
) -> Result<Json<Value>, AppError> {
    require_patient(&user)?;
    let doctor_id = parse_uuid("doctor_id", &request.doctor_id)?;

    let chat_service = ChatService::new(&state);
    let chat = chat_service
        .request_chat(&user.id, &doctor_id.to_string(), request.message.as_deref(), auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "chat": chat,
        "message": "Chat request sent, waiting for the doctor to accept"
    })))
}

#[axum::debug_handler]
pub async fn list_chats(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<ChatListQuery>,
) -> Result<Json<Value>, AppError> {
    let chat_service = ChatService::new(&state);
    let chats = chat_service.list_chats(&user, query.status, auth.token()).await?;

    Ok(Json(json!({
        "chats": chats,
        "total": chats.len()
    })))
}

#[axum::debug_handler]
pub async fn get_chat(
    State(state): State<Arc<AppConfig>>,
    Path(chat_id): Path<String>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let chat_id = parse_uuid("chat_id", &chat_id)?;

    let chat_service = ChatService::new(&state);
    let chat = chat_service.get_chat(&chat_id.to_string(), &user.id, auth.token()).await?;

    Ok(Json(json!(chat)))
}

#[axum::debug_handler]
pub async fn accept_chat(
    State(state): State<Arc<AppConfig>>,
    Path(chat_id): Path<String>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_doctor(&user)?;
    let chat_id = parse_uuid("chat_id", &chat_id)?;

    let chat_service = ChatService::new(&state);
    let chat = chat_service.accept_chat(&user.id, &chat_id.to_string(), auth.token()).await?;

    Ok(Json(json!({
        "success": true,
        "chat": chat,
        "message": "Chat accepted"
    })))
}

#[axum::debug_handler]
pub async fn close_chat(
    State(state): State<Arc<AppConfig>>,
    Path(chat_id): Path<String>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let chat_id = parse_uuid("chat_id", &chat_id)?;

    let chat_service = ChatService::new(&state);
    let chat = chat_service.close_chat(&user.id, &chat_id.to_string(), auth.token()).await?;

    Ok(Json(json!({
        "success": true,
        "chat": chat,
        "message": "Chat closed"
    })))
}

#[axum::debug_handler]
pub async fn send_message(
    State(state): State<Arc<AppConfig>>,
    Path(chat_id): Path<String>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<SendMessageRequest>,
) -> Result<Json<Value>, AppError> {
    let chat_id = parse_uuid("chat_id", &chat_id)?;

    let chat_service = ChatService::new(&state);
    let message = chat_service
        .send_message(&user.id, &chat_id.to_string(), &request.content, auth.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": message
    })))
}

#[axum::debug_handler]
pub async fn list_messages(
    State(state): State<Arc<AppConfig>>,
    Path(chat_id): Path<String>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<Value>, AppError> {
    let chat_id = parse_uuid("chat_id", &chat_id)?;

    let chat_service = ChatService::new(&state);
    let messages = chat_service
        .list_messages(&user.id, &chat_id.to_string(), query.after, auth.token())
        .await?;

    Ok(Json(json!({
        "messages": messages,
        "total": messages.len()
    })))
}

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
    middleware,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn chat_routes(state: Arc<AppConfig>) -> Router {
    let protected_routes = Router::new()
        .route("/", post(handlers::request_chat).get(handlers::list_chats))
        .route("/{chat_id}", get(handlers::get_chat))
        .route("/{chat_id}/accept", post(handlers::accept_chat))
        .route("/{chat_id}/close", post(handlers::close_chat))
        .route("/{chat_id}/messages", post(handlers::send_message).get(handlers::list_messages))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, delete},
    middleware,
    Extension,
};

use notification_cell::Mailer;
use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn slot_routes(state: Arc<AppConfig>, mailer: Arc<dyn Mailer>) -> Router {
    let protected_routes = Router::new()
        // Doctor side ("add_slot" / "my slots" / "delete_slot")
        .route("/", post(handlers::create_slots))
        .route("/mine", get(handlers::list_my_slots))
        .route("/{slot_id}", delete(handlers::delete_slot))

        // Patient side, picking a time to book
        .route("/doctors/{doctor_id}/available", get(handlers::list_available_slots))

        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .layer(Extension(mailer))
        .with_state(state)
}

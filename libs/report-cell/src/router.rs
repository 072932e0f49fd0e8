use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
    middleware,
    Extension,
};

use notification_cell::Mailer;
use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn report_routes(state: Arc<AppConfig>, mailer: Arc<dyn Mailer>) -> Router {
    let protected_routes = Router::new()
        .route("/", post(handlers::save_report))
        .route("/mine", get(handlers::list_my_reports))
        .route("/medicines", get(handlers::list_medicines))
        .route("/appointments/{appointment_id}", get(handlers::get_report_for_edit))
        .route("/{report_id}", get(handlers::get_report))
        .route("/{report_id}/pdf", get(handlers::download_report_pdf))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .layer(Extension(mailer))
        .with_state(state)
}

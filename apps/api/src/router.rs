use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use appointment_cell::appointment_routes;
use auth_cell::auth_routes;
use chat_cell::chat_routes;
use doctor_cell::doctor_routes;
use notification_cell::Mailer;
use patient_cell::patient_routes;
use report_cell::report_routes;
use shared_config::AppConfig;
use slot_cell::slot_routes;

pub fn create_router(state: Arc<AppConfig>, mailer: Arc<dyn Mailer>) -> Router {
    Router::new()
        .route("/", get(|| async { "MediVerse API is running!" }))
        .nest("/auth", auth_routes(state.clone()))
        .nest("/slots", slot_routes(state.clone(), mailer.clone()))
        .nest("/appointments", appointment_routes(state.clone(), mailer.clone()))
        .nest("/chats", chat_routes(state.clone()))
        .nest("/reports", report_routes(state.clone(), mailer))
        .nest("/doctors", doctor_routes(state.clone()))
        .nest("/patients", patient_routes(state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    use notification_cell::NoopMailer;
    use shared_utils::test_utils::TestConfig;

    fn app() -> Router {
        create_router(TestConfig::default().to_arc(), Arc::new(NoopMailer))
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_liveness() {
        let response = app().oneshot(get("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"MediVerse API is running!");
    }

    #[tokio::test]
    async fn test_cells_are_mounted_behind_auth() {
        for uri in ["/slots/mine", "/appointments/mine", "/chats", "/reports/mine", "/patients/me", "/doctors/me/dashboard"] {
            let response = app().oneshot(get(uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", uri);
        }
    }
}

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, Local};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use notification_cell::NoopMailer;
use shared_utils::test_utils::{JwtTestUtils, MockSupabaseResponses, TestConfig, TestUser, TEST_JWT_SECRET};
use slot_cell::slot_routes;

fn create_test_app(supabase_url: &str) -> Router {
    slot_routes(TestConfig::with_supabase_url(supabase_url).to_arc(), Arc::new(NoopMailer))
}

fn bearer(user: &TestUser) -> String {
    format!("Bearer {}", JwtTestUtils::create_test_token(user, TEST_JWT_SECRET, Some(1)))
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn create_slots_request(auth: Option<String>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/")
        .header("content-type", "application/json");
    if let Some(auth) = auth {
        builder = builder.header("authorization", auth);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn test_create_slots_requires_token() {
    let app = create_test_app("http://localhost:54321");

    let response = app
        .oneshot(create_slots_request(None, json!({
            "date": "2030-01-01", "start_time": "09:00", "end_time": "10:00"
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_patient_cannot_create_slots() {
    let app = create_test_app("http://localhost:54321");
    let patient = TestUser::patient("patient@example.com");

    let response = app
        .oneshot(create_slots_request(Some(bearer(&patient)), json!({
            "date": "2030-01-01", "start_time": "09:00", "end_time": "10:00"
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Only doctors can perform this action");
}

#[tokio::test]
async fn test_create_slots_rejects_malformed_time() {
    let app = create_test_app("http://localhost:54321");
    let doctor = TestUser::doctor("doctor@example.com");

    let response = app
        .oneshot(create_slots_request(Some(bearer(&doctor)), json!({
            "date": "2030-01-01", "start_time": "9am", "end_time": "10:00"
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("start_time"));
}

#[tokio::test]
async fn test_create_slots_end_to_end() {
    let mock_server = MockServer::start().await;
    let doctor = TestUser::doctor("doctor@example.com");
    let date = (Local::now().date_naive() + Duration::days(3)).to_string();

    Mock::given(method("POST"))
        .and(path("/rest/v1/scheduling_locks"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&mock_server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/scheduling_locks"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/slots"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::slot_row(&Uuid::new_v4().to_string(), &doctor.id, &date, "15:00:00"),
            MockSupabaseResponses::slot_row(&Uuid::new_v4().to_string(), &doctor.id, &date, "15:30:00"),
        ])))
        .mount(&mock_server)
        .await;

    let app = create_test_app(&mock_server.uri());
    let response = app
        .oneshot(create_slots_request(Some(bearer(&doctor)), json!({
            "date": date, "start_time": "15:00", "end_time": "16:00"
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["created_count"], 2);
    assert_eq!(body["created"][1]["time"], "15:30:00");
    assert_eq!(body["skipped"], json!([]));
}

#[tokio::test]
async fn test_busy_day_lock_maps_to_conflict() {
    let mock_server = MockServer::start().await;
    let doctor = TestUser::doctor("doctor@example.com");
    let date = (Local::now().date_naive() + Duration::days(3)).to_string();

    Mock::given(method("POST"))
        .and(path("/rest/v1/scheduling_locks"))
        .respond_with(ResponseTemplate::new(409).set_body_json(
            MockSupabaseResponses::error_response("duplicate key value", "23505")
        ))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/scheduling_locks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "lock_key": format!("slots:{}:{}", doctor.id, date),
            "owner": "someone-else",
            "expires_at": (chrono::Utc::now() + Duration::seconds(30)).to_rfc3339()
        }])))
        .mount(&mock_server)
        .await;

    let app = create_test_app(&mock_server.uri());
    let response = app
        .oneshot(create_slots_request(Some(bearer(&doctor)), json!({
            "date": date, "start_time": "09:00", "end_time": "10:00"
        })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_available_slots_rejects_bad_doctor_id() {
    let app = create_test_app("http://localhost:54321");
    let patient = TestUser::patient("patient@example.com");

    let request = Request::builder()
        .method("GET")
        .uri("/doctors/not-a-uuid/available?date=2030-01-01")
        .header("authorization", bearer(&patient))
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

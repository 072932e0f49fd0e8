use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use chat_cell::chat_routes;
use shared_utils::test_utils::{JwtTestUtils, MockSupabaseResponses, TestConfig, TestUser, TEST_JWT_SECRET};

fn create_test_app(supabase_url: &str) -> Router {
    chat_routes(TestConfig::with_supabase_url(supabase_url).to_arc())
}

fn bearer(user: &TestUser) -> String {
    format!("Bearer {}", JwtTestUtils::create_test_token(user, TEST_JWT_SECRET, Some(1)))
}

fn post_json(uri: &str, auth: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("authorization", auth)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_chats_require_token() {
    let app = create_test_app("http://localhost:54321");

    let request = Request::builder()
        .method("GET")
        .uri("/")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_doctor_cannot_request_chat() {
    let app = create_test_app("http://localhost:54321");
    let doctor = TestUser::doctor("doctor@example.com");

    let response = app
        .oneshot(post_json("/", &bearer(&doctor), json!({ "doctor_id": Uuid::new_v4() })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_empty_message_is_rejected() {
    let app = create_test_app("http://localhost:54321");
    let patient = TestUser::patient("patient@example.com");

    let response = app
        .oneshot(post_json(
            &format!("/{}/messages", Uuid::new_v4()),
            &bearer(&patient),
            json!({ "content": "   " }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_list_chats_filters_by_role_and_status() {
    let mock_server = MockServer::start().await;
    let doctor = TestUser::doctor("doctor@example.com");

    Mock::given(method("GET"))
        .and(path("/rest/v1/chats"))
        .and(query_param("doctor_id", format!("eq.{}", doctor.id)))
        .and(query_param("status", "eq.pending"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::chat_row(&Uuid::new_v4().to_string(), &Uuid::new_v4().to_string(), &doctor.id, "pending")
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let request = Request::builder()
        .method("GET")
        .uri("/?status=pending")
        .header("authorization", bearer(&doctor))
        .body(Body::empty())
        .unwrap();

    let response = create_test_app(&mock_server.uri()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json_response: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json_response["total"], 1);
    assert_eq!(json_response["chats"][0]["status"], "pending");
}

#[tokio::test]
async fn test_duplicate_chat_request_returns_conflict() {
    let mock_server = MockServer::start().await;
    let patient = TestUser::patient("patient@example.com");
    let doctor_id = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::user_row(&doctor_id, "doctor", "Gregory House")
        ])))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/chats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::chat_row(&Uuid::new_v4().to_string(), &patient.id, &doctor_id, "pending")
        ])))
        .mount(&mock_server)
        .await;

    let response = create_test_app(&mock_server.uri())
        .oneshot(post_json("/", &bearer(&patient), json!({ "doctor_id": doctor_id })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

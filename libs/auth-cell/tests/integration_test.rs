use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use auth_cell::auth_routes;
use shared_utils::test_utils::{JwtTestUtils, MockSupabaseResponses, TestConfig, TestUser, TEST_JWT_SECRET};

fn create_test_app(config: TestConfig) -> Router {
    auth_routes(config.to_arc())
}

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn post(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_validate_token_endpoint() {
    let user = TestUser::patient("test@example.com");
    let token = JwtTestUtils::create_test_token(&user, TEST_JWT_SECRET, Some(24));

    let response = create_test_app(TestConfig::default())
        .oneshot(post("/validate", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json_response = body_json(response).await;
    assert_eq!(json_response["valid"], true);
    assert_eq!(json_response["user_id"], user.id);
    assert_eq!(json_response["email"], user.email);
    assert_eq!(json_response["role"], "patient");
}

#[tokio::test]
async fn test_validate_token_endpoint_unauthorized() {
    let response = create_test_app(TestConfig::default())
        .oneshot(post("/validate", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_validate_rejects_expired_token() {
    let user = TestUser::doctor("doctor@example.com");
    let token = JwtTestUtils::create_expired_token(&user, TEST_JWT_SECRET);

    let response = create_test_app(TestConfig::default())
        .oneshot(post("/validate", Some(&token)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_verify_token_endpoint() {
    let user = TestUser::doctor("doctor@example.com");
    let valid = JwtTestUtils::create_test_token(&user, TEST_JWT_SECRET, Some(24));
    let forged = JwtTestUtils::create_invalid_signature_token(&user);

    let response = create_test_app(TestConfig::default())
        .oneshot(post("/verify", Some(&valid)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["valid"], true);

    let response = create_test_app(TestConfig::default())
        .oneshot(post("/verify", Some(&forged)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["valid"], false);
}

#[tokio::test]
async fn test_get_profile_endpoint_success() {
    let mock_server = MockServer::start().await;
    let user = TestUser::doctor("doctor@example.com");
    let token = JwtTestUtils::create_test_token(&user, TEST_JWT_SECRET, Some(24));

    Mock::given(method("GET"))
        .and(path("/rest/v1/users"))
        .and(query_param("id", format!("eq.{}", user.id)))
        .and(header("Authorization", format!("Bearer {}", token).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::user_row(&user.id, "doctor", "Gregory House")
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let request = Request::builder()
        .method("GET")
        .uri("/profile")
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = create_test_app(TestConfig::with_supabase_url(mock_server.uri()))
        .oneshot(request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json_response = body_json(response).await;
    assert_eq!(json_response["user_id"], user.id);
    assert_eq!(json_response["role"], "doctor");
    assert_eq!(json_response["profile"]["full_name"], "Gregory House");
}

#[tokio::test]
async fn test_get_profile_missing_row() {
    let mock_server = MockServer::start().await;
    let user = TestUser::patient("patient@example.com");
    let token = JwtTestUtils::create_test_token(&user, TEST_JWT_SECRET, Some(24));

    Mock::given(method("GET"))
        .and(path("/rest/v1/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let request = Request::builder()
        .method("GET")
        .uri("/profile")
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = create_test_app(TestConfig::with_supabase_url(mock_server.uri()))
        .oneshot(request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_get_profile_requires_token() {
    let request = Request::builder()
        .method("GET")
        .uri("/profile")
        .body(Body::empty())
        .unwrap();

    let response = create_test_app(TestConfig::default()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unknown_route() {
    let response = create_test_app(TestConfig::default())
        .oneshot(post("/nonexistent", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
    body::Body,
};

use shared_models::auth::User;
use shared_models::error::AppError;
use shared_config::AppConfig;

use crate::jwt::validate_token;

pub fn extract_bearer_token(headers: &HeaderMap) -> Result<String, AppError> {
    let auth_header = headers
        .get("Authorization")
        .ok_or_else(|| AppError::Auth("Missing authorization header".to_string()))?;

    let auth_value = auth_header
        .to_str()
        .map_err(|_| AppError::Auth("Invalid authorization header format".to_string()))?;

    match auth_value.strip_prefix("Bearer ") {
        Some(token) if !token.is_empty() => Ok(token.to_string()),
        _ => Err(AppError::Auth("Invalid authorization header format".to_string())),
    }
}

pub async fn auth_middleware(
    State(config): State<Arc<AppConfig>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer_token(request.headers())?;

    let user = validate_token(&token, &config.supabase_jwt_secret)
        .map_err(AppError::Auth)?;

    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

pub fn require_role(user: &User, role: &str) -> Result<(), AppError> {
    if user.has_role(role) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!("Only {}s can perform this action", role)))
    }
}

pub fn require_doctor(user: &User) -> Result<(), AppError> {
    require_role(user, shared_models::auth::ROLE_DOCTOR)
}

pub fn require_patient(user: &User) -> Result<(), AppError> {
    require_role(user, shared_models::auth::ROLE_PATIENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestUser;
    use axum::http::HeaderValue;

    #[test]
    fn test_extract_bearer_token() {
        let mut headers = HeaderMap::new();
        headers.insert("Authorization", HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(extract_bearer_token(&headers).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn test_extract_bearer_token_rejects_other_schemes() {
        let mut headers = HeaderMap::new();
        headers.insert("Authorization", HeaderValue::from_static("Basic dXNlcjpwYXNz"));
        assert!(matches!(extract_bearer_token(&headers), Err(AppError::Auth(_))));

        assert!(extract_bearer_token(&HeaderMap::new()).is_err());
    }

    #[test]
    fn test_require_role() {
        let doctor = TestUser::doctor("doc@example.com").to_user();
        let patient = TestUser::patient("pat@example.com").to_user();

        assert!(require_doctor(&doctor).is_ok());
        assert!(require_patient(&patient).is_ok());
        match require_doctor(&patient) {
            Err(AppError::Forbidden(msg)) => assert!(msg.contains("doctors")),
            other => panic!("Expected Forbidden, got {:?}", other),
        }
    }
}

mod common;

use axum::{
    extract::FromRequestParts,
    http::{Method, Request, StatusCode, header, request::Parts},
};
use common::{MockRepo, codec, stored_user, test_state};
use property_tracker::{MockNotifier, Role, auth::AuthUser, session::Identity};
use uuid::Uuid;

/// Helper to get the mutable Parts struct from a generated Request
fn request_parts(cookie: Option<&str>) -> Parts {
    let mut builder = Request::builder().method(Method::GET).uri("/api/auth/me");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    let (parts, _) = builder.body(axum::body::Body::empty()).unwrap().into_parts();
    parts
}

fn token_for_record(record: &property_tracker::models::UserRecord) -> String {
    codec().encode(&record.identity().unwrap()).unwrap()
}

#[tokio::test]
async fn test_auth_success_with_valid_cookie() {
    let user = stored_user("dora@example.com", "pw-123456", Role::User);
    let token = token_for_record(&user);
    let state = test_state(MockRepo::with_users(vec![user.clone()]), MockNotifier::new());

    let mut parts = request_parts(Some(&format!("theme=dark; session={token}")));
    let auth_user = AuthUser::from_request_parts(&mut parts, &state).await.unwrap();

    assert_eq!(auth_user.id, user.id);
    assert_eq!(auth_user.identity.role, Role::User);
}

#[tokio::test]
async fn test_stored_record_wins_over_cookie_claims() {
    let mut user = stored_user("eli@example.com", "pw-123456", Role::User);
    let token = token_for_record(&user);
    // Promoted after the cookie was issued.
    user.role = "BROKER".to_string();
    user.verified = true;
    let state = test_state(MockRepo::with_users(vec![user]), MockNotifier::new());

    let mut parts = request_parts(Some(&format!("session={token}")));
    let auth_user = AuthUser::from_request_parts(&mut parts, &state).await.unwrap();

    assert_eq!(auth_user.identity.role, Role::Broker);
    assert!(auth_user.identity.verified);
}

#[tokio::test]
async fn test_auth_failure_with_missing_cookie() {
    let state = test_state(MockRepo::default(), MockNotifier::new());
    let mut parts = request_parts(None);

    let result = AuthUser::from_request_parts(&mut parts, &state).await;
    assert_eq!(result.unwrap_err(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_failure_with_unsigned_json_cookie() {
    // The legacy format: identity JSON written straight into the cookie.
    let legacy = r#"{"userId":"1","role":"ADMIN","email":"x@example.com","name":"X","verified":true}"#;
    let state = test_state(MockRepo::default(), MockNotifier::new());
    let mut parts = request_parts(Some(&format!("session={legacy}")));

    let result = AuthUser::from_request_parts(&mut parts, &state).await;
    assert_eq!(result.unwrap_err(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_failure_for_deleted_user() {
    let user = stored_user("gone@example.com", "pw-123456", Role::User);
    let token = token_for_record(&user);
    let state = test_state(MockRepo::default(), MockNotifier::new());

    let mut parts = request_parts(Some(&format!("session={token}")));
    let result = AuthUser::from_request_parts(&mut parts, &state).await;
    assert_eq!(result.unwrap_err(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_auth_failure_with_non_uuid_subject() {
    let identity = Identity {
        user_id: "cuid_abc123".to_string(),
        role: Role::User,
        email: "x@example.com".to_string(),
        name: "X".to_string(),
        phone_e164: None,
        verified: false,
    };
    let token = codec().encode(&identity).unwrap();
    let state = test_state(MockRepo::default(), MockNotifier::new());

    let mut parts = request_parts(Some(&format!("session={token}")));
    let result = AuthUser::from_request_parts(&mut parts, &state).await;
    assert_eq!(result.unwrap_err(), StatusCode::UNAUTHORIZED);
    assert!(Uuid::parse_str(&identity.user_id).is_err());
}

mod common;

use axum::http::StatusCode;
use common::{register, request_json, request_json_auth, unique_email};

#[tokio::test]
async fn register_then_login_issues_independent_sessions() {
    let app = common::test_router().await;
    let email = unique_email();

    let session = register(&app, &email).await;

    let login_body = serde_json::json!({
        "email": email,
        "password": "correct-horse-battery-staple",
        "device_name": "second-device",
    });
    let (status, login) = request_json(&app, "POST", "/api/v1/auth/login", Some(login_body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(login["device_id"].as_str().unwrap(), session.device_id.to_string());
    assert_ne!(login["access_token"].as_str().unwrap(), session.access_token);
}

#[tokio::test]
async fn wrong_password_is_rejected() {
    let app = common::test_router().await;
    let email = unique_email();
    register(&app, &email).await;

    let body = serde_json::json!({
        "email": email,
        "password": "not-the-right-password",
        "device_name": "attacker",
    });
    let (status, _) = request_json(&app, "POST", "/api/v1/auth/login", Some(body)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn salt_lookup_does_not_reveal_whether_email_exists() {
    let app = common::test_router().await;
    let email = unique_email();
    register(&app, &email).await;

    let (status_known, known) =
        request_json(&app, "GET", &format!("/api/v1/auth/salt?email={email}"), None).await;
    let (status_unknown, unknown) =
        request_json(&app, "GET", &format!("/api/v1/auth/salt?email={}", unique_email()), None).await;

    assert_eq!(status_known, StatusCode::OK);
    assert_eq!(status_unknown, StatusCode::OK);
    assert!(!known["salt"].as_str().unwrap().is_empty());
    assert!(!unknown["salt"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn revoking_the_current_device_is_rejected() {
    let app = common::test_router().await;
    let session = register(&app, &unique_email()).await;

    let (status, _) = request_json_auth(
        &app,
        "DELETE",
        &format!("/api/v1/devices/{}", session.device_id),
        &session.access_token,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn revoking_another_device_invalidates_its_session() {
    let app = common::test_router().await;
    let email = unique_email();
    let first = register(&app, &email).await;

    let login_body = serde_json::json!({
        "email": email,
        "password": "correct-horse-battery-staple",
        "device_name": "second-device",
    });
    let (_, login) = request_json(&app, "POST", "/api/v1/auth/login", Some(login_body)).await;
    let second_device_id = login["device_id"].as_str().unwrap();

    let (status, _) = request_json_auth(
        &app,
        "DELETE",
        &format!("/api/v1/devices/{second_device_id}"),
        &first.access_token,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, devices) = request_json_auth(&app, "GET", "/api/v1/devices", &first.access_token, None).await;
    assert_eq!(status, StatusCode::OK);
    let revoked = devices.as_array().unwrap().iter().find(|d| d["id"] == second_device_id).unwrap();
    assert!(!revoked["revoked_at"].is_null());
}

#[tokio::test]
async fn profile_and_usage_reflect_a_fresh_account() {
    let app = common::test_router().await;
    let session = register(&app, &unique_email()).await;

    let (status, profile) = request_json_auth(&app, "GET", "/api/v1/account", &session.access_token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["subscription_tier"], "free");

    let (status, usage) = request_json_auth(&app, "GET", "/api/v1/account/usage", &session.access_token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(usage["storage_used_bytes"], 0);
}

#[tokio::test]
async fn logout_does_not_revoke_the_access_token_itself() {
    // Spec §4.5: logout revokes the refresh session; the already-issued
    // access token remains valid until its own expiry (stateless JWT).
    let app = common::test_router().await;
    let session = register(&app, &unique_email()).await;

    let (status, _) =
        request_json_auth(&app, "POST", "/api/v1/auth/logout", &session.access_token, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = request_json_auth(&app, "GET", "/api/v1/account", &session.access_token, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn missing_bearer_token_is_unauthorized() {
    let app = common::test_router().await;
    let (status, _) = request_json(&app, "GET", "/api/v1/account", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

mod common;

use axum::http::StatusCode;

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let app = common::test_router().await;
    let (status, body) = common::request_json(&app, "GET", "/api/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

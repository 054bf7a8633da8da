//! Integration tests for health check and general API functionality.

use axum::http::StatusCode;

use super::common::{get, get_text, test_app};

#[tokio::test]
async fn test_health_check() {
    let (app, _state, _captured) = test_app();

    let (status, response) = get(app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["status"], "healthy");
    assert_eq!(response["service"], "paylog");
}

#[tokio::test]
async fn test_index_is_plain_text() {
    let (app, _state, _captured) = test_app();

    let (status, body) = get_text(app, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "Paylog service is running");
}

#[tokio::test]
async fn test_health_check_is_not_traced() {
    let (app, state, captured) = test_app();

    let _ = get(app, "/health").await;
    super::common::flush(&state).await;

    assert!(captured.spans.spans().is_empty());
    assert!(captured.logs.logs().is_empty());
}

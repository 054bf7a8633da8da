//! Common test utilities and helpers for integration tests.
//!
//! This module provides shared functionality used across all integration tests,
//! including test app setup and HTTP request helpers.

use api::{create_router, AppState, CapturedTelemetry};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use std::time::Duration;

/// Creates a test router whose telemetry is captured in memory.
///
/// # Returns
///
/// A tuple containing the configured router, the app state, and the
/// in-memory sinks.
pub fn test_app() -> (Router, AppState, CapturedTelemetry) {
    let (state, captured) = AppState::with_in_memory_sinks();
    let router = create_router(state.clone());
    (router, state, captured)
}

/// Flushes every sink so captured telemetry can be inspected.
pub async fn flush(state: &AppState) {
    assert!(
        state
            .telemetry()
            .registry()
            .force_flush(Duration::from_secs(5))
            .await,
        "telemetry flush timed out"
    );
}

/// Helper to make a GET request and parse a JSON response.
///
/// # Arguments
///
/// * `app` - The Axum router to send the request to
/// * `uri` - The URI path to GET from
///
/// # Returns
///
/// A tuple containing the response status code and parsed JSON response body.
pub async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    let (status, text) = get_text(app, uri).await;
    let json: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
    (status, json)
}

/// Helper to make a GET request and return the raw body.
pub async fn get_text(app: Router, uri: &str) -> (StatusCode, String) {
    let response = tower::ServiceExt::oneshot(
        app,
        Request::builder()
            .method("GET")
            .uri(uri)
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap();

    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8_lossy(&body_bytes).to_string())
}

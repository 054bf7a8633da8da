//! Integration tests for metric export and the scrape endpoint.

use axum::http::StatusCode;

use super::common::{flush, get, get_text, test_app};

#[tokio::test]
async fn test_scrape_counts_outcomes() {
    let (app, _state, _captured) = test_app();

    let _ = get(app.clone(), "/paymentlog").await;
    let _ = get(app.clone(), "/paymentlog").await;
    let _ = get(app.clone(), "/error").await;
    let (status, text) = get_text(app, "/metrics").await;

    assert_eq!(status, StatusCode::OK);
    assert!(text.contains("# TYPE paylog_operations_total counter"));
    assert!(text.contains("paylog_operations_total{outcome=\"success\"} 2"));
    assert!(text.contains("paylog_operations_total{outcome=\"failure\"} 1"));
    assert!(text.contains("# TYPE paylog_operation_duration_seconds histogram"));
    assert!(text.contains("paylog_operation_duration_seconds_bucket{le=\"+Inf\"} 3"));
    assert!(text.contains("paylog_operation_duration_seconds_count 3"));
}

#[tokio::test]
async fn test_push_sinks_receive_deltas() {
    let (app, state, captured) = test_app();

    let _ = get(app.clone(), "/paymentlog").await;
    let _ = get(app, "/paymentlog").await;
    flush(&state).await;

    let counters: Vec<_> = captured
        .metrics
        .metrics()
        .into_iter()
        .filter(|p| p.name == "paylog_operations_total")
        .collect();
    assert_eq!(counters.len(), 2);
    assert!(counters.iter().all(|p| p.value == 1.0));
}

//! End-to-end tests of the instrumented payment log operation.
//!
//! Tests cover:
//! - Span tree of one invocation
//! - Log correlation
//! - Distinct traces per invocation
//! - The demo error route

use axum::http::StatusCode;
use telemetry::models::{Span, SpanStatus, Trace};

use super::common::{flush, get, test_app};

#[tokio::test]
async fn test_one_root_two_children_one_correlated_log() {
    let (app, state, captured) = test_app();

    let (status, payment) = get(app, "/paymentlog").await;
    flush(&state).await;

    assert_eq!(status, StatusCode::OK);
    let spans = captured.spans.spans();
    assert_eq!(spans.len(), 3);

    assert!(spans.iter().all(|s| s.validate_span().is_ok()));

    let trace = Trace::from_spans(spans.iter().map(|s| Span::clone(s))).unwrap();
    assert_eq!(trace.span_count(), 3);
    let root = trace.root_span().unwrap();

    let mut children: Vec<&str> = trace
        .children_of(root.span_id)
        .into_iter()
        .map(|s| s.name.as_str())
        .collect();
    children.sort_unstable();
    assert_eq!(children, ["GeneratingPayload", "Logging"]);
    assert!(trace.duration().is_some());

    let logs = captured.logs.logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].trace_id, Some(root.trace_id));
    let body = logs[0].body.as_ref().unwrap();
    assert_eq!(body["TrackingId"], payment["TrackingId"]);
}

#[tokio::test]
async fn test_payload_fields() {
    let (app, _state, _captured) = test_app();

    let (_, payment) = get(app, "/paymentlog").await;

    assert_eq!(payment["ShopLegacyId"], "7777");
    assert_eq!(payment["ShopName"], "PayRetailers Demo Shop");
    assert_eq!(payment["Country"], "AR");
    assert_eq!(payment["Currency"], "ARS");
    assert!(payment["Amount"].as_f64().is_some_and(|a| a > 0.0));
    assert!(payment["PaymentMethod"].is_string());
    assert!(payment["Status"].is_string());
    assert!(payment["CreatedAt"].is_string());
    assert!(uuid::Uuid::parse_str(payment["TrackingId"].as_str().unwrap()).is_ok());
}

#[tokio::test]
async fn test_two_invocations_are_independent() {
    let (app, state, captured) = test_app();

    let (_, first) = get(app.clone(), "/paymentlog").await;
    let (_, second) = get(app, "/paymentlog").await;
    flush(&state).await;

    assert_ne!(first["TrackingId"], second["TrackingId"]);
    for field in ["ShopName", "Country", "Currency", "ShopLegacyId"] {
        assert_eq!(first[field], second[field]);
    }

    let spans = captured.spans.spans();
    let roots: Vec<_> = spans.iter().filter(|s| s.is_root()).collect();
    assert_eq!(roots.len(), 2);
    assert_ne!(roots[0].trace_id, roots[1].trace_id);

    let logs = captured.logs.logs();
    assert_eq!(logs.len(), 2);
    assert_ne!(logs[0].trace_id, logs[1].trace_id);
}

#[tokio::test]
async fn test_concurrent_invocations_keep_separate_contexts() {
    let (app, state, captured) = test_app();

    let requests: Vec<_> = (0..8)
        .map(|_| {
            let app = app.clone();
            tokio::spawn(async move { get(app, "/paymentlog").await })
        })
        .collect();
    for request in requests {
        let (status, _) = request.await.unwrap();
        assert_eq!(status, StatusCode::OK);
    }
    flush(&state).await;

    let spans = captured.spans.spans();
    let logs = captured.logs.logs();
    assert_eq!(spans.len(), 24);
    assert_eq!(logs.len(), 8);
    for log in &logs {
        let logging = spans
            .iter()
            .find(|s| Some(s.span_id) == log.span_id)
            .unwrap();
        assert_eq!(logging.name, "Logging");
        assert_eq!(Some(logging.trace_id), log.trace_id);
    }
}

#[tokio::test]
async fn test_error_route_records_failure() {
    let (app, state, captured) = test_app();

    let (status, body) = get(app, "/error").await;
    flush(&state).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "generation_failed");

    let spans = captured.spans.spans();
    let root = spans.iter().find(|s| s.is_root()).unwrap();
    assert_eq!(root.status, SpanStatus::Error);
    assert!(root.event("exception").is_some());
    assert_eq!(root.tags.get("error"), Some(&serde_json::json!(true)));
    assert!(captured.logs.logs().is_empty());
}

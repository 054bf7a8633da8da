//! Integration tests for sink isolation.
//!
//! A sink that cannot reach its endpoint must not delay the request or
//! starve the other sinks of the same signal.

use std::sync::Arc;
use std::time::{Duration, Instant};

use api::{create_router, AppState, ShopSettings};
use axum::http::StatusCode;
use telemetry::config::ExportSettings;
use telemetry::export::{ExporterRegistry, HttpSink, InMemorySink, SignalType};
use telemetry::models::LogLevel;
use telemetry::sampler::{AlwaysOff, Sampler};
use telemetry::{ResourceDescriptor, Telemetry};

use super::common::{flush, get};

fn app_with(sampler: Arc<dyn Sampler>) -> (axum::Router, AppState, InMemorySink, InMemorySink) {
    let resource = ResourceDescriptor::build(
        "paylog",
        None,
        None,
        Some("isolation"),
        std::collections::BTreeMap::new(),
    )
    .unwrap();
    let registry = ExporterRegistry::new(
        resource.clone(),
        ExportSettings {
            export_timeout_ms: 500,
            ..ExportSettings::default()
        },
    );

    let unreachable = |signal: SignalType| {
        HttpSink::new(
            format!("unreachable-{signal}"),
            format!("http://127.0.0.1:9/v1/{signal}"),
            Duration::from_millis(500),
        )
        .unwrap()
    };
    let spans = InMemorySink::new("spans");
    let logs = InMemorySink::new("logs");
    registry.register_sink(SignalType::Traces, Arc::new(unreachable(SignalType::Traces)));
    registry.register_sink(SignalType::Traces, Arc::new(spans.clone()));
    registry.register_sink(SignalType::Logs, Arc::new(unreachable(SignalType::Logs)));
    registry.register_sink(SignalType::Logs, Arc::new(logs.clone()));

    let telemetry = Telemetry::from_parts(resource, sampler, registry, LogLevel::Info);
    let state = AppState::new(telemetry, ShopSettings::default());
    (create_router(state.clone()), state, spans, logs)
}

#[tokio::test]
async fn test_unreachable_sink_does_not_affect_healthy_sink() {
    let (app, state, spans, logs) = app_with(Arc::new(telemetry::sampler::AlwaysOn));

    let started = Instant::now();
    let (status, _) = get(app, "/paymentlog").await;
    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(status, StatusCode::OK);

    flush(&state).await;

    assert_eq!(spans.spans().len(), 3);
    assert_eq!(logs.logs().len(), 1);

    let stats = state.telemetry().registry().sink_stats();
    let failing = stats
        .iter()
        .filter(|s| s.name.starts_with("unreachable"))
        .collect::<Vec<_>>();
    assert_eq!(failing.len(), 2);
    assert!(failing.iter().all(|s| s.failed_batches >= 1 && s.exported == 0));
}

#[tokio::test]
async fn test_declined_sampling_exports_no_spans_but_logs_stay_correlated() {
    let (app, state, spans, logs) = app_with(Arc::new(AlwaysOff));

    let (status, payment) = get(app, "/paymentlog").await;
    flush(&state).await;

    assert_eq!(status, StatusCode::OK);
    assert!(payment["TrackingId"].is_string());
    assert!(spans.spans().is_empty());
    let logs = logs.logs();
    assert_eq!(logs.len(), 1);
    assert!(logs[0].is_correlated());
}

#[tokio::test]
async fn test_shutdown_is_bounded() {
    let (app, state, _spans, _logs) = app_with(Arc::new(telemetry::sampler::AlwaysOn));
    let _ = get(app, "/paymentlog").await;

    let started = Instant::now();
    let _ = state
        .telemetry()
        .registry()
        .shutdown(Duration::from_secs(2))
        .await;
    assert!(started.elapsed() < Duration::from_secs(3));
}

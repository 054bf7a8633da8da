//! Prometheus scrape endpoint.

use crate::state::AppState;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use telemetry::export::{render_prometheus, SignalType, PROMETHEUS_CONTENT_TYPE};

/// Creates the scrape route.
pub fn metrics_routes(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(scrape_metrics))
        .with_state(state)
}

/// Renders the aggregated metrics, or 404 when scraping is disabled.
async fn scrape_metrics(State(state): State<AppState>) -> Response {
    match state.telemetry().registry().scrape(SignalType::Metrics) {
        Some(snapshot) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
            render_prometheus(&snapshot),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "Metrics scraping is disabled").into_response(),
    }
}

//! Application state module.
//!
//! Defines the shared application state that is passed to route handlers.

use crate::config::ShopSettings;
use crate::operation::ReportOperation;
use crate::payment::SyntheticPayments;
use std::collections::BTreeMap;
use std::sync::Arc;
use telemetry::config::ExportSettings;
use telemetry::export::{ExporterRegistry, InMemorySink, SignalType};
use telemetry::models::LogLevel;
use telemetry::resource::{SERVICE_INSTANCE_ID, SERVICE_NAME};
use telemetry::sampler::AlwaysOn;
use telemetry::{ResourceDescriptor, Telemetry};

/// In-memory sinks installed by [`AppState::with_in_memory_sinks`].
#[derive(Debug, Clone)]
pub struct CapturedTelemetry {
    /// Receives every finished span.
    pub spans: InMemorySink,
    /// Receives every log record.
    pub logs: InMemorySink,
    /// Receives every metric delta.
    pub metrics: InMemorySink,
}

/// Application state shared across all request handlers.
///
/// Holds the telemetry stack and the instrumented operation. Cloning is
/// cheap; clones share everything.
#[derive(Clone)]
pub struct AppState {
    /// The telemetry stack.
    telemetry: Telemetry,
    /// The payment log operation.
    operation: Arc<ReportOperation>,
}

impl AppState {
    /// Creates a new application state generating synthetic payments for
    /// `shop`.
    #[must_use]
    pub fn new(telemetry: Telemetry, shop: ShopSettings) -> Self {
        let generator = Arc::new(SyntheticPayments::new(shop));
        Self {
            operation: Arc::new(ReportOperation::new(telemetry.clone(), generator)),
            telemetry,
        }
    }

    /// Creates a state that samples every trace and captures all telemetry
    /// in memory, with scraping enabled.
    ///
    /// This is useful for development and testing. Must be called from
    /// within a Tokio runtime.
    #[must_use]
    pub fn with_in_memory_sinks() -> (Self, CapturedTelemetry) {
        let resource = ResourceDescriptor::from(BTreeMap::from([
            (SERVICE_NAME.to_string(), "paylog".to_string()),
            (SERVICE_INSTANCE_ID.to_string(), uuid::Uuid::new_v4().to_string()),
        ]));
        let registry = ExporterRegistry::new(resource.clone(), ExportSettings::default());
        registry.enable_scrape();

        let captured = CapturedTelemetry {
            spans: InMemorySink::new("memory-traces"),
            logs: InMemorySink::new("memory-logs"),
            metrics: InMemorySink::new("memory-metrics"),
        };
        registry.register_sink(SignalType::Traces, Arc::new(captured.spans.clone()));
        registry.register_sink(SignalType::Logs, Arc::new(captured.logs.clone()));
        registry.register_sink(SignalType::Metrics, Arc::new(captured.metrics.clone()));

        let telemetry = Telemetry::from_parts(resource, Arc::new(AlwaysOn), registry, LogLevel::Info);
        (Self::new(telemetry, ShopSettings::default()), captured)
    }

    /// Returns the telemetry stack.
    #[must_use]
    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    /// Returns the payment log operation.
    #[must_use]
    pub fn operation(&self) -> &ReportOperation {
        self.operation.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use telemetry::config::TelemetryConfig;

    #[tokio::test]
    async fn test_app_state_is_clone() {
        let telemetry = Telemetry::init(&TelemetryConfig::default()).unwrap();
        let state = AppState::new(telemetry, ShopSettings::default());
        let state2 = state.clone();

        assert!(Arc::ptr_eq(&state.operation, &state2.operation));
        assert_eq!(state2.telemetry().resource().service_name(), "paylog");
    }

    #[tokio::test]
    async fn test_with_in_memory_sinks() {
        let (state, captured) = AppState::with_in_memory_sinks();

        state.operation().handle().unwrap();
        assert!(state
            .telemetry()
            .registry()
            .force_flush(std::time::Duration::from_secs(2))
            .await);

        assert_eq!(captured.spans.spans().len(), 3);
        assert_eq!(captured.logs.logs().len(), 1);
        assert_eq!(captured.metrics.metrics().len(), 2);
    }
}

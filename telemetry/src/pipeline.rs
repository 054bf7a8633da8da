//! One-call initialization of the whole telemetry stack.

use crate::config::TelemetryConfig;
use crate::error::TelemetryError;
use crate::export::{ExporterRegistry, SignalType};
use crate::logger::StructuredLogger;
use crate::models::LogLevel;
use crate::resource::ResourceDescriptor;
use crate::sampler::Sampler;
use crate::tracer::Tracer;
use std::sync::Arc;

/// The resource, registry, tracer, and logger of one process.
///
/// Cloning is cheap; clones share everything.
#[derive(Debug, Clone)]
pub struct Telemetry {
    resource: ResourceDescriptor,
    registry: ExporterRegistry,
    tracer: Tracer,
    logger: StructuredLogger,
}

impl Telemetry {
    /// Validates `config`, builds the resource, and registers every sink.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the configuration is invalid.
    pub fn init(config: &TelemetryConfig) -> Result<Self, TelemetryError> {
        config.validate_config()?;

        let resource = ResourceDescriptor::from_settings(&config.resource)?;
        let registry = ExporterRegistry::new(resource.clone(), config.export.clone());
        for (signal, sink) in config.sinks() {
            registry.register(signal, &sink)?;
        }

        let telemetry = Self::from_parts(
            resource,
            config.sampler.build(),
            registry,
            config.log_level,
        );

        tracing::info!(
            service = %telemetry.resource.service_name(),
            trace_sinks = telemetry.registry.sink_count_for(SignalType::Traces),
            metric_sinks = telemetry.registry.sink_count_for(SignalType::Metrics),
            log_sinks = telemetry.registry.sink_count_for(SignalType::Logs),
            scrape = telemetry.registry.scrape_enabled(),
            "Telemetry initialized"
        );

        Ok(telemetry)
    }

    /// Assembles a stack from prebuilt parts. Sinks are registered on
    /// `registry` by the caller.
    #[must_use]
    pub fn from_parts(
        resource: ResourceDescriptor,
        sampler: Arc<dyn Sampler>,
        registry: ExporterRegistry,
        min_level: LogLevel,
    ) -> Self {
        let tracer = Tracer::new(resource.clone(), sampler, registry.clone());
        let logger =
            StructuredLogger::new(resource.clone(), registry.clone()).with_min_level(min_level);
        Self {
            resource,
            registry,
            tracer,
            logger,
        }
    }

    /// Returns the resource.
    #[must_use]
    pub fn resource(&self) -> &ResourceDescriptor {
        &self.resource
    }

    /// Returns the exporter registry.
    #[must_use]
    pub fn registry(&self) -> &ExporterRegistry {
        &self.registry
    }

    /// Returns the tracer.
    #[must_use]
    pub fn tracer(&self) -> &Tracer {
        &self.tracer
    }

    /// Returns the structured logger.
    #[must_use]
    pub fn logger(&self) -> &StructuredLogger {
        &self.logger
    }

    /// Flushes and shuts down every sink, bounded by the configured
    /// shutdown timeout.
    ///
    /// Returns false if some sink did not finish in time.
    pub async fn shutdown(&self) -> bool {
        let timeout = self.registry.settings().shutdown_timeout();
        let clean = self.registry.shutdown(timeout).await;
        tracing::info!(clean, "Telemetry shut down");
        clean
    }
}

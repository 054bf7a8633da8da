//! Export tuning and the complete telemetry configuration.

use super::sink::{SinkConfig, TransportProtocol};
use crate::error::TelemetryError;
use crate::export::SignalType;
use crate::models::LogLevel;
use crate::resource::{
    parse_resource_attributes, ResourceSettings, DEPLOYMENT_ENVIRONMENT, SERVICE_INSTANCE_ID,
    SERVICE_NAME, SERVICE_NAMESPACE, SERVICE_VERSION,
};
use crate::sampler::SamplerMode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Batching and timing of push export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ExportSettings {
    /// Maximum delay between two exports of a sink's queue.
    #[validate(range(min = 1, message = "Export interval must be at least 1ms"))]
    pub scheduled_delay_ms: u64,
    /// Maximum duration of one export call.
    #[validate(range(min = 1, message = "Export timeout must be at least 1ms"))]
    pub export_timeout_ms: u64,
    /// Upper bound of the final flush on shutdown.
    #[validate(range(min = 1, message = "Shutdown timeout must be at least 1ms"))]
    pub shutdown_timeout_ms: u64,
    /// Items a sink's queue holds before new items are dropped.
    #[validate(range(min = 1, message = "Queue capacity must be at least 1"))]
    pub queue_capacity: usize,
    /// Maximum items per exported batch.
    #[validate(range(min = 1, message = "Batch size must be at least 1"))]
    pub max_batch_size: usize,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            scheduled_delay_ms: 1000,
            export_timeout_ms: 5000,
            shutdown_timeout_ms: 5000,
            queue_capacity: 2048,
            max_batch_size: 512,
        }
    }
}

impl ExportSettings {
    /// Returns the scheduled delay. Never zero.
    #[must_use]
    pub fn scheduled_delay(&self) -> Duration {
        Duration::from_millis(self.scheduled_delay_ms.max(1))
    }

    /// Returns the export timeout.
    #[must_use]
    pub fn export_timeout(&self) -> Duration {
        Duration::from_millis(self.export_timeout_ms)
    }

    /// Returns the shutdown timeout.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Validates the settings.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if any value is zero.
    pub fn validate_settings(&self) -> Result<(), TelemetryError> {
        self.validate()?;
        Ok(())
    }
}

/// Everything needed to initialize telemetry, built once at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Service identity.
    pub resource: ResourceSettings,
    /// Trace sampling policy.
    pub sampler: SamplerMode,
    /// Push sinks for spans.
    pub trace_sinks: Vec<SinkConfig>,
    /// Push sinks for metric deltas.
    pub metric_sinks: Vec<SinkConfig>,
    /// Push sinks for log records.
    pub log_sinks: Vec<SinkConfig>,
    /// Whether aggregated metrics can be scraped.
    pub enable_scrape: bool,
    /// Minimum level of structured log records.
    pub log_level: LogLevel,
    /// Batching and timing.
    pub export: ExportSettings,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            resource: ResourceSettings::default(),
            sampler: SamplerMode::default(),
            trace_sinks: Vec::new(),
            metric_sinks: Vec::new(),
            log_sinks: Vec::new(),
            enable_scrape: true,
            log_level: LogLevel::Info,
            export: ExportSettings::default(),
        }
    }
}

impl TelemetryConfig {
    /// Reads the configuration from the process environment.
    ///
    /// Recognized variables:
    /// - `OTEL_SERVICE_NAME`, `OTEL_SERVICE_NAMESPACE`, `OTEL_SERVICE_VERSION`,
    ///   `OTEL_SERVICE_INSTANCE_ID`, `OTEL_DEPLOYMENT_ENVIRONMENT`,
    ///   `OTEL_RESOURCE_ATTRIBUTES`
    /// - `OTEL_TRACES_SAMPLER`, `OTEL_TRACES_SAMPLER_ARG`
    /// - `OTEL_EXPORTER_OTLP_ENDPOINT` and the per-signal
    ///   `OTEL_EXPORTER_OTLP_{TRACES,METRICS,LOGS}_ENDPOINT`,
    ///   `OTEL_EXPORTER_OTLP_PROTOCOL` (default `http/json`)
    /// - `PAYLOG_CONSOLE_EXPORT`, `PAYLOG_LOG_SINK_ADDR`,
    ///   `PAYLOG_ENABLE_SCRAPE` (default true), `PAYLOG_LOG_LEVEL`
    /// - `PAYLOG_EXPORT_INTERVAL_MS`, `PAYLOG_EXPORT_TIMEOUT_MS`,
    ///   `PAYLOG_SHUTDOWN_TIMEOUT_MS`, `PAYLOG_QUEUE_CAPACITY`,
    ///   `PAYLOG_MAX_BATCH_SIZE`
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if a variable is set to an unparsable value.
    pub fn from_env() -> Result<Self, TelemetryError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name
    /// to its value. Empty values count as unset.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if a variable is set to an unparsable value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, TelemetryError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let mut extra = get("OTEL_RESOURCE_ATTRIBUTES")
            .map(|raw| parse_resource_attributes(&raw))
            .transpose()?
            .unwrap_or_default();
        let mut pick = |env: &str, attribute: &str| {
            let from_attributes = extra.remove(attribute);
            get(env).or(from_attributes)
        };
        let resource = ResourceSettings {
            service_name: pick("OTEL_SERVICE_NAME", SERVICE_NAME)
                .unwrap_or(defaults.resource.service_name),
            namespace: pick("OTEL_SERVICE_NAMESPACE", SERVICE_NAMESPACE),
            version: pick("OTEL_SERVICE_VERSION", SERVICE_VERSION),
            instance_id: pick("OTEL_SERVICE_INSTANCE_ID", SERVICE_INSTANCE_ID),
            environment: pick("OTEL_DEPLOYMENT_ENVIRONMENT", DEPLOYMENT_ENVIRONMENT)
                .unwrap_or(defaults.resource.environment),
            extra,
        };

        let sampler = match get("OTEL_TRACES_SAMPLER") {
            Some(name) => SamplerMode::parse(&name, get("OTEL_TRACES_SAMPLER_ARG").as_deref())?,
            None => defaults.sampler,
        };

        let protocol = match get("OTEL_EXPORTER_OTLP_PROTOCOL") {
            Some(raw) => raw.parse::<TransportProtocol>()?,
            None => TransportProtocol::HttpJson,
        };
        if !matches!(
            protocol,
            TransportProtocol::HttpJson | TransportProtocol::HttpProtobuf
        ) {
            return Err(TelemetryError::invalid_config(format!(
                "OTEL_EXPORTER_OTLP_PROTOCOL must be http/json or http/protobuf, got {protocol}"
            )));
        }

        let base = get("OTEL_EXPORTER_OTLP_ENDPOINT");
        let endpoint_for = |signal: SignalType| {
            let key = format!("OTEL_EXPORTER_OTLP_{}_ENDPOINT", signal.to_string().to_uppercase());
            get(&key).or_else(|| {
                base.as_deref()
                    .map(|b| format!("{}/v1/{signal}", b.trim_end_matches('/')))
            })
        };

        let console = parse_bool(get("PAYLOG_CONSOLE_EXPORT"), "PAYLOG_CONSOLE_EXPORT", false)?;
        let sinks_for = |signal: SignalType| {
            let mut sinks = Vec::new();
            if let Some(endpoint) = endpoint_for(signal) {
                sinks.push(SinkConfig {
                    protocol,
                    ..SinkConfig::http_json(signal, endpoint)
                });
            }
            if console {
                sinks.push(SinkConfig::console(signal));
            }
            sinks
        };
        let trace_sinks = sinks_for(SignalType::Traces);
        let metric_sinks = sinks_for(SignalType::Metrics);
        let mut log_sinks = sinks_for(SignalType::Logs);
        if let Some(addr) = get("PAYLOG_LOG_SINK_ADDR") {
            log_sinks.push(SinkConfig::tcp(SignalType::Logs, addr));
        }

        let enable_scrape = parse_bool(
            get("PAYLOG_ENABLE_SCRAPE"),
            "PAYLOG_ENABLE_SCRAPE",
            defaults.enable_scrape,
        )?;

        let log_level = get("PAYLOG_LOG_LEVEL")
            .map(|raw| raw.parse::<LogLevel>())
            .transpose()
            .map_err(|e| TelemetryError::invalid_config(format!("PAYLOG_LOG_LEVEL: {e}")))?
            .unwrap_or(defaults.log_level);

        let export = ExportSettings {
            scheduled_delay_ms: parse_number(
                get("PAYLOG_EXPORT_INTERVAL_MS"),
                "PAYLOG_EXPORT_INTERVAL_MS",
                defaults.export.scheduled_delay_ms,
            )?,
            export_timeout_ms: parse_number(
                get("PAYLOG_EXPORT_TIMEOUT_MS"),
                "PAYLOG_EXPORT_TIMEOUT_MS",
                defaults.export.export_timeout_ms,
            )?,
            shutdown_timeout_ms: parse_number(
                get("PAYLOG_SHUTDOWN_TIMEOUT_MS"),
                "PAYLOG_SHUTDOWN_TIMEOUT_MS",
                defaults.export.shutdown_timeout_ms,
            )?,
            queue_capacity: parse_number(
                get("PAYLOG_QUEUE_CAPACITY"),
                "PAYLOG_QUEUE_CAPACITY",
                defaults.export.queue_capacity,
            )?,
            max_batch_size: parse_number(
                get("PAYLOG_MAX_BATCH_SIZE"),
                "PAYLOG_MAX_BATCH_SIZE",
                defaults.export.max_batch_size,
            )?,
        };

        Ok(Self {
            resource,
            sampler,
            trace_sinks,
            metric_sinks,
            log_sinks,
            enable_scrape,
            log_level,
            export,
        })
    }

    /// Returns every sink with its signal, including the scrape sink when
    /// enabled.
    #[must_use]
    pub fn sinks(&self) -> Vec<(SignalType, SinkConfig)> {
        let mut sinks: Vec<(SignalType, SinkConfig)> = self
            .trace_sinks
            .iter()
            .map(|s| (SignalType::Traces, s.clone()))
            .chain(self.metric_sinks.iter().map(|s| (SignalType::Metrics, s.clone())))
            .chain(self.log_sinks.iter().map(|s| (SignalType::Logs, s.clone())))
            .collect();
        if self.enable_scrape {
            sinks.push((SignalType::Metrics, SinkConfig::scrape()));
        }
        sinks
    }

    /// Validates the whole configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for invalid resource or export settings, or
    /// for any sink that is invalid or listed under the wrong signal.
    pub fn validate_config(&self) -> Result<(), TelemetryError> {
        self.resource.validate()?;
        self.export.validate_settings()?;
        for (signal, sink) in self.sinks() {
            if sink.signal != signal {
                return Err(TelemetryError::invalid_config(format!(
                    "{} sink listed under {signal}",
                    sink.signal
                )));
            }
            sink.validate_sink()?;
        }
        Ok(())
    }
}

fn parse_bool(raw: Option<String>, key: &str, default: bool) -> Result<bool, TelemetryError> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(TelemetryError::invalid_config(format!(
            "{key} must be a boolean, got {raw:?}"
        ))),
    }
}

fn parse_number<T: std::str::FromStr>(
    raw: Option<String>,
    key: &str,
    default: T,
) -> Result<T, TelemetryError> {
    raw.map_or(Ok(default), |raw| {
        raw.parse::<T>().map_err(|_| {
            TelemetryError::invalid_config(format!("{key} must be a non-negative integer, got {raw:?}"))
        })
    })
}

//! Exporter registry and sinks.
//!
//! Producers (the tracer, the structured logger, instrumentation code
//! recording metrics) hand finished items to the [`ExporterRegistry`], which
//! fans each item out to every sink registered for its signal. Every push
//! sink has its own bounded queue and background worker, so a slow or
//! failing sink never delays another sink or the producer.
//!
//! # Sinks
//!
//! - [`ConsoleSink`] - JSON lines on stdout
//! - [`HttpSink`] - OTLP/HTTP requests (JSON or protobuf) POSTed to a collector
//! - [`TcpLineSink`] - newline-delimited JSON over TCP (log shippers)
//! - [`InMemorySink`] - keeps everything in memory for inspection
//!
//! The pull path is served by [`MetricAggregator`], rendered for scrapers
//! by [`render_prometheus`].

pub mod aggregate;
pub mod console;
pub mod http;
pub mod memory;
pub mod otlp;
pub mod prometheus;
pub mod registry;
pub mod tcp;
mod worker;

pub use aggregate::{MetricAggregator, MetricSnapshot, SeriesSnapshot, SeriesValue};
pub use console::ConsoleSink;
pub use http::HttpSink;
pub use memory::InMemorySink;
pub use otlp::{OtlpEncoding, OtlpRequest};
pub use prometheus::{render_prometheus, PROMETHEUS_CONTENT_TYPE};
pub use registry::ExporterRegistry;
pub use tcp::TcpLineSink;
pub use worker::SinkStats;

use crate::error::ExportError;
use crate::models::{LogRecord, MetricPoint, Span};
use crate::resource::ResourceDescriptor;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The telemetry signals a sink can receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalType {
    /// Finished spans.
    Traces,
    /// Metric points.
    Metrics,
    /// Log records.
    Logs,
}

impl SignalType {
    /// All signal types, in a stable order.
    pub const ALL: [Self; 3] = [Self::Traces, Self::Metrics, Self::Logs];
}

impl std::fmt::Display for SignalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Traces => write!(f, "traces"),
            Self::Metrics => write!(f, "metrics"),
            Self::Logs => write!(f, "logs"),
        }
    }
}

/// A single immutable item on its way to the sinks.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ExportItem {
    /// A finished span.
    Span(Arc<Span>),
    /// An emitted log record.
    Log(Arc<LogRecord>),
    /// A metric point.
    Metric(Arc<MetricPoint>),
}

impl ExportItem {
    /// Returns the signal this item belongs to.
    #[must_use]
    pub fn signal(&self) -> SignalType {
        match self {
            Self::Span(_) => SignalType::Traces,
            Self::Log(_) => SignalType::Logs,
            Self::Metric(_) => SignalType::Metrics,
        }
    }
}

/// A batch of items of one signal, delivered to a sink in one call.
#[derive(Debug, Clone, Serialize)]
pub struct ExportBatch {
    /// The signal of every item in the batch.
    pub signal: SignalType,
    /// Identity of the emitting process.
    pub resource: ResourceDescriptor,
    /// The items, in production order.
    pub items: Vec<ExportItem>,
}

impl ExportBatch {
    /// Returns the number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if the batch has no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterates over the spans in the batch.
    pub fn spans(&self) -> impl Iterator<Item = &Span> {
        self.items.iter().filter_map(|item| match item {
            ExportItem::Span(span) => Some(span.as_ref()),
            _ => None,
        })
    }

    /// Iterates over the log records in the batch.
    pub fn logs(&self) -> impl Iterator<Item = &LogRecord> {
        self.items.iter().filter_map(|item| match item {
            ExportItem::Log(record) => Some(record.as_ref()),
            _ => None,
        })
    }

    /// Iterates over the metric points in the batch.
    pub fn metrics(&self) -> impl Iterator<Item = &MetricPoint> {
        self.items.iter().filter_map(|item| match item {
            ExportItem::Metric(point) => Some(point.as_ref()),
            _ => None,
        })
    }
}

/// A destination for exported telemetry.
///
/// Implementations must be thread-safe (Send + Sync). `export` is called
/// from the sink's own worker task, one batch at a time.
#[async_trait]
pub trait Sink: Send + Sync {
    /// A short name used in diagnostics and statistics.
    fn name(&self) -> &str;

    /// Delivers one batch.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch could not be delivered. The error is
    /// logged and counted by the worker; it never reaches the producer.
    async fn export(&self, batch: &ExportBatch) -> Result<(), ExportError>;

    /// Pushes out anything the sink buffers itself. The worker calls this
    /// on every flush, after the queued items have been exported.
    ///
    /// # Errors
    ///
    /// Returns an error if buffered data could not be written.
    async fn flush(&self) -> Result<(), ExportError> {
        Ok(())
    }

    /// Releases resources held by the sink. Called once, after the final
    /// flush.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink could not shut down cleanly.
    async fn shutdown(&self) -> Result<(), ExportError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{SpanId, TraceId};
    use crate::models::LogLevel;
    use std::collections::BTreeMap;

    #[test]
    fn test_signal_type_display() {
        assert_eq!(SignalType::Traces.to_string(), "traces");
        assert_eq!(SignalType::Metrics.to_string(), "metrics");
        assert_eq!(SignalType::Logs.to_string(), "logs");
    }

    #[test]
    fn test_batch_accessors_filter_by_kind() {
        let resource =
            ResourceDescriptor::build("paylog", None, None, Some("i"), BTreeMap::new()).unwrap();
        let span = Span::new(TraceId::random(), SpanId::random(), "op", "paylog");
        let record = LogRecord::new(LogLevel::Info, "hello", resource.clone());

        let batch = ExportBatch {
            signal: SignalType::Traces,
            resource,
            items: vec![
                ExportItem::Span(Arc::new(span)),
                ExportItem::Log(Arc::new(record)),
            ],
        };

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.spans().count(), 1);
        assert_eq!(batch.logs().count(), 1);
        assert_eq!(batch.metrics().count(), 0);
    }

    #[test]
    fn test_batch_serializes_items_untagged() {
        let resource =
            ResourceDescriptor::build("paylog", None, None, Some("i"), BTreeMap::new()).unwrap();
        let batch = ExportBatch {
            signal: SignalType::Metrics,
            resource,
            items: vec![ExportItem::Metric(Arc::new(MetricPoint::counter(
                "requests_total",
                1.0,
            )))],
        };

        let json = serde_json::to_value(&batch).unwrap();

        assert_eq!(json["signal"], "metrics");
        assert_eq!(json["resource"]["service.name"], "paylog");
        assert_eq!(json["items"][0]["name"], "requests_total");
    }
}

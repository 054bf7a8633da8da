//! Data models for the telemetry signals.
//!
//! This module contains the records handed to exporters: finished spans,
//! log records, and metric points.

pub mod log;
pub mod metric;
pub mod trace;

pub use log::{LogLevel, LogRecord, ParseLogLevelError};
pub use metric::{HistogramBucket, HistogramData, MetricKind, MetricPoint, MetricValidationError};
pub use trace::{Span, SpanEvent, SpanKind, SpanStatus, SpanValidationError, Trace};

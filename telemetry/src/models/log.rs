//! Log record data model.
//!
//! Defines the `LogRecord` emitted by the structured logger and handed to
//! log sinks.

use crate::ids::{SpanId, TraceId};
use crate::resource::ResourceDescriptor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

/// Log severity level.
///
/// Levels are ordered from least to most severe, so a minimum-level filter
/// can compare them directly.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Detailed debug information.
    Trace,
    /// Debug information.
    Debug,
    /// Informational messages.
    #[default]
    Info,
    /// Warning conditions.
    Warn,
    /// Error conditions.
    Error,
    /// Critical/fatal conditions.
    Fatal,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

/// Error returned for an unknown level name.
#[derive(Debug, Error)]
#[error("unknown log level '{0}'")]
pub struct ParseLogLevelError(String);

impl FromStr for LogLevel {
    type Err = ParseLogLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" | "information" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            "fatal" | "critical" => Ok(Self::Fatal),
            other => Err(ParseLogLevelError(other.to_string())),
        }
    }
}

/// A structured log record.
///
/// `trace_id` and `span_id` are present only when the record was emitted
/// while a span was current for the emitting unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    /// Timestamp when the record was emitted.
    pub timestamp: DateTime<Utc>,

    /// Severity level of the record.
    #[serde(default)]
    pub level: LogLevel,

    /// The log message.
    pub message: String,

    /// Optional structured payload carried by the record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,

    /// Additional key-value attributes.
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,

    /// Trace ID of the span that was current at emission.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<TraceId>,

    /// Span ID of the span that was current at emission.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span_id: Option<SpanId>,

    /// Identity of the emitting process.
    pub resource: ResourceDescriptor,
}

impl LogRecord {
    /// Creates a new uncorrelated record with the current timestamp.
    #[must_use]
    pub fn new(level: LogLevel, message: impl Into<String>, resource: ResourceDescriptor) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            body: None,
            attributes: HashMap::new(),
            trace_id: None,
            span_id: None,
            resource,
        }
    }

    /// Sets the structured payload.
    #[must_use]
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Adds an attribute to the record.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        self.attributes.insert(
            key.into(),
            serde_json::to_value(value).unwrap_or(serde_json::Value::Null),
        );
        self
    }

    /// Stamps the record with trace correlation identifiers.
    #[must_use]
    pub fn with_correlation(mut self, trace_id: TraceId, span_id: SpanId) -> Self {
        self.trace_id = Some(trace_id);
        self.span_id = Some(span_id);
        self
    }

    /// Returns true if the record carries trace correlation.
    #[must_use]
    pub fn is_correlated(&self) -> bool {
        self.trace_id.is_some() && self.span_id.is_some()
    }
}

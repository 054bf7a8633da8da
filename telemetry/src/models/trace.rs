//! Trace and span data models.
//!
//! Defines the finished-span record handed to exporters, plus a `Trace`
//! grouping used when inspecting exported spans.

use crate::ids::{SpanId, TraceId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use validator::Validate;

/// Status code for a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SpanStatus {
    /// No status was set by the instrumentation.
    #[default]
    Unset,
    /// The span completed without error.
    Ok,
    /// The span encountered an error.
    Error,
}

impl std::fmt::Display for SpanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unset => write!(f, "unset"),
            Self::Ok => write!(f, "ok"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Kind of span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SpanKind {
    /// Default span kind (internal operation).
    #[default]
    Internal,
    /// The span represents a server handling a request.
    Server,
    /// The span represents a client making a request.
    Client,
    /// The span represents a producer sending a message.
    Producer,
    /// The span represents a consumer receiving a message.
    Consumer,
}

impl std::fmt::Display for SpanKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Internal => write!(f, "internal"),
            Self::Server => write!(f, "server"),
            Self::Client => write!(f, "client"),
            Self::Producer => write!(f, "producer"),
            Self::Consumer => write!(f, "consumer"),
        }
    }
}

/// An event within a span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanEvent {
    /// The name of the event.
    pub name: String,
    /// Timestamp when the event occurred.
    pub timestamp: DateTime<Utc>,
    /// Additional attributes for the event.
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
}

impl SpanEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            timestamp: Utc::now(),
            attributes: HashMap::new(),
        }
    }

    /// Adds an attribute to the event.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        self.attributes.insert(
            key.into(),
            serde_json::to_value(value).unwrap_or(serde_json::Value::Null),
        );
        self
    }
}

/// A span representing one timed step of a trace.
///
/// While open a span is owned by the tracer; once finished it is shared
/// read-only with every exporter.
///
/// # Example
///
/// ```
/// use telemetry::ids::{SpanId, TraceId};
/// use telemetry::models::{Span, SpanKind};
///
/// let mut span = Span::new(TraceId::random(), SpanId::random(), "GET /paymentlog", "paylog")
///     .with_kind(SpanKind::Server)
///     .with_tag("http.method", "GET");
///
/// assert!(span.finish(chrono::Utc::now()));
/// assert!(span.validate_span().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Span {
    /// Identifier of the trace this span belongs to.
    pub trace_id: TraceId,

    /// Identifier of this span.
    pub span_id: SpanId,

    /// The parent span ID (None for root spans).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<SpanId>,

    /// The name/operation of this span.
    #[validate(length(min = 1, message = "Span name cannot be empty"))]
    pub name: String,

    /// The service that generated this span.
    #[validate(length(min = 1, message = "Service name cannot be empty"))]
    pub service: String,

    /// The kind of span.
    #[serde(default)]
    pub kind: SpanKind,

    /// The status of the span.
    #[serde(default)]
    pub status: SpanStatus,

    /// Timestamp when the span started.
    pub start_time: DateTime<Utc>,

    /// Timestamp when the span ended (None while open).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,

    /// Tags set on the span; the last write for a key wins.
    #[serde(default)]
    pub tags: HashMap<String, serde_json::Value>,

    /// Events that occurred during the span, in insertion order.
    #[serde(default)]
    pub events: Vec<SpanEvent>,
}

/// Errors that can occur during span validation.
#[derive(Debug, Error)]
pub enum SpanValidationError {
    /// The span name is empty.
    #[error("Span name cannot be empty")]
    EmptyName,

    /// The service name is empty.
    #[error("Service name cannot be empty")]
    EmptyService,

    /// The span was never finished.
    #[error("Span has no end time")]
    NotFinished,

    /// The end time is before the start time.
    #[error("End time cannot be before start time")]
    InvalidTimeRange,

    /// Validation failed with details.
    #[error("Validation failed: {0}")]
    ValidationError(#[from] validator::ValidationErrors),
}

impl Span {
    /// Creates a new open span starting now.
    #[must_use]
    pub fn new(
        trace_id: TraceId,
        span_id: SpanId,
        name: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self {
            trace_id,
            span_id,
            parent_span_id: None,
            name: name.into(),
            service: service.into(),
            kind: SpanKind::default(),
            status: SpanStatus::default(),
            start_time: Utc::now(),
            end_time: None,
            tags: HashMap::new(),
            events: Vec::new(),
        }
    }

    /// Sets the parent span ID.
    #[must_use]
    pub fn with_parent(mut self, parent_span_id: SpanId) -> Self {
        self.parent_span_id = Some(parent_span_id);
        self
    }

    /// Sets the span kind.
    #[must_use]
    pub fn with_kind(mut self, kind: SpanKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the start time.
    #[must_use]
    pub fn with_start_time(mut self, start_time: DateTime<Utc>) -> Self {
        self.start_time = start_time;
        self
    }

    /// Adds a tag to the span.
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        self.set_tag(key, value);
        self
    }

    /// Upserts a tag; the last write for a key wins.
    pub fn set_tag(&mut self, key: impl Into<String>, value: impl Serialize) {
        self.tags.insert(
            key.into(),
            serde_json::to_value(value).unwrap_or(serde_json::Value::Null),
        );
    }

    /// Appends an event.
    pub fn push_event(&mut self, event: SpanEvent) {
        self.events.push(event);
    }

    /// Sets the end time if it has not been set yet.
    ///
    /// An end time earlier than the start time is clamped to the start time.
    /// Returns `false` if the span was already finished.
    pub fn finish(&mut self, end_time: DateTime<Utc>) -> bool {
        if self.end_time.is_some() {
            return false;
        }
        self.end_time = Some(end_time.max(self.start_time));
        true
    }

    /// Returns true once the end time has been set.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.end_time.is_some()
    }

    /// Returns the duration of a finished span.
    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        self.end_time.map(|end| end - self.start_time)
    }

    /// Returns the duration in milliseconds of a finished span.
    #[must_use]
    pub fn duration_ms(&self) -> Option<i64> {
        self.duration().map(|d| d.num_milliseconds())
    }

    /// Returns true if this is a root span (no parent).
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent_span_id.is_none()
    }

    /// Returns the first event with the given name.
    #[must_use]
    pub fn event(&self, name: &str) -> Option<&SpanEvent> {
        self.events.iter().find(|e| e.name == name)
    }

    /// Validates a finished span.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The name is empty
    /// - The service is empty
    /// - The span has not been finished
    /// - The end time is before the start time
    pub fn validate_span(&self) -> Result<(), SpanValidationError> {
        if self.name.is_empty() {
            return Err(SpanValidationError::EmptyName);
        }
        if self.service.is_empty() {
            return Err(SpanValidationError::EmptyService);
        }
        let Some(end_time) = self.end_time else {
            return Err(SpanValidationError::NotFinished);
        };
        if end_time < self.start_time {
            return Err(SpanValidationError::InvalidTimeRange);
        }
        self.validate()?;
        Ok(())
    }
}

/// A trace consisting of multiple spans.
#[derive(Debug, Clone, Serialize)]
pub struct Trace {
    /// The trace ID.
    pub trace_id: TraceId,

    /// All spans in this trace.
    pub spans: Vec<Span>,

    /// The root span (if any).
    #[serde(skip)]
    root_span_index: Option<usize>,
}

impl Trace {
    /// Creates a trace from spans that share the first span's trace id.
    ///
    /// Spans belonging to other traces are ignored.
    #[must_use]
    pub fn from_spans(spans: impl IntoIterator<Item = Span>) -> Option<Self> {
        let mut spans = spans.into_iter().peekable();
        let trace_id = spans.peek()?.trace_id;
        let spans: Vec<Span> = spans.filter(|s| s.trace_id == trace_id).collect();

        let root_span_index = spans.iter().position(Span::is_root);

        Some(Self {
            trace_id,
            spans,
            root_span_index,
        })
    }

    /// Returns the root span if it exists.
    #[must_use]
    pub fn root_span(&self) -> Option<&Span> {
        self.root_span_index.map(|i| &self.spans[i])
    }

    /// Returns the direct children of the given span.
    #[must_use]
    pub fn children_of(&self, span_id: SpanId) -> Vec<&Span> {
        self.spans
            .iter()
            .filter(|s| s.parent_span_id == Some(span_id))
            .collect()
    }

    /// Returns the total duration of the trace (from earliest start to latest end).
    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        let start = self.spans.iter().map(|s| s.start_time).min()?;
        let end = self.spans.iter().filter_map(|s| s.end_time).max()?;

        Some(end - start)
    }

    /// Returns the number of spans in this trace.
    #[must_use]
    pub fn span_count(&self) -> usize {
        self.spans.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (TraceId, SpanId) {
        (TraceId::random(), SpanId::random())
    }

    #[test]
    fn test_span_new_is_open_root() {
        let (trace_id, span_id) = ids();
        let span = Span::new(trace_id, span_id, "GeneratingPayload", "paylog");

        assert_eq!(span.trace_id, trace_id);
        assert_eq!(span.span_id, span_id);
        assert!(span.is_root());
        assert!(!span.is_finished());
        assert_eq!(span.status, SpanStatus::Unset);
    }

    #[test]
    fn test_finish_sets_end_time_once() {
        let (trace_id, span_id) = ids();
        let mut span = Span::new(trace_id, span_id, "op", "svc");
        let first = span.start_time + Duration::milliseconds(5);

        assert!(span.finish(first));
        assert!(!span.finish(first + Duration::seconds(1)));
        assert_eq!(span.end_time, Some(first));
        assert_eq!(span.duration_ms(), Some(5));
    }

    #[test]
    fn test_finish_clamps_to_start_time() {
        let (trace_id, span_id) = ids();
        let mut span = Span::new(trace_id, span_id, "op", "svc");
        let start = span.start_time;

        span.finish(start - Duration::seconds(1));

        assert_eq!(span.end_time, Some(start));
        assert!(span.validate_span().is_ok());
    }

    #[test]
    fn test_set_tag_last_write_wins() {
        let (trace_id, span_id) = ids();
        let mut span = Span::new(trace_id, span_id, "op", "svc").with_tag("attempt", 1);
        span.set_tag("attempt", 2);

        assert_eq!(span.tags.len(), 1);
        assert_eq!(span.tags.get("attempt"), Some(&serde_json::json!(2)));
    }

    #[test]
    fn test_validation_requires_finish() {
        let (trace_id, span_id) = ids();
        let span = Span::new(trace_id, span_id, "op", "svc");
        assert!(matches!(
            span.validate_span(),
            Err(SpanValidationError::NotFinished)
        ));
    }

    #[test]
    fn test_validation_empty_name() {
        let (trace_id, span_id) = ids();
        let span = Span::new(trace_id, span_id, "", "svc");
        assert!(matches!(
            span.validate_span(),
            Err(SpanValidationError::EmptyName)
        ));
    }

    #[test]
    fn test_span_serialization() {
        let (trace_id, span_id) = ids();
        let span = Span::new(trace_id, span_id, "GET /paymentlog", "paylog")
            .with_kind(SpanKind::Server)
            .with_tag("shop", "demo");

        let json = serde_json::to_string(&span).unwrap();

        assert!(json.contains(&format!("\"trace_id\":\"{trace_id}\"")));
        assert!(json.contains("\"kind\":\"server\""));
        assert!(!json.contains("end_time"));
    }

    #[test]
    fn test_trace_from_spans() {
        let trace_id = TraceId::random();
        let root_id = SpanId::random();
        let root = Span::new(trace_id, root_id, "root", "svc");
        let child = Span::new(trace_id, SpanId::random(), "child", "svc").with_parent(root_id);
        let other = Span::new(TraceId::random(), SpanId::random(), "other", "svc");

        let trace = Trace::from_spans(vec![root, child, other]).unwrap();

        assert_eq!(trace.trace_id, trace_id);
        assert_eq!(trace.span_count(), 2);
        assert_eq!(trace.root_span().unwrap().span_id, root_id);
        assert_eq!(trace.children_of(root_id).len(), 1);
    }

    #[test]
    fn test_trace_from_no_spans() {
        assert!(Trace::from_spans(Vec::new()).is_none());
    }

    #[test]
    fn test_span_status_display() {
        assert_eq!(SpanStatus::Unset.to_string(), "unset");
        assert_eq!(SpanStatus::Ok.to_string(), "ok");
        assert_eq!(SpanStatus::Error.to_string(), "error");
    }

    #[test]
    fn test_span_kind_display() {
        assert_eq!(SpanKind::Server.to_string(), "server");
        assert_eq!(SpanKind::Internal.to_string(), "internal");
    }
}

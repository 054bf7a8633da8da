//! Structured logger with trace correlation.
//!
//! Records are stamped with the trace and span id of whatever span is
//! current in the caller's [`TraceContext`], then handed to the log sinks.
//! Emission is fire-and-forget: it never awaits I/O and never fails.

use crate::context::TraceContext;
use crate::export::ExporterRegistry;
use crate::models::{LogLevel, LogRecord};
use crate::resource::ResourceDescriptor;
use serde::Serialize;

/// Emits structured log records to the registry's log sinks.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    resource: ResourceDescriptor,
    registry: ExporterRegistry,
    min_level: LogLevel,
}

impl StructuredLogger {
    /// Creates a logger that drops records below [`LogLevel::Info`].
    #[must_use]
    pub fn new(resource: ResourceDescriptor, registry: ExporterRegistry) -> Self {
        Self {
            resource,
            registry,
            min_level: LogLevel::Info,
        }
    }

    /// Sets the minimum level.
    #[must_use]
    pub fn with_min_level(mut self, min_level: LogLevel) -> Self {
        self.min_level = min_level;
        self
    }

    /// Returns the minimum level.
    #[must_use]
    pub fn min_level(&self) -> LogLevel {
        self.min_level
    }

    /// Returns true if a record at `level` would be emitted.
    #[must_use]
    pub fn enabled(&self, level: LogLevel) -> bool {
        level >= self.min_level
    }

    /// Emits a plain message.
    pub fn emit(&self, cx: &TraceContext, level: LogLevel, message: impl Into<String>) {
        if !self.enabled(level) {
            return;
        }
        self.emit_record(cx, LogRecord::new(level, message, self.resource.clone()));
    }

    /// Emits a message carrying a structured payload as its body.
    ///
    /// A payload that cannot be serialized is replaced by an
    /// `payload.error` attribute; the record is still emitted.
    pub fn emit_payload<T: Serialize + ?Sized>(
        &self,
        cx: &TraceContext,
        level: LogLevel,
        message: impl Into<String>,
        payload: &T,
    ) {
        if !self.enabled(level) {
            return;
        }
        let record = LogRecord::new(level, message, self.resource.clone());
        let record = match serde_json::to_value(payload) {
            Ok(body) => record.with_body(body),
            Err(error) => {
                tracing::debug!(%error, "Log payload could not be serialized");
                record.with_attribute("payload.error", error.to_string())
            }
        };
        self.emit_record(cx, record);
    }

    /// Stamps and emits a prepared record.
    ///
    /// Correlation already present on the record is kept; otherwise the
    /// current span of `cx` is used, if any.
    pub fn emit_record(&self, cx: &TraceContext, mut record: LogRecord) {
        if !self.enabled(record.level) {
            return;
        }
        if !record.is_correlated() {
            if let Some(current) = cx.current() {
                record = record.with_correlation(current.trace_id, current.span_id);
            }
        }

        tracing::debug!(
            level = %record.level,
            trace_id = ?record.trace_id,
            span_id = ?record.span_id,
            "{}",
            record.message
        );
        self.registry.export_log(record);
    }
}

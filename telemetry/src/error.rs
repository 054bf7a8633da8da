//! Error types for the telemetry core.

use thiserror::Error;

/// Errors produced while wiring or operating the telemetry pipeline.
///
/// Only [`TelemetryError::InvalidConfig`] is ever returned to application
/// code at startup. Export and instrumentation failures are absorbed inside
/// the pipeline and reported through process diagnostics.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Malformed resource, sampler, or exporter configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A sink could not deliver a batch.
    #[error("Export failed: {0}")]
    ExportFailure(#[from] ExportError),

    /// An internal tracer or logger fault.
    #[error("Instrumentation fault: {0}")]
    InstrumentationFault(String),
}

impl TelemetryError {
    /// Shorthand for building an [`TelemetryError::InvalidConfig`].
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

impl From<validator::ValidationErrors> for TelemetryError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::InvalidConfig(errors.to_string())
    }
}

/// Errors a sink reports for a single batch.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The endpoint could not be reached.
    #[error("endpoint unreachable: {0}")]
    Unreachable(String),

    /// The endpoint answered with a non-success status.
    #[error("endpoint rejected batch with status {status}: {message}")]
    Rejected {
        /// HTTP status code returned by the endpoint.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// The batch could not be serialized.
    #[error("failed to encode batch: {0}")]
    Encoding(#[from] serde_json::Error),

    /// An I/O error while writing to a stream sink.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The export did not complete within the configured timeout.
    #[error("export timed out after {0} ms")]
    Timeout(u64),
}

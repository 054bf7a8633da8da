//! Telemetry configuration.
//!
//! This module contains the sink descriptions, export tuning, and the
//! [`TelemetryConfig`] read from the environment at startup.

pub mod settings;
pub mod sink;

pub use settings::{ExportSettings, TelemetryConfig};
pub use sink::{ExportMode, SinkConfig, TransportProtocol};

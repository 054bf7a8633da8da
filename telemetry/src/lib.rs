//! Paylog telemetry core
//!
//! This crate contains the instrumentation used by the Paylog service:
//! resource identity, trace sampling, span tracing with explicit context,
//! a trace-correlated structured logger, and an exporter registry with
//! isolated push sinks and a Prometheus scrape path.
//!
//! # Modules
//!
//! - [`resource`] - Static identity of the running process
//! - [`sampler`] - Root sampling policies
//! - [`context`] - Per-unit-of-work span context
//! - [`tracer`] - Span creation and recording
//! - [`logger`] - Structured, trace-correlated logging
//! - [`export`] - Exporter registry, sinks, and metric aggregation
//! - [`config`] - Configuration from the environment
//! - [`models`] - Span, log record, and metric data models
//!
//! # Example
//!
//! ```
//! use telemetry::config::TelemetryConfig;
//! use telemetry::context::TraceContext;
//! use telemetry::models::{LogLevel, SpanKind};
//! use telemetry::pipeline::Telemetry;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let telemetry = Telemetry::init(&TelemetryConfig::default()).unwrap();
//! let cx = TraceContext::new();
//!
//! let span = telemetry.tracer().start_span(&cx, "checkout", SpanKind::Internal);
//! telemetry.logger().emit(&cx, LogLevel::Info, "payment accepted");
//! span.stop();
//!
//! telemetry.shutdown().await;
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod context;
pub mod error;
pub mod export;
pub mod ids;
pub mod logger;
pub mod models;
pub mod pipeline;
pub mod resource;
pub mod sampler;
pub mod tracer;

pub use context::{SpanContext, TraceContext};
pub use error::{ExportError, TelemetryError};
pub use ids::{SpanId, TraceId};
pub use logger::StructuredLogger;
pub use pipeline::Telemetry;
pub use resource::ResourceDescriptor;
pub use tracer::{SpanHandle, Tracer};

/// Re-export common dependencies for convenience.
pub use chrono;
pub use serde_json;

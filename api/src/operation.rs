//! The instrumented "generate and report a payment log" operation.
//!
//! One invocation walks `Start -> GeneratingPayload -> Logging -> Completed`
//! under a root span, with one child span per working stage. The payload is
//! logged through the structured logger, so the record is correlated with
//! the `Logging` span of the same trace.

use crate::payment::{GenerationError, PaymentGenerator, PaymentLog};
use std::sync::Arc;
use std::time::{Duration, Instant};
use telemetry::models::{LogLevel, MetricPoint, SpanKind, SpanStatus};
use telemetry::{SpanHandle, Telemetry, TraceContext};
use thiserror::Error;

/// Counter of invocations, labeled by `outcome`.
pub const OPERATIONS_TOTAL: &str = "paylog_operations_total";
/// Histogram of invocation durations.
pub const OPERATION_DURATION: &str = "paylog_operation_duration_seconds";

/// Name of the root span of every invocation.
pub const ROOT_SPAN: &str = "ReportPaymentLog";

/// Stages of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStage {
    /// Root span opened.
    Start,
    /// Building the payload.
    GeneratingPayload,
    /// Emitting the payload as a log record.
    Logging,
    /// Root span stopped, payload returned.
    Completed,
}

impl OperationStage {
    /// Returns the stage name, also used as the child span name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "Start",
            Self::GeneratingPayload => "GeneratingPayload",
            Self::Logging => "Logging",
            Self::Completed => "Completed",
        }
    }
}

impl std::fmt::Display for OperationStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of an invocation.
#[derive(Debug, Error)]
pub enum OperationError {
    /// The payload could not be generated.
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// Generates a payment log and reports it through telemetry.
#[derive(Clone)]
pub struct ReportOperation {
    telemetry: Telemetry,
    generator: Arc<dyn PaymentGenerator>,
}

impl ReportOperation {
    /// Creates the operation with its default generator.
    #[must_use]
    pub fn new(telemetry: Telemetry, generator: Arc<dyn PaymentGenerator>) -> Self {
        Self {
            telemetry,
            generator,
        }
    }

    /// Runs one invocation with the default generator.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::Generation`] if the payload cannot be built.
    /// The failure is also recorded on the root span.
    pub fn handle(&self) -> Result<PaymentLog, OperationError> {
        self.handle_with(self.generator.as_ref())
    }

    /// Runs one invocation with `generator`.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::Generation`] if the payload cannot be built.
    /// The failure is also recorded on the root span.
    pub fn handle_with(
        &self,
        generator: &dyn PaymentGenerator,
    ) -> Result<PaymentLog, OperationError> {
        let started = Instant::now();
        let cx = TraceContext::new();
        let root = self
            .telemetry
            .tracer()
            .start_span(&cx, ROOT_SPAN, SpanKind::Server);
        tracing::debug!(trace_id = %root.trace_id(), stage = %OperationStage::Start, "Operation started");

        let result = self.run(&cx, &root, generator);

        match &result {
            Ok(payment) => {
                root.set_tag("payment.tracking_id", payment.tracking_id.to_string());
                root.set_status(SpanStatus::Ok);
                tracing::debug!(
                    trace_id = %root.trace_id(),
                    stage = %OperationStage::Completed,
                    tracking_id = %payment.tracking_id,
                    "Operation completed"
                );
            }
            Err(error) => {
                root.record_error(error);
                tracing::warn!(trace_id = %root.trace_id(), %error, "Operation failed");
            }
        }
        root.stop();

        self.record_metrics(result.is_ok(), started.elapsed());
        result
    }

    fn run(
        &self,
        cx: &TraceContext,
        root: &SpanHandle,
        generator: &dyn PaymentGenerator,
    ) -> Result<PaymentLog, OperationError> {
        let tracer = self.telemetry.tracer();

        let generating = tracer.start_child(
            root,
            OperationStage::GeneratingPayload.as_str(),
            SpanKind::Internal,
        );
        generating.add_event("payload.generation.started");
        let payment = match generator.generate() {
            Ok(payment) => payment,
            Err(error) => {
                generating.record_error(&error);
                generating.stop();
                return Err(error.into());
            }
        };
        generating.add_event_with_attributes(
            "payload.generation.finished",
            [("payment.tracking_id", payment.tracking_id.to_string())],
        );
        generating.stop();

        let logging = tracer.start_child(root, OperationStage::Logging.as_str(), SpanKind::Internal);
        self.telemetry
            .logger()
            .emit_payload(cx, LogLevel::Info, "Payment log generated", &payment);
        logging.add_event_with_attributes(
            "log.delivered",
            [("log.level", LogLevel::Info.to_string())],
        );
        logging.stop();

        Ok(payment)
    }

    fn record_metrics(&self, success: bool, elapsed: Duration) {
        let registry = self.telemetry.registry();
        let outcome = if success { "success" } else { "failure" };

        registry.export_metric_delta(
            MetricPoint::counter(OPERATIONS_TOTAL, 1.0)
                .with_attribute("outcome", outcome)
                .with_description("Payment log operations handled"),
        );
        registry.export_metric_delta(
            MetricPoint::histogram(OPERATION_DURATION, elapsed.as_secs_f64())
                .with_description("Duration of payment log operations")
                .with_unit("s"),
        );
    }
}

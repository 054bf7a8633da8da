//! Conversions from internal telemetry types to OTLP export requests.
//!
//! A batch becomes one `Export*ServiceRequest` carrying a single resource
//! and a single instrumentation scope. The request is encoded either as
//! protobuf (`http/protobuf`) or as OTLP/JSON (`http/json`), ready to be
//! POSTed to a collector's `/v1/traces`, `/v1/logs` or `/v1/metrics`.

use super::aggregate::DEFAULT_BUCKETS;
use super::{ExportBatch, SignalType};
use crate::error::ExportError;
use crate::models::{LogLevel, LogRecord, MetricKind, MetricPoint, Span, SpanKind, SpanStatus};
use crate::resource::ResourceDescriptor;
use chrono::{DateTime, Utc};
use opentelemetry_proto::tonic::collector::logs::v1::ExportLogsServiceRequest;
use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceRequest;
use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::common::v1::any_value::Value as OtlpValue;
use opentelemetry_proto::tonic::common::v1::{
    AnyValue, ArrayValue, InstrumentationScope, KeyValue, KeyValueList,
};
use opentelemetry_proto::tonic::logs::v1::{
    LogRecord as OtlpLogRecord, ResourceLogs, ScopeLogs, SeverityNumber,
};
use opentelemetry_proto::tonic::metrics::v1::{
    metric::Data, number_data_point, AggregationTemporality, Gauge, Histogram, HistogramDataPoint,
    Metric, NumberDataPoint, ResourceMetrics, ScopeMetrics, Sum,
};
use opentelemetry_proto::tonic::resource::v1::Resource;
use opentelemetry_proto::tonic::trace::v1::{
    span, status::StatusCode, ResourceSpans, ScopeSpans, Span as OtlpSpan, Status,
};
use prost::Message;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Name of the instrumentation scope attached to every request.
pub const SCOPE_NAME: &str = "paylog-telemetry";

/// Body encoding of an OTLP/HTTP request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OtlpEncoding {
    /// OTLP/JSON.
    #[default]
    Json,
    /// Binary protobuf.
    Protobuf,
}

impl OtlpEncoding {
    /// Returns the `Content-Type` header value for this encoding.
    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Protobuf => "application/x-protobuf",
        }
    }
}

/// An export request for one signal.
#[derive(Debug, Clone, PartialEq)]
pub enum OtlpRequest {
    /// Spans.
    Traces(ExportTraceServiceRequest),
    /// Log records.
    Logs(ExportLogsServiceRequest),
    /// Metric points.
    Metrics(ExportMetricsServiceRequest),
}

impl OtlpRequest {
    /// Converts the items of `batch` that match its signal.
    #[must_use]
    pub fn from_batch(batch: &ExportBatch) -> Self {
        match batch.signal {
            SignalType::Traces => Self::Traces(traces_request(&batch.resource, batch.spans())),
            SignalType::Logs => Self::Logs(logs_request(&batch.resource, batch.logs())),
            SignalType::Metrics => {
                Self::Metrics(metrics_request(&batch.resource, batch.metrics()))
            }
        }
    }

    /// Encodes the request body.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Encoding`] if JSON serialization fails.
    pub fn encode(&self, encoding: OtlpEncoding) -> Result<Vec<u8>, ExportError> {
        let body = match (self, encoding) {
            (Self::Traces(request), OtlpEncoding::Protobuf) => request.encode_to_vec(),
            (Self::Logs(request), OtlpEncoding::Protobuf) => request.encode_to_vec(),
            (Self::Metrics(request), OtlpEncoding::Protobuf) => request.encode_to_vec(),
            (Self::Traces(request), OtlpEncoding::Json) => serde_json::to_vec(request)?,
            (Self::Logs(request), OtlpEncoding::Json) => serde_json::to_vec(request)?,
            (Self::Metrics(request), OtlpEncoding::Json) => serde_json::to_vec(request)?,
        };
        Ok(body)
    }
}

/// Builds a trace export request.
pub fn traces_request<'a>(
    resource: &ResourceDescriptor,
    spans: impl IntoIterator<Item = &'a Span>,
) -> ExportTraceServiceRequest {
    ExportTraceServiceRequest {
        resource_spans: vec![ResourceSpans {
            resource: Some(resource_to_otlp(resource)),
            scope_spans: vec![ScopeSpans {
                scope: Some(scope()),
                spans: spans.into_iter().map(span_to_otlp).collect(),
                ..Default::default()
            }],
            ..Default::default()
        }],
    }
}

/// Builds a log export request.
pub fn logs_request<'a>(
    resource: &ResourceDescriptor,
    records: impl IntoIterator<Item = &'a LogRecord>,
) -> ExportLogsServiceRequest {
    ExportLogsServiceRequest {
        resource_logs: vec![ResourceLogs {
            resource: Some(resource_to_otlp(resource)),
            scope_logs: vec![ScopeLogs {
                scope: Some(scope()),
                log_records: records.into_iter().map(log_record_to_otlp).collect(),
                ..Default::default()
            }],
            ..Default::default()
        }],
    }
}

/// Builds a metric export request. Every point is sent as a delta.
pub fn metrics_request<'a>(
    resource: &ResourceDescriptor,
    points: impl IntoIterator<Item = &'a MetricPoint>,
) -> ExportMetricsServiceRequest {
    ExportMetricsServiceRequest {
        resource_metrics: vec![ResourceMetrics {
            resource: Some(resource_to_otlp(resource)),
            scope_metrics: vec![ScopeMetrics {
                scope: Some(scope()),
                metrics: points.into_iter().map(metric_point_to_otlp).collect(),
                ..Default::default()
            }],
            ..Default::default()
        }],
    }
}

fn scope() -> InstrumentationScope {
    InstrumentationScope {
        name: SCOPE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        ..Default::default()
    }
}

/// Converts a timestamp to nanoseconds since the Unix epoch.
fn unix_nanos(time: DateTime<Utc>) -> u64 {
    time.timestamp_nanos_opt()
        .and_then(|nanos| u64::try_from(nanos).ok())
        .unwrap_or_default()
}

fn string_value(value: impl Into<String>) -> AnyValue {
    AnyValue {
        value: Some(OtlpValue::StringValue(value.into())),
    }
}

fn key_value(key: impl Into<String>, value: AnyValue) -> KeyValue {
    KeyValue {
        key: key.into(),
        value: Some(value),
    }
}

/// Converts a JSON value to an OTLP `AnyValue`.
fn json_to_any_value(value: &JsonValue) -> AnyValue {
    let value = match value {
        JsonValue::Null => None,
        JsonValue::Bool(b) => Some(OtlpValue::BoolValue(*b)),
        JsonValue::Number(n) => n
            .as_i64()
            .map(OtlpValue::IntValue)
            .or_else(|| n.as_f64().map(OtlpValue::DoubleValue)),
        JsonValue::String(s) => Some(OtlpValue::StringValue(s.clone())),
        JsonValue::Array(items) => Some(OtlpValue::ArrayValue(ArrayValue {
            values: items.iter().map(json_to_any_value).collect(),
        })),
        JsonValue::Object(map) => Some(OtlpValue::KvlistValue(KeyValueList {
            values: map
                .iter()
                .map(|(k, v)| key_value(k.clone(), json_to_any_value(v)))
                .collect(),
        })),
    };
    AnyValue { value }
}

/// Converts a JSON attribute map, sorted by key for stable output.
fn json_attributes<'a>(
    attributes: impl IntoIterator<Item = (&'a String, &'a JsonValue)>,
) -> Vec<KeyValue> {
    let mut attributes: Vec<KeyValue> = attributes
        .into_iter()
        .map(|(k, v)| key_value(k.clone(), json_to_any_value(v)))
        .collect();
    attributes.sort_by(|a, b| a.key.cmp(&b.key));
    attributes
}

fn resource_to_otlp(resource: &ResourceDescriptor) -> Resource {
    Resource {
        attributes: resource
            .iter()
            .map(|(k, v)| key_value(k, string_value(v)))
            .collect(),
        ..Default::default()
    }
}

fn span_kind_to_otlp(kind: SpanKind) -> span::SpanKind {
    match kind {
        SpanKind::Internal => span::SpanKind::Internal,
        SpanKind::Server => span::SpanKind::Server,
        SpanKind::Client => span::SpanKind::Client,
        SpanKind::Producer => span::SpanKind::Producer,
        SpanKind::Consumer => span::SpanKind::Consumer,
    }
}

fn span_status_to_otlp(span: &Span) -> Status {
    match span.status {
        SpanStatus::Unset => Status::default(),
        SpanStatus::Ok => Status {
            code: StatusCode::Ok as i32,
            ..Default::default()
        },
        SpanStatus::Error => Status {
            code: StatusCode::Error as i32,
            message: span
                .event("exception")
                .and_then(|e| e.attributes.get("exception.message"))
                .and_then(JsonValue::as_str)
                .unwrap_or_default()
                .to_string(),
        },
    }
}

/// Converts a finished `Span` to an OTLP span.
///
/// An unfinished span is exported with its start time as end time.
pub fn span_to_otlp(span: &Span) -> OtlpSpan {
    let start = unix_nanos(span.start_time);
    OtlpSpan {
        trace_id: span.trace_id.to_bytes().to_vec(),
        span_id: span.span_id.to_bytes().to_vec(),
        parent_span_id: span
            .parent_span_id
            .map(|id| id.to_bytes().to_vec())
            .unwrap_or_default(),
        name: span.name.clone(),
        kind: span_kind_to_otlp(span.kind) as i32,
        start_time_unix_nano: start,
        end_time_unix_nano: span.end_time.map_or(start, unix_nanos),
        attributes: json_attributes(&span.tags),
        events: span
            .events
            .iter()
            .map(|event| span::Event {
                time_unix_nano: unix_nanos(event.timestamp),
                name: event.name.clone(),
                attributes: json_attributes(&event.attributes),
                ..Default::default()
            })
            .collect(),
        status: Some(span_status_to_otlp(span)),
        ..Default::default()
    }
}

fn severity_to_otlp(level: LogLevel) -> SeverityNumber {
    match level {
        LogLevel::Trace => SeverityNumber::Trace,
        LogLevel::Debug => SeverityNumber::Debug,
        LogLevel::Info => SeverityNumber::Info,
        LogLevel::Warn => SeverityNumber::Warn,
        LogLevel::Error => SeverityNumber::Error,
        LogLevel::Fatal => SeverityNumber::Fatal,
    }
}

/// Converts a `LogRecord` to an OTLP log record.
///
/// A structured payload becomes the body and the message moves to the
/// `log.message` attribute. Without a payload the message is the body.
pub fn log_record_to_otlp(record: &LogRecord) -> OtlpLogRecord {
    let time = unix_nanos(record.timestamp);
    let mut attributes = json_attributes(&record.attributes);
    let body = match &record.body {
        Some(payload) => {
            attributes.push(key_value("log.message", string_value(record.message.clone())));
            json_to_any_value(payload)
        }
        None => string_value(record.message.clone()),
    };

    OtlpLogRecord {
        time_unix_nano: time,
        observed_time_unix_nano: time,
        severity_number: severity_to_otlp(record.level) as i32,
        severity_text: record.level.to_string().to_uppercase(),
        body: Some(body),
        attributes,
        trace_id: record
            .trace_id
            .map(|id| id.to_bytes().to_vec())
            .unwrap_or_default(),
        span_id: record
            .span_id
            .map(|id| id.to_bytes().to_vec())
            .unwrap_or_default(),
        ..Default::default()
    }
}

/// Returns the per-bucket (non-cumulative) counts of one observation.
fn observation_bucket_counts(value: f64) -> Vec<u64> {
    let index = DEFAULT_BUCKETS
        .iter()
        .position(|bound| value <= *bound)
        .unwrap_or(DEFAULT_BUCKETS.len());
    let mut counts = vec![0; DEFAULT_BUCKETS.len() + 1];
    counts[index] = 1;
    counts
}

/// Converts a `MetricPoint` delta to an OTLP metric with one data point.
pub fn metric_point_to_otlp(point: &MetricPoint) -> Metric {
    let time = unix_nanos(point.timestamp);
    let attributes: Vec<KeyValue> = point
        .attributes
        .iter()
        .map(|(k, v)| key_value(k.clone(), string_value(v.clone())))
        .collect();
    let number = || NumberDataPoint {
        attributes: attributes.clone(),
        start_time_unix_nano: time,
        time_unix_nano: time,
        value: Some(number_data_point::Value::AsDouble(point.value)),
        ..Default::default()
    };

    let data = match point.kind {
        MetricKind::Counter => Data::Sum(Sum {
            data_points: vec![number()],
            aggregation_temporality: AggregationTemporality::Delta as i32,
            is_monotonic: true,
        }),
        MetricKind::Gauge => Data::Gauge(Gauge {
            data_points: vec![number()],
        }),
        MetricKind::Histogram => Data::Histogram(Histogram {
            data_points: vec![HistogramDataPoint {
                attributes: attributes.clone(),
                start_time_unix_nano: time,
                time_unix_nano: time,
                count: 1,
                sum: Some(point.value),
                bucket_counts: observation_bucket_counts(point.value),
                explicit_bounds: DEFAULT_BUCKETS.to_vec(),
                min: Some(point.value),
                max: Some(point.value),
                ..Default::default()
            }],
            aggregation_temporality: AggregationTemporality::Delta as i32,
        }),
    };

    Metric {
        name: point.name.clone(),
        description: point.description.clone().unwrap_or_default(),
        unit: point.unit.clone().unwrap_or_default(),
        data: Some(data),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::ExportItem;
    use crate::ids::{SpanId, TraceId};
    use crate::models::SpanEvent;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn resource() -> ResourceDescriptor {
        ResourceDescriptor::build("paylog", None, Some("1.0.0"), Some("pod-1"), BTreeMap::new())
            .unwrap()
    }

    fn failed_span() -> Span {
        let mut span = Span::new(TraceId::random(), SpanId::random(), "Logging", "paylog")
            .with_kind(SpanKind::Server)
            .with_parent(SpanId::random());
        span.set_tag("payment.tracking_id", "abc");
        span.set_tag("error", true);
        span.push_event(
            SpanEvent::new("exception").with_attribute("exception.message", "boom"),
        );
        span.status = SpanStatus::Error;
        span.finish(Utc::now());
        span
    }

    fn attribute<'a>(attributes: &'a [KeyValue], key: &str) -> Option<&'a OtlpValue> {
        attributes
            .iter()
            .find(|kv| kv.key == key)
            .and_then(|kv| kv.value.as_ref())
            .and_then(|v| v.value.as_ref())
    }

    #[test]
    fn test_span_conversion() {
        let span = failed_span();

        let otlp = span_to_otlp(&span);

        assert_eq!(otlp.trace_id, span.trace_id.to_bytes());
        assert_eq!(otlp.span_id, span.span_id.to_bytes());
        assert_eq!(otlp.parent_span_id.len(), 8);
        assert_eq!(otlp.kind, span::SpanKind::Server as i32);
        assert!(otlp.end_time_unix_nano >= otlp.start_time_unix_nano);
        assert_eq!(
            attribute(&otlp.attributes, "payment.tracking_id"),
            Some(&OtlpValue::StringValue("abc".to_string()))
        );
        assert_eq!(attribute(&otlp.attributes, "error"), Some(&OtlpValue::BoolValue(true)));
        let status = otlp.status.unwrap();
        assert_eq!(status.code, StatusCode::Error as i32);
        assert_eq!(status.message, "boom");
        assert_eq!(otlp.events[0].name, "exception");
    }

    #[test]
    fn test_root_span_has_empty_parent() {
        let mut span = Span::new(TraceId::random(), SpanId::random(), "root", "paylog");
        span.finish(Utc::now());

        let otlp = span_to_otlp(&span);

        assert!(otlp.parent_span_id.is_empty());
        assert_eq!(otlp.status.unwrap().code, StatusCode::Unset as i32);
    }

    #[test]
    fn test_log_record_with_payload() {
        let record = LogRecord::new(LogLevel::Info, "Payment log generated", resource())
            .with_body(serde_json::json!({"TrackingId": "t-1", "Amount": 12.5, "Tries": 2}))
            .with_correlation(TraceId::random(), SpanId::random());

        let otlp = log_record_to_otlp(&record);

        assert_eq!(otlp.severity_number, SeverityNumber::Info as i32);
        assert_eq!(otlp.severity_text, "INFO");
        assert_eq!(otlp.trace_id.len(), 16);
        assert_eq!(otlp.span_id.len(), 8);
        assert_eq!(
            attribute(&otlp.attributes, "log.message"),
            Some(&OtlpValue::StringValue("Payment log generated".to_string()))
        );
        let Some(OtlpValue::KvlistValue(body)) = otlp.body.unwrap().value else {
            panic!("expected a key-value body");
        };
        assert_eq!(
            attribute(&body.values, "Amount"),
            Some(&OtlpValue::DoubleValue(12.5))
        );
        assert_eq!(attribute(&body.values, "Tries"), Some(&OtlpValue::IntValue(2)));
    }

    #[test]
    fn test_uncorrelated_log_has_empty_ids() {
        let record = LogRecord::new(LogLevel::Warn, "startup", resource());

        let otlp = log_record_to_otlp(&record);

        assert!(otlp.trace_id.is_empty());
        assert!(otlp.span_id.is_empty());
        assert_eq!(
            otlp.body.unwrap().value,
            Some(OtlpValue::StringValue("startup".to_string()))
        );
    }

    #[test]
    fn test_counter_is_monotonic_delta_sum() {
        let point = MetricPoint::counter("paylog_operations_total", 1.0)
            .with_attribute("outcome", "success");

        let metric = metric_point_to_otlp(&point);

        let Some(Data::Sum(sum)) = metric.data else {
            panic!("expected a sum");
        };
        assert!(sum.is_monotonic);
        assert_eq!(sum.aggregation_temporality, AggregationTemporality::Delta as i32);
        assert_eq!(
            sum.data_points[0].value,
            Some(number_data_point::Value::AsDouble(1.0))
        );
        assert_eq!(
            attribute(&sum.data_points[0].attributes, "outcome"),
            Some(&OtlpValue::StringValue("success".to_string()))
        );
    }

    #[test]
    fn test_histogram_observation_buckets() {
        let point = MetricPoint::histogram("duration_seconds", 0.03).with_unit("s");

        let metric = metric_point_to_otlp(&point);

        assert_eq!(metric.unit, "s");
        let Some(Data::Histogram(histogram)) = metric.data else {
            panic!("expected a histogram");
        };
        let data_point = &histogram.data_points[0];
        assert_eq!(data_point.count, 1);
        assert_eq!(data_point.sum, Some(0.03));
        assert_eq!(data_point.bucket_counts.len(), data_point.explicit_bounds.len() + 1);
        assert_eq!(data_point.bucket_counts.iter().sum::<u64>(), 1);
        let index = data_point.bucket_counts.iter().position(|c| *c == 1).unwrap();
        assert!(0.03 <= data_point.explicit_bounds[index]);
        assert!(index == 0 || 0.03 > data_point.explicit_bounds[index - 1]);
    }

    #[test]
    fn test_observation_above_last_bound_goes_to_overflow_bucket() {
        let counts = observation_bucket_counts(1_000.0);
        assert_eq!(counts.last(), Some(&1));
    }

    #[test]
    fn test_protobuf_encoding_decodes() {
        let batch = ExportBatch {
            signal: SignalType::Traces,
            resource: resource(),
            items: vec![ExportItem::Span(Arc::new(failed_span()))],
        };

        let body = OtlpRequest::from_batch(&batch)
            .encode(OtlpEncoding::Protobuf)
            .unwrap();
        let decoded = ExportTraceServiceRequest::decode(body.as_slice()).unwrap();

        let resource_spans = &decoded.resource_spans[0];
        assert_eq!(
            attribute(&resource_spans.resource.as_ref().unwrap().attributes, "service.name"),
            Some(&OtlpValue::StringValue("paylog".to_string()))
        );
        let scope_spans = &resource_spans.scope_spans[0];
        assert_eq!(scope_spans.scope.as_ref().unwrap().name, SCOPE_NAME);
        assert_eq!(scope_spans.spans[0].name, "Logging");
    }

    #[test]
    fn test_json_encoding_is_otlp_json() {
        let span = failed_span();
        let trace_id = span.trace_id.to_string();
        let batch = ExportBatch {
            signal: SignalType::Traces,
            resource: resource(),
            items: vec![ExportItem::Span(Arc::new(span))],
        };

        let body = OtlpRequest::from_batch(&batch).encode(OtlpEncoding::Json).unwrap();
        let json: JsonValue = serde_json::from_slice(&body).unwrap();

        let span = &json["resourceSpans"][0]["scopeSpans"][0]["spans"][0];
        assert_eq!(span["traceId"], trace_id);
        assert_eq!(span["name"], "Logging");
        assert_eq!(span["kind"], 2);
        assert!(span["startTimeUnixNano"].is_string());
        assert!(json["resourceSpans"][0]["resource"]["attributes"][0]["value"]["stringValue"]
            .is_string());
    }

    #[test]
    fn test_batch_items_of_other_signals_are_skipped() {
        let batch = ExportBatch {
            signal: SignalType::Logs,
            resource: resource(),
            items: vec![
                ExportItem::Span(Arc::new(failed_span())),
                ExportItem::Log(Arc::new(LogRecord::new(LogLevel::Info, "hi", resource()))),
            ],
        };

        let OtlpRequest::Logs(request) = OtlpRequest::from_batch(&batch) else {
            panic!("expected a logs request");
        };
        assert_eq!(request.resource_logs[0].scope_logs[0].log_records.len(), 1);
    }

    #[test]
    fn test_content_types() {
        assert_eq!(OtlpEncoding::Json.content_type(), "application/json");
        assert_eq!(OtlpEncoding::Protobuf.content_type(), "application/x-protobuf");
    }
}

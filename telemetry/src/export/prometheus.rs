//! Prometheus text exposition of a metric snapshot.

use super::aggregate::{MetricSnapshot, SeriesValue};
use std::collections::BTreeMap;
use std::fmt::Write;

/// Content type of the text exposition format.
pub const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Renders a snapshot in the Prometheus text exposition format.
///
/// `HELP` and `TYPE` lines are written once per metric name. Histograms
/// expand into `_bucket`, `_sum`, and `_count` samples with a final
/// `le="+Inf"` bucket.
#[must_use]
pub fn render_prometheus(snapshot: &MetricSnapshot) -> String {
    let mut out = String::new();
    let mut last_name: Option<&str> = None;

    for series in &snapshot.series {
        if last_name != Some(series.name.as_str()) {
            if let Some(description) = &series.description {
                let _ = writeln!(out, "# HELP {} {}", series.name, escape_help(description));
            }
            let _ = writeln!(out, "# TYPE {} {}", series.name, series.kind);
            last_name = Some(series.name.as_str());
        }

        match &series.value {
            SeriesValue::Counter(value) | SeriesValue::Gauge(value) => {
                let _ = writeln!(
                    out,
                    "{}{} {}",
                    series.name,
                    format_labels(&series.attributes, None),
                    format_value(*value)
                );
            }
            SeriesValue::Histogram(data) => {
                for bucket in &data.buckets {
                    let le = format_value(bucket.upper_bound);
                    let _ = writeln!(
                        out,
                        "{}_bucket{} {}",
                        series.name,
                        format_labels(&series.attributes, Some(&le)),
                        bucket.count
                    );
                }
                let _ = writeln!(
                    out,
                    "{}_bucket{} {}",
                    series.name,
                    format_labels(&series.attributes, Some("+Inf")),
                    data.count
                );
                let labels = format_labels(&series.attributes, None);
                let _ = writeln!(out, "{}_sum{labels} {}", series.name, format_value(data.sum));
                let _ = writeln!(out, "{}_count{labels} {}", series.name, data.count);
            }
        }
    }

    out
}

fn format_labels(attributes: &BTreeMap<String, String>, le: Option<&str>) -> String {
    if attributes.is_empty() && le.is_none() {
        return String::new();
    }
    let mut pairs: Vec<String> = attributes
        .iter()
        .map(|(k, v)| format!("{k}=\"{}\"", escape_label_value(v)))
        .collect();
    if let Some(le) = le {
        pairs.push(format!("le=\"{le}\""));
    }
    format!("{{{}}}", pairs.join(","))
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "+Inf" } else { "-Inf" }.to_string()
    } else {
        value.to_string()
    }
}

fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn escape_help(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::MetricAggregator;
    use crate::models::MetricPoint;

    #[test]
    fn test_counter_format() {
        let aggregator = MetricAggregator::new();
        aggregator.record(
            &MetricPoint::counter("paylog_operations_total", 2.0)
                .with_attribute("outcome", "success")
                .with_description("Operations handled"),
        );

        let out = render_prometheus(&aggregator.snapshot());

        assert!(out.contains("# HELP paylog_operations_total Operations handled\n"));
        assert!(out.contains("# TYPE paylog_operations_total counter\n"));
        assert!(out.contains("paylog_operations_total{outcome=\"success\"} 2\n"));
    }

    #[test]
    fn test_headers_written_once_per_name() {
        let aggregator = MetricAggregator::new();
        aggregator.record(&MetricPoint::counter("ops_total", 1.0).with_attribute("outcome", "a"));
        aggregator.record(&MetricPoint::counter("ops_total", 1.0).with_attribute("outcome", "b"));

        let out = render_prometheus(&aggregator.snapshot());

        assert_eq!(out.matches("# TYPE ops_total counter").count(), 1);
        assert_eq!(out.lines().count(), 3);
    }

    #[test]
    fn test_family_keeps_a_single_type() {
        let aggregator = MetricAggregator::new();
        aggregator.record(&MetricPoint::counter("jobs", 1.0).with_attribute("state", "done"));
        aggregator.record(&MetricPoint::gauge("jobs", 4.0).with_attribute("state", "queued"));

        let out = render_prometheus(&aggregator.snapshot());

        assert_eq!(out.matches("# TYPE jobs ").count(), 1);
        assert!(out.contains("# TYPE jobs counter\n"));
        assert!(!out.contains("state=\"queued\""));
    }

    #[test]
    fn test_gauge_without_labels() {
        let aggregator = MetricAggregator::new();
        aggregator.record(&MetricPoint::gauge("queue_depth", 1.5));

        let out = render_prometheus(&aggregator.snapshot());

        assert!(out.contains("# TYPE queue_depth gauge\n"));
        assert!(out.contains("queue_depth 1.5\n"));
    }

    #[test]
    fn test_histogram_format() {
        let aggregator = MetricAggregator::with_buckets(vec![0.1, 1.0]);
        aggregator.record(&MetricPoint::histogram("latency_seconds", 0.05));
        aggregator.record(&MetricPoint::histogram("latency_seconds", 2.0));

        let out = render_prometheus(&aggregator.snapshot());

        assert!(out.contains("latency_seconds_bucket{le=\"0.1\"} 1\n"));
        assert!(out.contains("latency_seconds_bucket{le=\"1\"} 1\n"));
        assert!(out.contains("latency_seconds_bucket{le=\"+Inf\"} 2\n"));
        assert!(out.contains("latency_seconds_sum 2.05\n"));
        assert!(out.contains("latency_seconds_count 2\n"));
    }

    #[test]
    fn test_label_values_are_escaped() {
        let aggregator = MetricAggregator::new();
        aggregator.record(&MetricPoint::gauge("g", 1.0).with_attribute("path", "a\"b\\c"));

        let out = render_prometheus(&aggregator.snapshot());

        assert!(out.contains("g{path=\"a\\\"b\\\\c\"} 1\n"));
    }

    #[test]
    fn test_empty_snapshot() {
        let out = render_prometheus(&MetricAggregator::new().snapshot());
        assert!(out.is_empty());
    }
}

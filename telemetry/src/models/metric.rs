//! Metric data model.
//!
//! A `MetricPoint` is a single measurement produced by instrumentation. The
//! aggregated state read by scrapers is described by `HistogramData` and the
//! snapshot types in the export module.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use validator::Validate;

/// Kind of metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// A monotonically increasing sum; points carry deltas.
    Counter,
    /// A value that can go up or down; points carry the absolute value.
    Gauge,
    /// A distribution; points carry single observations.
    Histogram,
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Counter => write!(f, "counter"),
            Self::Gauge => write!(f, "gauge"),
            Self::Histogram => write!(f, "histogram"),
        }
    }
}

/// A histogram bucket for distribution metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBucket {
    /// The inclusive upper bound of this bucket.
    pub upper_bound: f64,
    /// The cumulative count of observations up to this bound.
    pub count: u64,
}

/// Aggregated histogram state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramData {
    /// The histogram buckets, cumulative and sorted by upper bound.
    pub buckets: Vec<HistogramBucket>,
    /// The sum of all observed values.
    pub sum: f64,
    /// The total count of observations.
    pub count: u64,
}

/// A single metric measurement.
///
/// # Example
///
/// ```
/// use telemetry::models::{MetricKind, MetricPoint};
///
/// let point = MetricPoint::counter("paylog_operations_total", 1.0)
///     .with_attribute("outcome", "success");
///
/// assert_eq!(point.kind, MetricKind::Counter);
/// assert!(point.validate_point().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct MetricPoint {
    /// The metric name (e.g. "`paylog_operations_total`").
    #[validate(length(min = 1, message = "Metric name cannot be empty"))]
    pub name: String,

    /// The kind of metric.
    pub kind: MetricKind,

    /// Delta, absolute value, or observation depending on `kind`.
    pub value: f64,

    /// Attributes (labels) identifying the series.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,

    /// Timestamp when the point was recorded.
    pub timestamp: DateTime<Utc>,

    /// Optional description of the metric.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Optional unit of the metric (e.g., "seconds").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// Errors that can occur during metric validation.
#[derive(Debug, Error)]
pub enum MetricValidationError {
    /// The metric name is empty.
    #[error("Metric name cannot be empty")]
    EmptyName,

    /// The metric name contains characters outside `[a-zA-Z0-9_:]`.
    #[error("Invalid metric name: '{0}'")]
    InvalidName(String),

    /// Invalid attribute name.
    #[error("Invalid attribute name: '{0}'")]
    InvalidAttributeName(String),

    /// A counter received a negative or non-finite delta.
    #[error("Counter delta must be a finite non-negative number, got {0}")]
    InvalidCounterDelta(f64),

    /// Validation failed with details.
    #[error("Validation failed: {0}")]
    ValidationError(#[from] validator::ValidationErrors),
}

/// Returns true if `name` is a valid exposition name.
pub(crate) fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == ':')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

fn is_valid_attribute_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl MetricPoint {
    /// Creates a new point with the current timestamp.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: MetricKind, value: f64) -> Self {
        Self {
            name: name.into(),
            kind,
            value,
            attributes: BTreeMap::new(),
            timestamp: Utc::now(),
            description: None,
            unit: None,
        }
    }

    /// Creates a counter delta.
    #[must_use]
    pub fn counter(name: impl Into<String>, delta: f64) -> Self {
        Self::new(name, MetricKind::Counter, delta)
    }

    /// Creates a gauge reading.
    #[must_use]
    pub fn gauge(name: impl Into<String>, value: f64) -> Self {
        Self::new(name, MetricKind::Gauge, value)
    }

    /// Creates a histogram observation.
    #[must_use]
    pub fn histogram(name: impl Into<String>, observation: f64) -> Self {
        Self::new(name, MetricKind::Histogram, observation)
    }

    /// Adds an attribute to the point.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Sets the description of the metric.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the unit of the metric.
    #[must_use]
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Validates the point.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The name is empty or not a valid exposition name
    /// - An attribute name is not a valid label name
    /// - A counter delta is negative or not finite
    pub fn validate_point(&self) -> Result<(), MetricValidationError> {
        if self.name.is_empty() {
            return Err(MetricValidationError::EmptyName);
        }
        if !is_valid_metric_name(&self.name) {
            return Err(MetricValidationError::InvalidName(self.name.clone()));
        }
        if let Some(key) = self
            .attributes
            .keys()
            .find(|k| !is_valid_attribute_name(k))
        {
            return Err(MetricValidationError::InvalidAttributeName(key.clone()));
        }
        if self.kind == MetricKind::Counter && !(self.value.is_finite() && self.value >= 0.0) {
            return Err(MetricValidationError::InvalidCounterDelta(self.value));
        }
        self.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_point() {
        let point = MetricPoint::counter("requests_total", 1.0)
            .with_attribute("outcome", "success")
            .with_description("Requests handled");

        assert_eq!(point.kind, MetricKind::Counter);
        assert_eq!(point.value, 1.0);
        assert_eq!(point.attributes.get("outcome"), Some(&"success".to_string()));
        assert!(point.validate_point().is_ok());
    }

    #[test]
    fn test_histogram_point_with_unit() {
        let point = MetricPoint::histogram("duration_seconds", 0.25).with_unit("seconds");
        assert_eq!(point.kind, MetricKind::Histogram);
        assert_eq!(point.unit.as_deref(), Some("seconds"));
    }

    #[test]
    fn test_validation_empty_name() {
        let point = MetricPoint::gauge("", 1.0);
        assert!(matches!(
            point.validate_point(),
            Err(MetricValidationError::EmptyName)
        ));
    }

    #[test]
    fn test_validation_invalid_name() {
        let point = MetricPoint::gauge("queue.depth", 1.0);
        assert!(matches!(
            point.validate_point(),
            Err(MetricValidationError::InvalidName(_))
        ));
    }

    #[test]
    fn test_validation_invalid_attribute_name() {
        let point = MetricPoint::gauge("queue_depth", 1.0).with_attribute("sink-name", "x");
        assert!(matches!(
            point.validate_point(),
            Err(MetricValidationError::InvalidAttributeName(_))
        ));
    }

    #[test]
    fn test_validation_negative_counter() {
        let point = MetricPoint::counter("requests_total", -1.0);
        assert!(matches!(
            point.validate_point(),
            Err(MetricValidationError::InvalidCounterDelta(_))
        ));
    }

    #[test]
    fn test_metric_point_serialization() {
        let point = MetricPoint::counter("requests_total", 2.0).with_attribute("env", "prod");

        let json = serde_json::to_string(&point).unwrap();

        assert!(json.contains("\"name\":\"requests_total\""));
        assert!(json.contains("\"kind\":\"counter\""));
        assert!(json.contains("\"value\":2.0"));
    }

    #[test]
    fn test_metric_kind_display() {
        assert_eq!(MetricKind::Counter.to_string(), "counter");
        assert_eq!(MetricKind::Gauge.to_string(), "gauge");
        assert_eq!(MetricKind::Histogram.to_string(), "histogram");
    }
}

//! In-process metric aggregation for the pull (scrape) path.
//!
//! Counters accumulate deltas, gauges keep the last value, and histograms
//! count observations into fixed buckets. State is cumulative for the life
//! of the process; a snapshot copies it under a short lock so scrapes never
//! block metric updates for long.

use crate::models::{HistogramBucket, HistogramData, MetricKind, MetricPoint};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Default histogram bucket bounds, in seconds.
pub const DEFAULT_BUCKETS: [f64; 11] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

type SeriesKey = (String, Vec<(String, String)>);

#[derive(Debug, Clone)]
enum SeriesState {
    Counter(f64),
    Gauge(f64),
    Histogram { counts: Vec<u64>, sum: f64, count: u64 },
}

#[derive(Debug, Clone)]
struct Series {
    kind: MetricKind,
    description: Option<String>,
    unit: Option<String>,
    state: SeriesState,
}

/// Aggregated value of one series.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SeriesValue {
    /// Sum of all counter deltas.
    Counter(f64),
    /// Last recorded gauge value.
    Gauge(f64),
    /// Cumulative histogram buckets.
    Histogram(HistogramData),
}

/// One series in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesSnapshot {
    /// Metric name.
    pub name: String,
    /// Metric kind.
    pub kind: MetricKind,
    /// Description from the first point that carried one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Unit from the first point that carried one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Attributes identifying the series.
    pub attributes: BTreeMap<String, String>,
    /// Aggregated value.
    pub value: SeriesValue,
}

/// Point-in-time copy of all aggregated series, sorted by name then
/// attributes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSnapshot {
    /// When the snapshot was taken.
    pub taken_at: DateTime<Utc>,
    /// All series.
    pub series: Vec<SeriesSnapshot>,
}

impl MetricSnapshot {
    /// Finds the series with exactly the given name and attributes.
    #[must_use]
    pub fn find(&self, name: &str, attributes: &[(&str, &str)]) -> Option<&SeriesSnapshot> {
        self.series.iter().find(|s| {
            s.name == name
                && s.attributes.len() == attributes.len()
                && attributes
                    .iter()
                    .all(|(k, v)| s.attributes.get(*k).is_some_and(|actual| actual == v))
        })
    }

    /// Returns the value of a counter series.
    #[must_use]
    pub fn counter_value(&self, name: &str, attributes: &[(&str, &str)]) -> Option<f64> {
        match self.find(name, attributes)?.value {
            SeriesValue::Counter(value) => Some(value),
            _ => None,
        }
    }
}

/// Thread-safe metric aggregator.
#[derive(Debug)]
pub struct MetricAggregator {
    bounds: Vec<f64>,
    series: Mutex<BTreeMap<SeriesKey, Series>>,
}

impl Default for MetricAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricAggregator {
    /// Creates an aggregator using [`DEFAULT_BUCKETS`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_buckets(DEFAULT_BUCKETS.to_vec())
    }

    /// Creates an aggregator with custom histogram bounds.
    ///
    /// Non-finite bounds are discarded; the rest are sorted and deduplicated.
    #[must_use]
    pub fn with_buckets(mut bounds: Vec<f64>) -> Self {
        bounds.retain(|b| b.is_finite());
        bounds.sort_by(f64::total_cmp);
        bounds.dedup();
        Self {
            bounds,
            series: Mutex::new(BTreeMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<SeriesKey, Series>> {
        self.series.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Folds a point into its series.
    ///
    /// Returns false if the point is invalid or its kind conflicts with an
    /// existing series of the same name under any attributes; such points
    /// are dropped. A metric family carries a single kind.
    pub fn record(&self, point: &MetricPoint) -> bool {
        if let Err(error) = point.validate_point() {
            tracing::debug!(metric = %point.name, %error, "Dropping invalid metric point");
            return false;
        }

        let key: SeriesKey = (
            point.name.clone(),
            point
                .attributes
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        );

        let mut series = self.lock();
        // keys sort by name first, so this is the family's first series
        let family_kind = series
            .range((point.name.clone(), Vec::new())..)
            .next()
            .filter(|((name, _), _)| *name == point.name)
            .map(|(_, existing)| existing.kind);
        if let Some(existing) = family_kind.filter(|kind| *kind != point.kind) {
            tracing::warn!(
                metric = %point.name,
                %existing,
                received = %point.kind,
                "Dropping metric point with conflicting kind"
            );
            return false;
        }

        let entry = series.entry(key).or_insert_with(|| Series {
            kind: point.kind,
            description: point.description.clone(),
            unit: point.unit.clone(),
            state: match point.kind {
                MetricKind::Counter => SeriesState::Counter(0.0),
                MetricKind::Gauge => SeriesState::Gauge(0.0),
                MetricKind::Histogram => SeriesState::Histogram {
                    counts: vec![0; self.bounds.len()],
                    sum: 0.0,
                    count: 0,
                },
            },
        });

        match &mut entry.state {
            SeriesState::Counter(total) => *total += point.value,
            SeriesState::Gauge(value) => *value = point.value,
            SeriesState::Histogram { counts, sum, count } => {
                if let Some(index) = self.bounds.iter().position(|b| point.value <= *b) {
                    counts[index] += 1;
                }
                *sum += point.value;
                *count += 1;
            }
        }
        true
    }

    /// Returns the number of distinct series.
    #[must_use]
    pub fn series_count(&self) -> usize {
        self.lock().len()
    }

    /// Copies the current state.
    #[must_use]
    pub fn snapshot(&self) -> MetricSnapshot {
        let series = self.lock().clone();

        let series = series
            .into_iter()
            .map(|((name, attributes), series)| SeriesSnapshot {
                name,
                kind: series.kind,
                description: series.description,
                unit: series.unit,
                attributes: attributes.into_iter().collect(),
                value: match series.state {
                    SeriesState::Counter(total) => SeriesValue::Counter(total),
                    SeriesState::Gauge(value) => SeriesValue::Gauge(value),
                    SeriesState::Histogram { counts, sum, count } => {
                        let mut cumulative = 0;
                        let buckets = self
                            .bounds
                            .iter()
                            .zip(counts)
                            .map(|(bound, n)| {
                                cumulative += n;
                                HistogramBucket {
                                    upper_bound: *bound,
                                    count: cumulative,
                                }
                            })
                            .collect();
                        SeriesValue::Histogram(HistogramData {
                            buckets,
                            sum,
                            count,
                        })
                    }
                },
            })
            .collect();

        MetricSnapshot {
            taken_at: Utc::now(),
            series,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_accumulates_deltas() {
        let aggregator = MetricAggregator::new();
        aggregator.record(&MetricPoint::counter("ops_total", 1.0).with_attribute("outcome", "ok"));
        aggregator.record(&MetricPoint::counter("ops_total", 2.0).with_attribute("outcome", "ok"));
        aggregator.record(&MetricPoint::counter("ops_total", 1.0).with_attribute("outcome", "err"));

        let snapshot = aggregator.snapshot();

        assert_eq!(snapshot.counter_value("ops_total", &[("outcome", "ok")]), Some(3.0));
        assert_eq!(snapshot.counter_value("ops_total", &[("outcome", "err")]), Some(1.0));
        assert_eq!(aggregator.series_count(), 2);
    }

    #[test]
    fn test_gauge_keeps_last_value() {
        let aggregator = MetricAggregator::new();
        aggregator.record(&MetricPoint::gauge("queue_depth", 5.0));
        aggregator.record(&MetricPoint::gauge("queue_depth", 2.0));

        let snapshot = aggregator.snapshot();
        assert_eq!(
            snapshot.find("queue_depth", &[]).unwrap().value,
            SeriesValue::Gauge(2.0)
        );
    }

    #[test]
    fn test_histogram_buckets_are_cumulative() {
        let aggregator = MetricAggregator::with_buckets(vec![1.0, 0.1, f64::NAN]);
        for value in [0.05, 0.5, 0.7, 3.0] {
            aggregator.record(&MetricPoint::histogram("latency_seconds", value));
        }

        let snapshot = aggregator.snapshot();
        let SeriesValue::Histogram(data) = &snapshot.find("latency_seconds", &[]).unwrap().value
        else {
            panic!("expected histogram");
        };

        assert_eq!(data.count, 4);
        assert!((data.sum - 4.25).abs() < 1e-9);
        assert_eq!(data.buckets.len(), 2);
        assert_eq!(data.buckets[0].upper_bound, 0.1);
        assert_eq!(data.buckets[0].count, 1);
        assert_eq!(data.buckets[1].count, 3);
    }

    #[test]
    fn test_conflicting_kind_is_dropped() {
        let aggregator = MetricAggregator::new();
        assert!(aggregator.record(&MetricPoint::counter("mixed", 1.0)));
        assert!(!aggregator.record(&MetricPoint::gauge("mixed", 9.0)));

        assert_eq!(aggregator.snapshot().counter_value("mixed", &[]), Some(1.0));
    }

    #[test]
    fn test_conflicting_kind_under_other_labels_is_dropped() {
        let aggregator = MetricAggregator::new();
        assert!(aggregator.record(&MetricPoint::gauge("depth", 3.0).with_attribute("queue", "b")));
        assert!(!aggregator.record(&MetricPoint::counter("depth", 1.0).with_attribute("queue", "a")));
        assert!(!aggregator.record(&MetricPoint::counter("depth", 1.0)));
        // neighbouring names are separate families
        assert!(aggregator.record(&MetricPoint::counter("depth_total", 1.0)));

        let snapshot = aggregator.snapshot();
        assert_eq!(snapshot.series.iter().filter(|s| s.name == "depth").count(), 1);
        assert!(snapshot.find("depth", &[("queue", "a")]).is_none());
    }

    #[test]
    fn test_invalid_point_is_dropped() {
        let aggregator = MetricAggregator::new();
        assert!(!aggregator.record(&MetricPoint::counter("bad name", 1.0)));
        assert!(!aggregator.record(&MetricPoint::counter("ops_total", -1.0)));
        assert_eq!(aggregator.series_count(), 0);
    }

    #[test]
    fn test_snapshot_is_independent_of_later_updates() {
        let aggregator = MetricAggregator::new();
        aggregator.record(&MetricPoint::counter("ops_total", 1.0));
        let snapshot = aggregator.snapshot();
        aggregator.record(&MetricPoint::counter("ops_total", 1.0));

        assert_eq!(snapshot.counter_value("ops_total", &[]), Some(1.0));
        assert_eq!(aggregator.snapshot().counter_value("ops_total", &[]), Some(2.0));
    }

    #[test]
    fn test_concurrent_updates_and_snapshots() {
        let aggregator = std::sync::Arc::new(MetricAggregator::new());
        let writers: Vec<_> = (0..4)
            .map(|_| {
                let aggregator = std::sync::Arc::clone(&aggregator);
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        aggregator.record(&MetricPoint::counter("ops_total", 1.0));
                        let _ = aggregator.snapshot();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        assert_eq!(
            aggregator.snapshot().counter_value("ops_total", &[]),
            Some(1000.0)
        );
    }
}

//! Exporter registry: fans telemetry out to the sinks of each signal.

use super::console::ConsoleSink;
use super::http::HttpSink;
use super::otlp::OtlpEncoding;
use super::tcp::TcpLineSink;
use super::worker::{SinkStats, SinkWorker};
use super::{ExportItem, MetricAggregator, MetricSnapshot, SignalType, Sink};
use crate::config::{ExportMode, ExportSettings, SinkConfig, TransportProtocol};
use crate::error::TelemetryError;
use crate::models::{LogRecord, MetricPoint, Span};
use crate::resource::ResourceDescriptor;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::task::JoinSet;

/// Routes exported items to every sink registered for their signal.
///
/// Cloning is cheap; clones share the same sinks. Producer methods never
/// block and never fail: delivery problems stay inside the sink's worker.
#[derive(Clone)]
pub struct ExporterRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    resource: ResourceDescriptor,
    settings: ExportSettings,
    workers: RwLock<HashMap<SignalType, Vec<SinkWorker>>>,
    aggregator: RwLock<Option<Arc<MetricAggregator>>>,
    shut_down: AtomicBool,
}

impl std::fmt::Debug for ExporterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExporterRegistry")
            .field("service", &self.inner.resource.service_name())
            .field("sinks", &self.sink_count())
            .field("scrape_enabled", &self.scrape_enabled())
            .finish()
    }
}

impl ExporterRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(resource: ResourceDescriptor, settings: ExportSettings) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                resource,
                settings,
                workers: RwLock::new(HashMap::new()),
                aggregator: RwLock::new(None),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    /// Returns the export settings.
    #[must_use]
    pub fn settings(&self) -> &ExportSettings {
        &self.inner.settings
    }

    /// Returns the resource attached to every batch.
    #[must_use]
    pub fn resource(&self) -> &ResourceDescriptor {
        &self.inner.resource
    }

    /// Builds and registers a sink from configuration.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the configuration is invalid for the
    /// signal, or if the sink's client cannot be built.
    pub fn register(&self, signal: SignalType, config: &SinkConfig) -> Result<(), TelemetryError> {
        if config.signal != signal {
            return Err(TelemetryError::invalid_config(format!(
                "sink configured for {} registered as {signal}",
                config.signal
            )));
        }
        config.validate_sink()?;

        if config.mode == ExportMode::Pull {
            self.enable_scrape();
            return Ok(());
        }

        let endpoint = config.endpoint.as_deref().unwrap_or_default();
        let sink: Arc<dyn Sink> = match config.protocol {
            TransportProtocol::Console => Arc::new(ConsoleSink::stdout(format!("console-{signal}"))),
            TransportProtocol::HttpJson => Arc::new(HttpSink::new(
                format!("http-{signal}"),
                endpoint,
                self.inner.settings.export_timeout(),
            )?),
            TransportProtocol::HttpProtobuf => Arc::new(
                HttpSink::new(
                    format!("http-{signal}"),
                    endpoint,
                    self.inner.settings.export_timeout(),
                )?
                .with_encoding(OtlpEncoding::Protobuf),
            ),
            TransportProtocol::TcpJsonLines => {
                Arc::new(TcpLineSink::new(format!("tcp-{signal}"), endpoint))
            }
            TransportProtocol::Prometheus => {
                return Err(TelemetryError::invalid_config(format!(
                    "protocol {} cannot be used as a push sink",
                    config.protocol
                )));
            }
        };

        self.register_sink(signal, sink);
        Ok(())
    }

    /// Registers an already built sink and starts its worker.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn register_sink(&self, signal: SignalType, sink: Arc<dyn Sink>) {
        let worker = SinkWorker::spawn(
            signal,
            sink,
            self.inner.resource.clone(),
            &self.inner.settings,
        );
        tracing::debug!(sink = %worker.name(), %signal, "Registered sink");
        self.inner
            .workers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(signal)
            .or_default()
            .push(worker);
    }

    /// Enables the pull path for metrics. Idempotent.
    pub fn enable_scrape(&self) {
        let mut aggregator = self
            .inner
            .aggregator
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if aggregator.is_none() {
            *aggregator = Some(Arc::new(MetricAggregator::new()));
        }
    }

    /// Returns true if metrics can be scraped.
    #[must_use]
    pub fn scrape_enabled(&self) -> bool {
        self.aggregator().is_some()
    }

    fn aggregator(&self) -> Option<Arc<MetricAggregator>> {
        self.inner
            .aggregator
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Hands a finished span to the trace sinks.
    pub fn export_span(&self, span: impl Into<Arc<Span>>) {
        self.fan_out(&ExportItem::Span(span.into()));
    }

    /// Hands a log record to the log sinks.
    pub fn export_log(&self, record: impl Into<Arc<LogRecord>>) {
        self.fan_out(&ExportItem::Log(record.into()));
    }

    /// Folds a metric point into the scrape state (if enabled) and hands it
    /// to the metric push sinks.
    pub fn export_metric_delta(&self, point: MetricPoint) {
        if self.inner.shut_down.load(Ordering::Acquire) {
            return;
        }
        if let Some(aggregator) = self.aggregator() {
            aggregator.record(&point);
        }
        self.fan_out(&ExportItem::Metric(Arc::new(point)));
    }

    fn fan_out(&self, item: &ExportItem) {
        if self.inner.shut_down.load(Ordering::Acquire) {
            return;
        }
        let workers = self
            .inner
            .workers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(workers) = workers.get(&item.signal()) {
            for worker in workers {
                worker.offer(item.clone());
            }
        }
    }

    /// Reads the aggregated state of a pull signal.
    ///
    /// Returns `None` for signals without a pull path, or for metrics when
    /// scraping is disabled.
    #[must_use]
    pub fn scrape(&self, signal: SignalType) -> Option<MetricSnapshot> {
        match signal {
            SignalType::Metrics => self.aggregator().map(|a| a.snapshot()),
            SignalType::Traces | SignalType::Logs => None,
        }
    }

    /// Returns the number of push sinks registered for `signal`.
    #[must_use]
    pub fn sink_count_for(&self, signal: SignalType) -> usize {
        self.inner
            .workers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&signal)
            .map_or(0, Vec::len)
    }

    /// Returns the total number of push sinks.
    #[must_use]
    pub fn sink_count(&self) -> usize {
        SignalType::ALL.iter().map(|s| self.sink_count_for(*s)).sum()
    }

    /// Returns delivery statistics of every push sink.
    #[must_use]
    pub fn sink_stats(&self) -> Vec<SinkStats> {
        let workers = self
            .inner
            .workers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        SignalType::ALL
            .iter()
            .filter_map(|signal| workers.get(signal))
            .flatten()
            .map(SinkWorker::stats)
            .collect()
    }

    fn all_workers(&self) -> Vec<SinkWorker> {
        self.inner
            .workers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .flatten()
            .cloned()
            .collect()
    }

    /// Exports everything queued so far on every sink.
    ///
    /// Returns false if any sink did not finish within `timeout`.
    pub async fn force_flush(&self, timeout: Duration) -> bool {
        let mut tasks = JoinSet::new();
        for worker in self.all_workers() {
            tasks.spawn(async move { worker.flush().await });
        }
        join_all_within(tasks, timeout).await
    }

    /// Flushes and shuts down every sink, then stops accepting items.
    ///
    /// Bounded by `timeout`; sinks still busy when it elapses are abandoned.
    /// Calls after the first return true without doing anything.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        if self.inner.shut_down.swap(true, Ordering::AcqRel) {
            return true;
        }

        let workers = self.all_workers();
        let mut tasks = JoinSet::new();
        for worker in workers.clone() {
            tasks.spawn(async move { worker.shutdown().await });
        }
        let clean = join_all_within(tasks, timeout).await;

        for stats in workers.iter().map(SinkWorker::stats) {
            if stats.dropped > 0 || stats.failed_batches > 0 {
                tracing::warn!(
                    sink = %stats.name,
                    signal = %stats.signal,
                    exported = stats.exported,
                    failed_batches = stats.failed_batches,
                    dropped = stats.dropped,
                    "Sink lost telemetry"
                );
            }
        }
        if !clean {
            tracing::warn!(
                timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                "Exporter shutdown timed out"
            );
        }
        clean
    }
}

async fn join_all_within(mut tasks: JoinSet<bool>, timeout: Duration) -> bool {
    let all = async {
        let mut ok = true;
        while let Some(result) = tasks.join_next().await {
            ok &= result.unwrap_or(false);
        }
        ok
    };
    tokio::time::timeout(timeout, all).await.unwrap_or(false)
}

//! Per-sink batching worker.
//!
//! Each push sink gets a bounded queue and a task that drains it. Items are
//! exported when the batch is full, when the scheduled delay elapses, or on
//! an explicit flush, which also flushes the sink itself. Producers only ever `try_send`: a full queue drops the
//! item and bumps the sink's drop counter.

use super::{ExportBatch, ExportItem, SignalType, Sink};
use crate::config::ExportSettings;
use crate::resource::ResourceDescriptor;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

pub(crate) enum WorkerMessage {
    Export(ExportItem),
    Flush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

#[derive(Debug, Default)]
struct SinkCounters {
    exported: AtomicU64,
    failed_batches: AtomicU64,
    dropped: AtomicU64,
}

/// Delivery statistics of one sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SinkStats {
    /// Sink name.
    pub name: String,
    /// Signal the sink is registered for.
    pub signal: SignalType,
    /// Items delivered successfully.
    pub exported: u64,
    /// Batches the sink failed to deliver.
    pub failed_batches: u64,
    /// Items dropped because the queue was full or closed.
    pub dropped: u64,
}

/// Producer-side handle of a running worker.
#[derive(Clone)]
pub(crate) struct SinkWorker {
    name: String,
    signal: SignalType,
    tx: mpsc::Sender<WorkerMessage>,
    counters: Arc<SinkCounters>,
}

impl SinkWorker {
    /// Spawns the worker task for `sink` on the current Tokio runtime.
    pub(crate) fn spawn(
        signal: SignalType,
        sink: Arc<dyn Sink>,
        resource: ResourceDescriptor,
        settings: &ExportSettings,
    ) -> Self {
        let (tx, rx) = mpsc::channel(settings.queue_capacity.max(1));
        let counters = Arc::new(SinkCounters::default());
        let name = sink.name().to_string();

        let task = WorkerTask {
            signal,
            sink,
            resource,
            counters: Arc::clone(&counters),
            max_batch_size: settings.max_batch_size.max(1),
            scheduled_delay: settings.scheduled_delay(),
            export_timeout: settings.export_timeout(),
            buffer: Vec::new(),
        };
        tokio::spawn(task.run(rx));

        Self {
            name,
            signal,
            tx,
            counters,
        }
    }

    /// Enqueues an item without waiting.
    pub(crate) fn offer(&self, item: ExportItem) {
        if self.tx.try_send(WorkerMessage::Export(item)).is_err()
            && self.counters.dropped.fetch_add(1, Ordering::Relaxed) == 0
        {
            tracing::warn!(
                sink = %self.name,
                signal = %self.signal,
                "Export queue full or closed, dropping items; further drops are only counted"
            );
        }
    }

    /// Asks the worker to export everything queued so far.
    ///
    /// Returns false if the worker is gone.
    pub(crate) async fn flush(&self) -> bool {
        let (ack, done) = oneshot::channel();
        if self.tx.send(WorkerMessage::Flush(ack)).await.is_err() {
            return false;
        }
        done.await.is_ok()
    }

    /// Asks the worker to export everything queued, shut the sink down, and
    /// exit.
    pub(crate) async fn shutdown(&self) -> bool {
        let (ack, done) = oneshot::channel();
        if self.tx.send(WorkerMessage::Shutdown(ack)).await.is_err() {
            return false;
        }
        done.await.is_ok()
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn stats(&self) -> SinkStats {
        SinkStats {
            name: self.name.clone(),
            signal: self.signal,
            exported: self.counters.exported.load(Ordering::Relaxed),
            failed_batches: self.counters.failed_batches.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }
}

struct WorkerTask {
    signal: SignalType,
    sink: Arc<dyn Sink>,
    resource: ResourceDescriptor,
    counters: Arc<SinkCounters>,
    max_batch_size: usize,
    scheduled_delay: Duration,
    export_timeout: Duration,
    buffer: Vec<ExportItem>,
}

impl WorkerTask {
    async fn run(mut self, mut rx: mpsc::Receiver<WorkerMessage>) {
        let mut ticker = tokio::time::interval(self.scheduled_delay);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                message = rx.recv() => match message {
                    Some(WorkerMessage::Export(item)) => {
                        self.buffer.push(item);
                        if self.buffer.len() >= self.max_batch_size {
                            self.export_buffered().await;
                        }
                    }
                    Some(WorkerMessage::Flush(ack)) => {
                        self.export_buffered().await;
                        self.flush_sink().await;
                        let _ = ack.send(());
                    }
                    Some(WorkerMessage::Shutdown(ack)) => {
                        self.export_buffered().await;
                        self.flush_sink().await;
                        self.shutdown_sink().await;
                        let _ = ack.send(());
                        break;
                    }
                    None => {
                        self.export_buffered().await;
                        self.shutdown_sink().await;
                        break;
                    }
                },
                _ = ticker.tick() => self.export_buffered().await,
            }
        }

        tracing::debug!(sink = %self.sink.name(), signal = %self.signal, "Export worker stopped");
    }

    async fn export_buffered(&mut self) {
        while !self.buffer.is_empty() {
            let take = self.buffer.len().min(self.max_batch_size);
            let items: Vec<ExportItem> = self.buffer.drain(..take).collect();
            self.export_batch(items).await;
        }
    }

    async fn export_batch(&self, items: Vec<ExportItem>) {
        let batch = ExportBatch {
            signal: self.signal,
            resource: self.resource.clone(),
            items,
        };
        let count = batch.len() as u64;

        match tokio::time::timeout(self.export_timeout, self.sink.export(&batch)).await {
            Ok(Ok(())) => {
                self.counters.exported.fetch_add(count, Ordering::Relaxed);
            }
            Ok(Err(error)) => {
                self.counters.failed_batches.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    sink = %self.sink.name(),
                    signal = %self.signal,
                    items = count,
                    %error,
                    "Failed to export batch"
                );
            }
            Err(_) => {
                self.counters.failed_batches.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    sink = %self.sink.name(),
                    signal = %self.signal,
                    items = count,
                    timeout_ms = u64::try_from(self.export_timeout.as_millis()).unwrap_or(u64::MAX),
                    "Export timed out"
                );
            }
        }
    }

    async fn flush_sink(&self) {
        match tokio::time::timeout(self.export_timeout, self.sink.flush()).await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                tracing::warn!(sink = %self.sink.name(), %error, "Sink flush failed");
            }
            Err(_) => tracing::warn!(sink = %self.sink.name(), "Sink flush timed out"),
        }
    }

    async fn shutdown_sink(&self) {
        if let Err(error) = self.sink.shutdown().await {
            tracing::warn!(sink = %self.sink.name(), %error, "Sink shutdown failed");
        }
    }
}

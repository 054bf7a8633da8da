//! In-memory sink for tests and local inspection.

use super::{ExportBatch, ExportItem, Sink};
use crate::error::ExportError;
use crate::models::{LogRecord, MetricPoint, Span};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Keeps every exported item. Clones share the same storage, so a test can
/// register one clone and inspect another.
#[derive(Debug, Clone)]
pub struct InMemorySink {
    name: String,
    items: Arc<Mutex<Vec<ExportItem>>>,
    batches: Arc<AtomicUsize>,
}

impl InMemorySink {
    /// Creates an empty sink.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: Arc::new(Mutex::new(Vec::new())),
            batches: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ExportItem>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the exported spans in arrival order.
    #[must_use]
    pub fn spans(&self) -> Vec<Arc<Span>> {
        self.lock()
            .iter()
            .filter_map(|item| match item {
                ExportItem::Span(span) => Some(Arc::clone(span)),
                _ => None,
            })
            .collect()
    }

    /// Returns the exported log records in arrival order.
    #[must_use]
    pub fn logs(&self) -> Vec<Arc<LogRecord>> {
        self.lock()
            .iter()
            .filter_map(|item| match item {
                ExportItem::Log(record) => Some(Arc::clone(record)),
                _ => None,
            })
            .collect()
    }

    /// Returns the exported metric points in arrival order.
    #[must_use]
    pub fn metrics(&self) -> Vec<Arc<MetricPoint>> {
        self.lock()
            .iter()
            .filter_map(|item| match item {
                ExportItem::Metric(point) => Some(Arc::clone(point)),
                _ => None,
            })
            .collect()
    }

    /// Returns the number of batches received.
    #[must_use]
    pub fn batch_count(&self) -> usize {
        self.batches.load(Ordering::Relaxed)
    }

    /// Forgets everything received so far.
    pub fn reset(&self) {
        self.lock().clear();
        self.batches.store(0, Ordering::Relaxed);
    }
}

#[async_trait]
impl Sink for InMemorySink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn export(&self, batch: &ExportBatch) -> Result<(), ExportError> {
        self.lock().extend(batch.items.iter().cloned());
        self.batches.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

//! Console sink: one JSON object per line.

use super::{ExportBatch, Sink};
use crate::error::ExportError;
use async_trait::async_trait;
use serde::Serialize;
use std::io::Write;
use std::sync::{Mutex, PoisonError};

#[derive(Serialize)]
struct ConsoleLine<'a, T: Serialize> {
    signal: super::SignalType,
    service: &'a str,
    item: &'a T,
}

/// Writes every item as a JSON line to stdout or a custom writer.
pub struct ConsoleSink {
    name: String,
    writer: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleSink {
    /// Creates a sink writing to stdout.
    #[must_use]
    pub fn stdout(name: impl Into<String>) -> Self {
        Self::with_writer(name, std::io::stdout())
    }

    /// Creates a sink writing to `writer`.
    pub fn with_writer(name: impl Into<String>, writer: impl Write + Send + 'static) -> Self {
        Self {
            name: name.into(),
            writer: Mutex::new(Box::new(writer)),
        }
    }
}

#[async_trait]
impl Sink for ConsoleSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn export(&self, batch: &ExportBatch) -> Result<(), ExportError> {
        let mut out = Vec::new();
        for item in &batch.items {
            serde_json::to_writer(
                &mut out,
                &ConsoleLine {
                    signal: batch.signal,
                    service: batch.resource.service_name(),
                    item,
                },
            )?;
            out.push(b'\n');
        }

        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writer.write_all(&out)?;
        writer.flush()?;
        Ok(())
    }

    async fn flush(&self) -> Result<(), ExportError> {
        self.writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .flush()?;
        Ok(())
    }
}

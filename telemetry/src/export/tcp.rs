//! TCP line sink for log shippers (Logstash `json_lines` and the like).

use super::{ExportBatch, Sink};
use crate::error::ExportError;
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

/// Writes each item as a JSON line over a lazily opened TCP connection.
///
/// A write failure drops the connection; the next batch reconnects.
pub struct TcpLineSink {
    name: String,
    addr: String,
    stream: Mutex<Option<TcpStream>>,
}

impl TcpLineSink {
    /// Creates a sink for `addr` (`host:port`). Nothing is connected until
    /// the first export.
    pub fn new(name: impl Into<String>, addr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            addr: addr.into(),
            stream: Mutex::new(None),
        }
    }

    /// Returns the target address.
    #[must_use]
    pub fn addr(&self) -> &str {
        &self.addr
    }
}

#[async_trait]
impl Sink for TcpLineSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn export(&self, batch: &ExportBatch) -> Result<(), ExportError> {
        let mut payload = Vec::new();
        for item in &batch.items {
            serde_json::to_writer(&mut payload, item)?;
            payload.push(b'\n');
        }

        let mut guard = self.stream.lock().await;
        if guard.is_none() {
            let stream = TcpStream::connect(&self.addr)
                .await
                .map_err(|e| ExportError::Unreachable(format!("{}: {e}", self.addr)))?;
            *guard = Some(stream);
        }

        let Some(stream) = guard.as_mut() else {
            return Err(ExportError::Unreachable(self.addr.clone()));
        };
        if let Err(error) = stream.write_all(&payload).await {
            *guard = None;
            return Err(error.into());
        }
        Ok(())
    }

    async fn flush(&self) -> Result<(), ExportError> {
        let mut guard = self.stream.lock().await;
        if let Some(stream) = guard.as_mut() {
            if let Err(error) = stream.flush().await {
                *guard = None;
                return Err(error.into());
            }
        }
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ExportError> {
        if let Some(mut stream) = self.stream.lock().await.take() {
            stream.shutdown().await?;
        }
        Ok(())
    }
}

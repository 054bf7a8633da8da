//! HTTP push sink: POSTs each batch as an OTLP/HTTP export request.

use super::otlp::{OtlpEncoding, OtlpRequest};
use super::{ExportBatch, Sink};
use crate::error::{ExportError, TelemetryError};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::time::Duration;

/// Pushes batches to an OTLP/HTTP endpoint such as
/// `http://collector:4318/v1/traces`.
#[derive(Debug, Clone)]
pub struct HttpSink {
    name: String,
    endpoint: String,
    encoding: OtlpEncoding,
    client: Client,
}

impl HttpSink {
    /// Creates a sink for `endpoint`. Requests are bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the HTTP client cannot be built.
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, TelemetryError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TelemetryError::invalid_config(format!("http client: {e}")))?;

        Ok(Self {
            name: name.into(),
            endpoint: endpoint.into(),
            encoding: OtlpEncoding::default(),
            client,
        })
    }

    /// Sets the body encoding. Defaults to OTLP/JSON.
    #[must_use]
    pub fn with_encoding(mut self, encoding: OtlpEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Returns the body encoding.
    #[must_use]
    pub fn encoding(&self) -> OtlpEncoding {
        self.encoding
    }

    /// Returns the target endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Sink for HttpSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn export(&self, batch: &ExportBatch) -> Result<(), ExportError> {
        let body = OtlpRequest::from_batch(batch).encode(self.encoding)?;
        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, self.encoding.content_type())
            .body(body)
            .send()
            .await
            .map_err(|e| ExportError::Unreachable(format!("{}: {e}", self.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ExportError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        Ok(())
    }
}

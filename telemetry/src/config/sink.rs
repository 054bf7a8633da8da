//! Sink configuration.

use crate::error::TelemetryError;
use crate::export::SignalType;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use validator::Validate;

/// Wire protocol of a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportProtocol {
    /// JSON lines on stdout.
    #[serde(rename = "console")]
    Console,
    /// OTLP/JSON POSTed over HTTP.
    #[serde(rename = "http/json")]
    HttpJson,
    /// OTLP protobuf POSTed over HTTP.
    #[serde(rename = "http/protobuf")]
    HttpProtobuf,
    /// Newline-delimited JSON over TCP.
    #[serde(rename = "tcp")]
    TcpJsonLines,
    /// Prometheus text exposition, pulled by a scraper.
    #[serde(rename = "prometheus")]
    Prometheus,
}

impl std::fmt::Display for TransportProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Console => "console",
            Self::HttpJson => "http/json",
            Self::HttpProtobuf => "http/protobuf",
            Self::TcpJsonLines => "tcp",
            Self::Prometheus => "prometheus",
        };
        f.write_str(name)
    }
}

impl FromStr for TransportProtocol {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "console" | "stdout" => Ok(Self::Console),
            "http/json" | "json" => Ok(Self::HttpJson),
            "http/protobuf" | "protobuf" | "grpc" => Ok(Self::HttpProtobuf),
            "tcp" | "json_lines" => Ok(Self::TcpJsonLines),
            "prometheus" => Ok(Self::Prometheus),
            other => Err(TelemetryError::invalid_config(format!(
                "unknown transport protocol: {other}"
            ))),
        }
    }
}

/// Whether the sink receives items (push) or is read by a scraper (pull).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportMode {
    /// Items are sent to the sink.
    #[default]
    Push,
    /// Aggregated state is read on demand.
    Pull,
}

/// Configuration of one sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Signal the sink receives.
    pub signal: SignalType,
    /// URL for HTTP sinks, `host:port` for TCP sinks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Wire protocol.
    pub protocol: TransportProtocol,
    /// Push or pull.
    #[serde(default)]
    pub mode: ExportMode,
}

#[derive(Validate)]
struct HttpEndpoint {
    #[validate(url(message = "Endpoint must be a valid URL"))]
    url: String,
}

impl SinkConfig {
    /// Console sink for `signal`.
    #[must_use]
    pub fn console(signal: SignalType) -> Self {
        Self {
            signal,
            endpoint: None,
            protocol: TransportProtocol::Console,
            mode: ExportMode::Push,
        }
    }

    /// HTTP/JSON push sink for `signal`.
    #[must_use]
    pub fn http_json(signal: SignalType, endpoint: impl Into<String>) -> Self {
        Self {
            signal,
            endpoint: Some(endpoint.into()),
            protocol: TransportProtocol::HttpJson,
            mode: ExportMode::Push,
        }
    }

    /// HTTP/protobuf push sink for `signal`.
    #[must_use]
    pub fn http_protobuf(signal: SignalType, endpoint: impl Into<String>) -> Self {
        Self {
            protocol: TransportProtocol::HttpProtobuf,
            ..Self::http_json(signal, endpoint)
        }
    }

    /// TCP line sink for `signal`.
    #[must_use]
    pub fn tcp(signal: SignalType, addr: impl Into<String>) -> Self {
        Self {
            signal,
            endpoint: Some(addr.into()),
            protocol: TransportProtocol::TcpJsonLines,
            mode: ExportMode::Push,
        }
    }

    /// Prometheus scrape sink for metrics.
    #[must_use]
    pub fn scrape() -> Self {
        Self {
            signal: SignalType::Metrics,
            endpoint: None,
            protocol: TransportProtocol::Prometheus,
            mode: ExportMode::Pull,
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if:
    /// - pull mode is used for anything but Prometheus metrics
    /// - an HTTP sink has a missing or malformed URL
    /// - a TCP sink has a missing or malformed `host:port`
    pub fn validate_sink(&self) -> Result<(), TelemetryError> {
        match (self.mode, self.protocol) {
            (ExportMode::Pull, TransportProtocol::Prometheus) => {
                if self.signal != SignalType::Metrics {
                    return Err(TelemetryError::invalid_config(format!(
                        "pull export is only supported for metrics, not {}",
                        self.signal
                    )));
                }
                Ok(())
            }
            (ExportMode::Pull, protocol) => Err(TelemetryError::invalid_config(format!(
                "protocol {protocol} does not support pull export"
            ))),
            (ExportMode::Push, TransportProtocol::Prometheus) => Err(
                TelemetryError::invalid_config("prometheus sinks are pull only"),
            ),
            (ExportMode::Push, TransportProtocol::HttpJson | TransportProtocol::HttpProtobuf) => {
                let url = self.endpoint.clone().ok_or_else(|| {
                    TelemetryError::invalid_config(format!("{} http sink needs an endpoint", self.signal))
                })?;
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(TelemetryError::invalid_config(format!(
                        "endpoint must use http or https: {url}"
                    )));
                }
                HttpEndpoint { url }.validate()?;
                Ok(())
            }
            (ExportMode::Push, TransportProtocol::TcpJsonLines) => {
                let addr = self.endpoint.as_deref().ok_or_else(|| {
                    TelemetryError::invalid_config(format!("{} tcp sink needs an address", self.signal))
                })?;
                validate_host_port(addr)
            }
            (ExportMode::Push, TransportProtocol::Console) => Ok(()),
        }
    }
}

fn validate_host_port(addr: &str) -> Result<(), TelemetryError> {
    let invalid = || TelemetryError::invalid_config(format!("expected host:port, got {addr:?}"));
    let (host, port) = addr.rsplit_once(':').ok_or_else(invalid)?;
    if host.is_empty() || port.parse::<u16>().map_or(true, |p| p == 0) {
        return Err(invalid());
    }
    Ok(())
}

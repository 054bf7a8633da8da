//! Paylog CLI
//!
//! Command-line client for the Paylog demo service.
//!
//! # Usage
//!
//! ```bash
//! paylog --help
//! paylog health
//! paylog generate
//! paylog generate --error
//! paylog scrape
//! paylog config
//! ```

#![deny(unsafe_code)]

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use reqwest::{Client, StatusCode};
use telemetry::config::TelemetryConfig;
use tracing_subscriber::EnvFilter;

/// Paylog CLI - client for the payment-log demo service
#[derive(Parser)]
#[command(name = "paylog")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// API server URL
    #[arg(short, long, env = "PAYLOG_URL", default_value = "http://localhost:8080")]
    url: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check API server health
    Health,
    /// Trigger one payment log generation
    Generate {
        /// Call the demo error route instead
        #[arg(long)]
        error: bool,
    },
    /// Print the Prometheus exposition of the server
    Scrape,
    /// Print the telemetry configuration resolved from the environment
    Config,
}

impl Commands {
    fn path(&self) -> Option<&'static str> {
        match self {
            Self::Health => Some("/health"),
            Self::Generate { error: false } => Some("/paymentlog"),
            Self::Generate { error: true } => Some("/error"),
            Self::Scrape => Some("/metrics"),
            Self::Config => None,
        }
    }
}

fn endpoint(base: &str, path: &str) -> String {
    format!("{}{path}", base.trim_end_matches('/'))
}

async fn fetch(client: &Client, url: &str) -> Result<(StatusCode, String)> {
    tracing::debug!(%url, "Sending request");
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("failed to reach {url}"))?;
    let status = response.status();
    let body = response.text().await.context("failed to read response body")?;
    Ok((status, body))
}

fn pretty(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| serde_json::to_string_pretty(&json).ok())
        .unwrap_or_else(|| body.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("Paylog CLI v{}", env!("CARGO_PKG_VERSION"));
        println!("Use --help for usage information");
        return Ok(());
    };

    let Some(path) = command.path() else {
        let config = TelemetryConfig::from_env()?;
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    };

    let client = Client::new();
    let (status, body) = fetch(&client, &endpoint(&cli.url, path)).await?;

    match command {
        Commands::Scrape => print!("{body}"),
        _ => println!("{}", pretty(&body)),
    }

    let expected_failure = matches!(command, Commands::Generate { error: true });
    if !status.is_success() && !expected_failure {
        bail!("server returned {status}");
    }
    Ok(())
}

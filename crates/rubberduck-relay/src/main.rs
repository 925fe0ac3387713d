//! `rubberduck-relay` binary entrypoint.
//!
//! Starts the relay using configuration from environment variables, with a
//! few command-line overrides.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use rubberduck_providers::{OpenAIClient, ProviderConfig};
use rubberduck_relay::{RelayConfig, RelayServer};
use rubberduck_telemetry::{init_subscriber, TelemetryConfig};
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "rubberduck-relay")]
#[command(version, about = "Streams persona-driven code analysis from an LLM provider", long_about = None)]
struct Cli {
    /// Address to bind (overrides HOST)
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Default log level when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_subscriber(
        &TelemetryConfig::default()
            .with_level(cli.log_level)
            .with_json_output(cli.json_logs),
    );

    let mut config = RelayConfig::from_env();
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }

    let provider_config = ProviderConfig::from_env();
    match provider_config.api_key_source {
        Some(source) => info!(source, model = %provider_config.model, "upstream credential loaded"),
        None => error!("no upstream credential configured; analysis requests will fail with a configuration error"),
    }
    if config.service_key.is_none() {
        warn!("SERVICE_API_KEY not set; relay is running in open mode without authentication");
    }

    let client = OpenAIClient::new(provider_config).context("failed to build upstream client")?;
    RelayServer::new(config, Arc::new(client)).start().await
}

//! `rubberduck-edge` binary entrypoint.

use clap::Parser;
use rubberduck_edge::{EdgeConfig, EdgeServer};
use rubberduck_telemetry::{init_subscriber, TelemetryConfig};
use tracing::warn;

#[derive(Parser)]
#[command(name = "rubberduck-edge")]
#[command(version, about = "Forwards browser requests to the rubberduck relay", long_about = None)]
struct Cli {
    /// Relay base URL (overrides SERVER_URL)
    #[arg(long)]
    server_url: Option<String>,

    /// Port to bind (overrides EDGE_PORT)
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

    let mut config = EdgeConfig::from_env();
    if let Some(url) = cli.server_url {
        config.server_url = url;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if config.service_key.is_none() {
        warn!("SERVICE_API_KEY not set; requests are forwarded without a service key");
    }

    EdgeServer::new(config).start().await
}

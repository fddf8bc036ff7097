use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use azdod::azdo::rest::RestConnector;
use azdod::config::DaemonConfig;
use azdod::connection::ConnectionManager;
use azdod::{ipc, AppContext};

#[derive(Parser)]
#[command(
    name = "azdod",
    about = "Azure DevOps bridge daemon for Neovim",
    version
)]
struct Args {
    /// JSON-RPC WebSocket server port
    #[arg(long, env = "AZDOD_PORT")]
    port: Option<u16>,

    /// Bind address (default: 127.0.0.1)
    #[arg(long, env = "AZDOD_BIND")]
    bind_address: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "AZDOD_LOG")]
    log: Option<String>,

    /// Per-request timeout in seconds for Azure DevOps REST calls
    #[arg(long, env = "AZDOD_HTTP_TIMEOUT_SECS")]
    http_timeout_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Arc::new(DaemonConfig::new(
        args.port,
        args.bind_address,
        args.log,
        args.http_timeout_secs,
    ));

    setup_logging(&config.log_level);
    info!(version = env!("CARGO_PKG_VERSION"), "azdod starting");

    let connector = RestConnector::new(Duration::from_secs(config.http_timeout_secs));
    let ctx = Arc::new(AppContext {
        config,
        connections: Arc::new(ConnectionManager::new(Box::new(connector))),
        started_at: std::time::Instant::now(),
    });

    ipc::run(ctx).await
}

/// Initialize the tracing subscriber: compact console output filtered by
/// the configured level.
fn setup_logging(log_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .compact()
        .init();
}

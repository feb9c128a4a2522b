//! Kiln ticket server
//!
//! Hands out sequence indices to remote workers over HTTP and persists the
//! progress of every case under the data directory.

mod config;

use clap::Parser;
use config::{FileConfig, Overrides};
use kiln_dispatch::TicketServer;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "kiln-ticket-server", author, version, about = "Ticket service for distributed experiment runs")]
struct Args {
    /// Log filter (e.g. info, kiln_dispatch=debug). RUST_LOG wins when set.
    #[arg(short, long, env = "KILN_LOG_LEVEL")]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, env = "KILN_JSON_LOGS")]
    json_logs: bool,

    /// Address to bind
    #[arg(long, env = "KILN_HOST")]
    host: Option<String>,

    #[arg(short, long, env = "KILN_PORT")]
    port: Option<u16>,

    /// Directory holding the ledger and url.txt
    #[arg(short, long, env = "KILN_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Discard all recorded progress on startup
    #[arg(long, env = "KILN_RESET")]
    reset: bool,

    /// URL written to url.txt instead of the bound address
    #[arg(long, env = "KILN_PUBLIC_URL")]
    public_url: Option<String>,

    /// TOML file with defaults for the options above
    #[arg(short, long, env = "KILN_CONFIG")]
    config: Option<PathBuf>,
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().with_target(false)).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let file = match &args.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };

    let level = args.log_level.clone().or_else(|| file.log_level.clone()).unwrap_or_else(|| "info".to_string());
    init_tracing(&level, args.json_logs || file.json_logs.unwrap_or(false));

    let server_config = config::resolve(
        file,
        Overrides {
            host: args.host,
            port: args.port,
            data_dir: args.data_dir,
            reset: args.reset,
            public_url: args.public_url,
        },
    );
    info!(config = ?server_config, "starting ticket server");

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            return;
        }
        info!("shutdown requested");
        on_signal.cancel();
    });

    TicketServer::open(server_config)?.serve(shutdown).await?;
    Ok(())
}

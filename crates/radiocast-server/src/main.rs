//! `radiocast-server` binary.
//!
//! Loads configuration, opens the call database, replays any delayed
//! releases that survived a restart, and serves the HTTP/WebSocket API.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use radiocast_core::config::Config;
use radiocast_core::tracing_init::init_tracing;
use radiocast_server::api::{build_router, AppState};
use radiocast_server::controller::Controller;
use radiocast_server::storage::Database;

#[derive(Parser, Debug)]
#[command(name = "radiocast-server")]
#[command(version, about = "Radiocast call distribution server")]
struct Args {
    /// Listen address (overrides the config file)
    #[arg(long, env = "RADIOCAST_ADDR")]
    addr: Option<SocketAddr>,

    /// Configuration file path
    #[arg(long, env = "RADIOCAST_CONFIG")]
    config: Option<PathBuf>,

    /// Database file path (overrides the config file)
    #[arg(long, env = "RADIOCAST_DB")]
    db_path: Option<PathBuf>,

    /// Log level filter (e.g. "info", "debug", "warn")
    #[arg(long, env = "RADIOCAST_LOG")]
    log_level: Option<String>,

    /// Output logs as JSON (for structured log aggregation)
    #[arg(long, env = "RADIOCAST_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => {
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };
    if let Some(addr) = args.addr {
        config.server.listen_addr = addr.to_string();
    }
    if let Some(path) = &args.db_path {
        config.server.db_path = Some(path.clone());
    }
    if let Some(level) = &args.log_level {
        config.server.log_level.clone_from(level);
    }

    let log_filter = format!("radiocast_server={0},radiocast_core={0}", config.server.log_level);
    init_tracing(&log_filter, args.log_json);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.server.listen_addr,
        "starting radiocast-server"
    );

    let db = match &config.server.db_path {
        Some(path) => {
            info!(path = %path.display(), "opening database");
            Database::open(path).await?
        }
        None => {
            let default_path = default_db_path()?;
            info!(path = %default_path.display(), "opening database (default path)");
            Database::open(&default_path).await?
        }
    };

    let controller = Arc::new(Controller::new(db, Arc::new(config)));

    // Re-arm timers for calls that were still held when we last stopped.
    let replayed = controller.delayer.start().await?;
    if replayed > 0 {
        info!(count = replayed, "replayed pending delayed calls");
    }

    let app = build_router(AppState {
        controller: Arc::clone(&controller),
    });
    let listener =
        tokio::net::TcpListener::bind(&controller.config.server.listen_addr).await?;
    info!(addr = %controller.config.server.listen_addr, "api ready");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Default database path: ./radiocast.db in the working directory.
fn default_db_path() -> anyhow::Result<PathBuf> {
    Ok(std::env::current_dir()?.join("radiocast.db"))
}

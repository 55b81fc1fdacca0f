//! Tierflow RPC Server - JSON-RPC front end for tool-calling clients.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tierflow_core::{CancellationToken, TierflowApi, TierflowConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tierflow-rpc")]
#[command(about = "JSON-RPC tool server for tag-driven tiering")]
struct Args {
    /// Config file (defaults to $TIERFLOW_CONFIG, then the user config dir)
    #[arg(short, long, env = "TIERFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (0 = auto-assign); overrides server.port
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind to; overrides server.host
    #[arg(long)]
    host: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Don't start the share monitors and periodic catalog sync
    #[arg(long)]
    no_background: bool,

    /// Replace the catalog with this backup before starting
    #[arg(long, value_name = "PATH")]
    restore_catalog: Option<PathBuf>,
}

fn init_logging(debug: bool, json: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug, args.json_logs);

    info!("Starting Tierflow RPC Server");

    let config = TierflowConfig::load_from(args.config.as_deref()).context("loading configuration")?;
    let host = args.host.unwrap_or_else(|| config.server.host.clone());
    let port = args.port.unwrap_or(config.server.port);
    let max_concurrent = config.server.max_concurrent_requests;

    let mut builder = TierflowApi::builder(config).auto_create_dirs(true);
    if let Some(backup) = args.restore_catalog {
        builder = builder.restore_from(backup);
    }
    let api = builder
        .build()
        .await
        .context("initializing pipeline")?;
    if !args.no_background {
        api.start_background().await;
    }

    let shutdown = CancellationToken::new();
    let addr = tierflow_rpc::start_server(api.clone(), &host, port, max_concurrent, shutdown.clone()).await?;

    // Intentional stdout so launchers can discover an auto-assigned port
    println!("RPC_PORT={}", addr.port());
    info!("RPC server running on {}", addr);

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping");
    shutdown.cancel();
    api.shutdown().await;

    Ok(())
}

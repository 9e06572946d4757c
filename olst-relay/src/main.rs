//! On-chain Lottery State Relay
//!
//! Watches the lottery contract, projects events into a keyed publish
//! store, and serves the projected state over HTTP and WebSocket.

mod config;
mod server;
mod shutdown;
mod state;
mod ws;

use clap::Parser;
use config::FileConfig;
use olst_core::events::{EventKind, chain_event_channel};
use olst_core::projector::{Projector, ProjectorRunner};
use olst_core::source::RpcLotterySource;
use olst_core::store::PublishStore;
use olst_core::watcher::LogWatcher;
use server::{build_router, run_server};
use shutdown::spawn_shutdown_fanout;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// On-chain Lottery State Relay - real-time projected lottery state
#[derive(Parser, Debug)]
#[command(name = "olst-relay")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./olst-config.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    init_tracing();

    // Parse command line arguments
    let args = Args::parse();

    tracing::info!("Starting olst-relay v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let file_config = FileConfig::load(&args.config).map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;
    let listen_addr = args.listen.unwrap_or(file_config.server.listen);
    tracing::info!("Configuration loaded from {:?}", args.config);

    // Shared pipeline plumbing
    let store = Arc::new(PublishStore::new());
    let source = Arc::new(
        RpcLotterySource::new(
            file_config.chain.rpc_url.clone(),
            file_config.chain.contract_address,
        )
        .map_err(|e| {
            tracing::error!("Failed to build the RPC client: {}", e);
            e
        })?,
    );
    let shutdown_rx = spawn_shutdown_fanout();
    let (event_tx, event_rx) = chain_event_channel();

    // One watcher per event kind, all feeding the projector channel
    let poll_interval = Duration::from_secs(file_config.chain.poll_interval_secs);
    for kind in EventKind::ALL {
        let watcher = LogWatcher::new(
            Arc::clone(&source),
            kind,
            event_tx.clone(),
            shutdown_rx.clone(),
            poll_interval,
            file_config.chain.start_block,
        );
        tokio::spawn(watcher.run());
    }
    // Drop the template sender so the projector channel closes once
    // every watcher has stopped.
    drop(event_tx);

    let runner = ProjectorRunner::new(
        Projector::new(Arc::clone(&store)),
        event_rx,
        shutdown_rx.clone(),
    );
    let projector_handle = tokio::spawn(runner.run());

    // Create application state and build the router
    let app_state = AppState::new(store, source);
    let router = build_router(app_state);

    // Run the server
    tracing::info!("Starting HTTP server on {}", listen_addr);
    let result = run_server(router, listen_addr, shutdown_rx).await;

    // Let the projector drain before reporting shutdown
    let _ = projector_handle.await;
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hyper=warn,reqwest=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

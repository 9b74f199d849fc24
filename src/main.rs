// Knowledge Query Gateway — binary entry point. Loads configuration,
// initializes logging, connects the store backend, and serves the HTTP
// surface.

use anyhow::Result;
use clap::Parser;
use kip_gateway::config::GatewayConfig;
use kip_gateway::executor::Executor;
use kip_gateway::http_server::{build_router, AppState};
use kip_gateway::observability;
use kip_gateway::store::memory::MemoryStore;
use kip_gateway::store::postgres::PostgresStore;
use kip_gateway::store::GraphStore;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "kip-gateway", about = "Knowledge Query Gateway: KQL over HTTP")]
struct Cli {
    /// Emit debug-level logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all logging except errors.
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    observability::init_logging_with_level(cli.verbose, cli.quiet)?;

    let config = Arc::new(GatewayConfig::from_env()?);
    if config.bearer_token.is_none() {
        tracing::warn!("KIP_TOKEN is not set; all endpoints are unauthenticated");
    }
    if config.cursor_key_is_default {
        tracing::warn!("running with the default cursor key; set CURSOR_KEY in production");
    }

    let store: Arc<dyn GraphStore> = match &config.store_uri {
        Some(uri) => {
            info!("connecting to graph store");
            Arc::new(PostgresStore::connect(uri).await?)
        }
        None => {
            tracing::warn!("STORE_URI is not set; serving from a transient in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let executor = Arc::new(Executor::new(store.clone(), config.clone()));
    let state = AppState { executor, store, config: config.clone() };
    let app = build_router(state);

    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!(port = config.port, "kip-gateway listening");
    axum::serve(listener, app).await?;

    Ok(())
}

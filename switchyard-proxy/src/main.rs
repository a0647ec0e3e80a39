//! Switchyard Proxy
//!
//! HTTP front end that loads target descriptors from configuration and, per
//! request, either redirects the client or forwards with the rewritten path.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use switchyard_core::config::TableConfig;
use switchyard_core::domain::target::Transport;
use switchyard_core::metrics::Registry;

mod server;
mod upstream;

#[derive(Parser)]
#[command(name = "switchyard")]
#[command(author, version, about = "Reverse proxy front end for Switchyard targets")]
struct Cli {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:8080")]
    listen: SocketAddr,

    /// Target configuration file
    #[arg(short, long, default_value = "switchyard.toml")]
    config: PathBuf,

    /// Log level, overridden by RUST_LOG
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    let config = TableConfig::load(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;

    let registry = Registry::new();
    let client = upstream::build_client();
    let transport: Transport = Arc::new(client.clone());
    let table = config
        .build(&registry, |builder| builder.transport(Arc::clone(&transport)))
        .context("invalid target configuration")?;
    info!(targets = table.len(), metrics = registry.len(), "targets loaded");

    let state = Arc::new(server::AppState {
        table: Arc::new(table),
        client,
    });
    server::start_server(cli.listen, state).await
}

//! # Custody Node
//!
//! Entry point: load configuration, start the runtime, wait for Ctrl+C.
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use anyhow::{Context, Result};
use custody_node::{NodeConfig, NodeRuntime};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .with_thread_ids(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Load configuration
    let config = NodeConfig::from_env().context("Invalid node configuration")?;

    // Create and start the node runtime
    let mut runtime = NodeRuntime::new(config)?;
    let cid = runtime.start().await?;
    info!(cid = %cid, "Node is running. Press Ctrl+C to stop.");

    tokio::signal::ctrl_c().await?;

    // Graceful shutdown
    runtime.shutdown().await;

    Ok(())
}

//! lww-node: one member of a replicated last-write-wins register.
//!
//! Joins a cluster, serves the register over HTTP and periodically pushes its
//! state to every live peer until stopped with Ctrl+C or SIGTERM.

use anyhow::Result;
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use lww_node::{Args, Node, NodeConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging - respects RUST_LOG env var, defaults to info (or debug with --verbose)
    let default_filter = if args.verbose {
        "debug,lww_node=debug,lww_core=debug"
    } else {
        "info,lww_node=info,lww_core=info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = NodeConfig::from_args(args)?;

    info!("Starting lww-node {}", config.name);
    info!("Initial value: {}", config.initial_value);
    if !config.seeds.is_empty() {
        info!("Seeds: {:?}", config.seeds);
    }

    let node = Node::start(config).await?;
    info!("Advertising {}", node.advertise_addr());
    node.run(shutdown_signal()).await?;

    info!("lww-node shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

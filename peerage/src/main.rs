use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};

use peerage_cluster::Membership;
use peerage_core::{load_config, logging};

/// Cluster membership agent
#[derive(Debug, Parser)]
#[command(name = "peerage", version, about)]
struct Args {
    /// Path to a YAML/TOML/JSON config file
    #[arg(short, long, env = "PEERAGE_CONFIG_PATH")]
    config: Option<String>,

    /// Print the current peers and exit without registering
    #[arg(long)]
    discover_only: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Load configuration
    let config = load_config(args.config.as_deref())?;

    // 2. Validate configuration (fail fast on misconfigurations)
    if let Err(errors) = config.validate() {
        for e in &errors {
            eprintln!("Config validation error: {e}");
        }
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s)",
            errors.len()
        ));
    }

    // 3. Initialize logging
    logging::init_logging(&config.logging)?;
    info!(backend = ?config.cluster.backend, "Peerage starting...");

    // 4. Build the discovery backend
    let membership = Membership::from_config(&config.cluster)?;
    info!(node = %membership.local_node(), "Local node identified");

    match membership.discover().await {
        Ok(peers) => {
            info!(count = peers.len(), "Discovered peers");
            for peer in &peers {
                info!(peer = %peer, "Peer");
            }
        }
        // Non-fatal: the node may be the first one in the cluster
        Err(e) => warn!(error = %e, "Initial discovery failed"),
    }

    if args.discover_only {
        return Ok(());
    }

    // 5. Register and start the liveness loop
    if let Err(e) = membership.register().await {
        error!(error = %e, "Failed to register with the discovery backend");
        return Err(e.into());
    }
    let liveness = membership.boot();

    // 6. Run until interrupted
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    membership.shutdown();
    if let Some(handle) = liveness {
        if let Err(e) = handle.await {
            error!(error = %e, "Liveness loop task failed");
        }
    }
    if let Err(e) = membership.deregister().await {
        error!(error = %e, "Failed to deregister from the discovery backend");
    }

    info!("Peerage stopped");
    Ok(())
}

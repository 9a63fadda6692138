//! `chain-prober` binary.
//!
//! Usage: `chain-prober [config.toml]`

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use cp_01_peer_registry::PeerSet;
use cp_02_chain_aggregator::ChainStateAggregator;
use cp_03_address_book::InMemoryAddressStore;
use shared_types::hash_hex;
use tokio::net::TcpListener;
use tracing::{error, info};

use prober_runtime::telemetry::init_tracing;
use prober_runtime::{load_config, Dialer, NodeParams, ProberNode};

/// Grace period for tasks to observe the shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<()> {
    let path = std::env::args_os().nth(1).map(PathBuf::from);
    let loaded = load_config(path.as_deref()).context("Failed to load configuration")?;
    init_tracing(&loaded.config.logging.log_level).context("Failed to initialize logging")?;
    loaded.log_summary();
    let config = loaded.config;

    let aggregator_config = config
        .aggregator_config()
        .context("Invalid chain configuration")?;
    let listen_addr = config.listen_addr().context("Invalid listen address")?;
    let identity = config.node_identity().context("Invalid node key")?;

    info!("===========================================");
    info!("  Chain-Prober v{}", env!("CARGO_PKG_VERSION"));
    info!("===========================================");
    info!("Node identity: {}", identity);
    info!("Network id: {}", aggregator_config.network_id);
    info!("Genesis: {}", hash_hex(&aggregator_config.genesis));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let peers = Arc::new(PeerSet::new());
    let store = Arc::new(InMemoryAddressStore::new());
    let params = NodeParams {
        identity,
        network_id: aggregator_config.network_id,
        protocol_version: aggregator_config.protocol_version,
        genesis: aggregator_config.genesis,
        max_peers: config.network.max_peers,
        listen_port: listen_addr.port(),
    };

    let (aggregator, handle) = ChainStateAggregator::new(aggregator_config, Arc::clone(&peers));
    let aggregator = aggregator.with_address_book(store.clone());
    let snapshot = aggregator.subscribe();
    let aggregator_task = tokio::spawn(aggregator.run(shutdown_rx.clone()));

    let node = ProberNode::new(
        params,
        Arc::clone(&peers),
        store,
        handle,
        snapshot,
        shutdown_rx.clone(),
    );

    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", listen_addr))?;
    tokio::spawn(Arc::clone(&node).listen(listener));

    let dialer = Dialer::new(
        Arc::clone(&node),
        config.network.bootstrap_nodes.clone(),
        config.dial_interval(),
    );
    tokio::spawn(dialer.run(shutdown_rx));

    info!("Prober is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    info!("Initiating graceful shutdown...");
    peers.close();
    if let Err(e) = shutdown_tx.send(true) {
        error!("Failed to send shutdown signal: {}", e);
    }
    if tokio::time::timeout(SHUTDOWN_GRACE, aggregator_task)
        .await
        .is_err()
    {
        error!("Chain aggregator did not stop within {:?}", SHUTDOWN_GRACE);
    }
    info!("Shutdown complete");
    Ok(())
}

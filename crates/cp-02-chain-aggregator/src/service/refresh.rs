//! Refresh of the best peer, run off the aggregator task.

use cp_01_peer_registry::{ObservationSink, Peer};
use cp_03_address_book::AddressStore;
use shared_types::{hash_hex, ChainStateObservation};
use std::sync::Arc;
use tracing::{debug, warn};

use super::AggregatorHandle;

/// Re-run the status handshake against `peer` using its own recorded head,
/// difficulty and genesis. On success the refreshed state goes back into the
/// aggregator and the new head header is requested.
pub(super) async fn refresh_peer(peer: Arc<Peer>, network_id: u64, handle: AggregatorHandle) {
    let (head, td) = peer.head();
    let Some(td) = td else {
        return;
    };
    let genesis = peer.genesis();

    let status = match peer.handshake(network_id, td, head, genesis).await {
        Ok(status) => status,
        Err(e) => {
            warn!(peer = %peer.identity().short(), error = %e, "[cp-02] Refresh handshake failed");
            return;
        }
    };
    debug!(
        peer = %peer.identity().short(),
        td = %status.total_difficulty,
        head = %hash_hex(&status.current_block),
        "[cp-02] Best peer refreshed"
    );

    let observation = ChainStateObservation {
        protocol_version: status.protocol_version,
        network_id: status.network_id,
        total_difficulty: status.total_difficulty,
        head: status.current_block,
        genesis: status.genesis_block,
        origin: Some(peer.identity()),
    };
    if handle.report_chain_state(observation).await.is_err() {
        return;
    }
    if let Err(e) = peer.request_one_header(status.current_block).await {
        warn!(peer = %peer.identity().short(), error = %e, "[cp-02] Head header request failed");
    }
}

/// Re-stamp the last-seen time of every given address.
pub(super) async fn heartbeat(
    store: Arc<dyn AddressStore>,
    addresses: Vec<std::net::SocketAddr>,
    now: i64,
) {
    for addr in addresses {
        if let Err(e) = store.register_reachable(addr, now).await {
            warn!(%addr, error = %e, "[cp-02] Heartbeat failed");
            return;
        }
    }
}

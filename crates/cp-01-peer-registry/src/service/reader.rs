//! # Peer Reader
//!
//! One task per registered peer. Owns the peer's inbound stream and turns
//! each message into cache updates, head updates and observations for the
//! aggregator.

use shared_types::{
    ChainStateObservation, HeaderBatch, HeightObservation, HeightSource,
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::domain::{NewBlockData, PeerError, ProtocolMessage};
use crate::ports::outbound::ObservationSink;

use super::Peer;

/// Inbound message loop for a single peer.
pub struct PeerReader {
    peer: Arc<Peer>,
    sink: Arc<dyn ObservationSink>,
    network_id: u64,
}

impl PeerReader {
    /// `network_id` is stamped on chain-state observations derived from
    /// `NewBlock` messages; the peer already proved it during the handshake.
    pub fn new(peer: Arc<Peer>, sink: Arc<dyn ObservationSink>, network_id: u64) -> Self {
        Self {
            peer,
            sink,
            network_id,
        }
    }

    /// Run until the transport fails, a message is malformed, or shutdown
    /// is signalled. Shutdown returns `Ok(())`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), PeerError> {
        self.peer.start_serving();
        debug!(peer = %self.peer.identity().short(), "[cp-01] Reader started");

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!(peer = %self.peer.identity().short(), "[cp-01] Reader shutdown signal received");
                    return Ok(());
                }
                msg = self.peer.next_message() => {
                    self.handle(msg?).await?;
                }
            }
        }
    }

    /// Apply one decoded message.
    pub async fn handle(&self, msg: ProtocolMessage) -> Result<(), PeerError> {
        let origin = self.peer.identity();
        match msg {
            ProtocolMessage::NewBlockHashes(announcements) => {
                for announcement in &announcements {
                    self.peer.mark_block(announcement.hash);
                }
                if let Some(height) = announcements.iter().map(|a| a.number).max() {
                    self.report_height(HeightObservation {
                        height,
                        origin,
                        source: HeightSource::Announcement,
                    })
                    .await;
                }
            }
            ProtocolMessage::NewBlock(NewBlockData {
                block,
                total_difficulty,
            }) => {
                let hash = block.hash();
                self.peer.mark_block(hash);
                self.peer.set_head(hash, total_difficulty);

                self.report_height(HeightObservation {
                    height: block.number(),
                    origin,
                    source: HeightSource::Block,
                })
                .await;

                let observation = ChainStateObservation {
                    protocol_version: self.peer.version(),
                    network_id: self.network_id,
                    total_difficulty,
                    head: hash,
                    genesis: self.peer.genesis(),
                    origin: Some(origin),
                };
                if self.sink.report_chain_state(observation).await.is_err() {
                    debug!(peer = %origin.short(), "Chain-state observation dropped, sink closed");
                }
            }
            ProtocolMessage::BlockHeaders(headers) => {
                if headers.is_empty() {
                    return Ok(());
                }
                let batch = HeaderBatch { origin, headers };
                if self.sink.report_headers(batch).await.is_err() {
                    debug!(peer = %origin.short(), "Header batch dropped, sink closed");
                }
            }
            ProtocolMessage::Transactions(txs) => {
                for tx in &txs {
                    self.peer.mark_transaction(tx.hash());
                }
            }
            // The prober holds no chain, so every request is answered empty.
            ProtocolMessage::GetBlockHeaders(_) => {
                self.peer.send_block_headers(Vec::new()).await?;
            }
            ProtocolMessage::GetBlockBodies(_) => {
                self.peer.send_block_bodies(Vec::new()).await?;
            }
            ProtocolMessage::GetNodeData(_) => {
                self.peer.send_node_data(Vec::new()).await?;
            }
            ProtocolMessage::GetReceipts(_) => {
                self.peer.send_receipts(Vec::new()).await?;
            }
            other => {
                debug!(peer = %origin.short(), code = ?other.code(), "Ignoring message");
            }
        }
        Ok(())
    }

    async fn report_height(&self, observation: HeightObservation) {
        if self.sink.report_height(observation).await.is_err() {
            debug!(peer = %observation.origin.short(), "Height observation dropped, sink closed");
        }
    }
}

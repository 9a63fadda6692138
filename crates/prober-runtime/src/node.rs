//! # Prober Node
//!
//! Turns a fresh transport session into a registered, served peer:
//!
//! ```text
//! channel ──→ capacity check ──→ status handshake ──→ PeerSet::register
//!                                                       │
//!             address book ←── reachable + good ────────┤
//!             aggregator   ←── chain state ─────────────┤
//!                                                       ↓
//!                                     PeerReader task ──→ unregister on exit
//! ```

use cp_01_peer_registry::{
    HandshakeError, MessageChannel, ObservationSink, Peer, PeerReader, PeerSet, RegistryError,
    TransportError,
};
use cp_02_chain_aggregator::{AggregateSnapshot, AggregatorHandle};
use cp_03_address_book::AddressStore;
use shared_types::{ChainStateObservation, Hash, PeerIdentity};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::adapters::{Hello, TcpChannel};

/// Why a session did not become a registered peer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttachError {
    #[error("Peer limit reached ({0})")]
    TooManyPeers(usize),

    #[error("Connected to self")]
    SelfConnection,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Chain parameters every session is negotiated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeParams {
    pub identity: PeerIdentity,
    pub network_id: u64,
    pub protocol_version: u32,
    pub genesis: Hash,
    pub max_peers: usize,
    /// Advertised in the session hello; 0 when not listening.
    pub listen_port: u16,
}

pub struct ProberNode {
    params: NodeParams,
    peers: Arc<PeerSet>,
    address_book: Arc<dyn AddressStore>,
    sink: AggregatorHandle,
    snapshot: watch::Receiver<AggregateSnapshot>,
    shutdown: watch::Receiver<bool>,
}

impl ProberNode {
    pub fn new(
        params: NodeParams,
        peers: Arc<PeerSet>,
        address_book: Arc<dyn AddressStore>,
        sink: AggregatorHandle,
        snapshot: watch::Receiver<AggregateSnapshot>,
        shutdown: watch::Receiver<bool>,
    ) -> Arc<Self> {
        Arc::new(Self {
            params,
            peers,
            address_book,
            sink,
            snapshot,
            shutdown,
        })
    }

    pub fn params(&self) -> &NodeParams {
        &self.params
    }

    pub fn peers(&self) -> &Arc<PeerSet> {
        &self.peers
    }

    pub fn address_book(&self) -> &Arc<dyn AddressStore> {
        &self.address_book
    }

    fn hello(&self) -> Hello {
        Hello {
            identity: self.params.identity,
            version: self.params.protocol_version,
            listen_port: self.params.listen_port,
        }
    }

    /// Free peer slots.
    pub fn capacity(&self) -> usize {
        self.params.max_peers.saturating_sub(self.peers.len())
    }

    /// Negotiate, register and start serving a peer over `channel`.
    ///
    /// The local status advertises the best chain state from the latest
    /// aggregator snapshot. On success the reader task owns the peer until
    /// its stream ends, then unregisters it.
    pub async fn attach(
        self: &Arc<Self>,
        channel: Arc<dyn MessageChannel>,
    ) -> Result<PeerIdentity, AttachError> {
        if self.capacity() == 0 {
            return Err(AttachError::TooManyPeers(self.params.max_peers));
        }
        if channel.remote_identity() == self.params.identity {
            return Err(AttachError::SelfConnection);
        }

        let peer = Arc::new(Peer::new(channel));
        let best = self.snapshot.borrow().best_state.clone();
        let status = peer
            .handshake(
                self.params.network_id,
                best.total_difficulty,
                best.current_block,
                self.params.genesis,
            )
            .await?;
        peer.set_genesis(status.genesis_block);
        // A refresh of a registered peer must wait on the status inbox, never
        // read the stream the reader task is about to own.
        peer.start_serving();

        let id = peer.identity();
        self.peers.register(Arc::clone(&peer))?;
        info!(peer = %peer, td = %status.total_difficulty, "[prober] Peer connected");

        if let Some(addr) = peer.remote_addr() {
            self.record_address(addr).await;
        }

        let observation = ChainStateObservation {
            protocol_version: status.protocol_version,
            network_id: status.network_id,
            total_difficulty: status.total_difficulty,
            head: status.current_block,
            genesis: status.genesis_block,
            origin: Some(id),
        };
        if let Err(e) = self.sink.report_chain_state(observation).await {
            debug!(peer = %id.short(), error = %e, "[prober] Aggregator gone");
        }

        let node = Arc::clone(self);
        tokio::spawn(async move { node.serve(peer).await });
        Ok(id)
    }

    async fn serve(self: Arc<Self>, peer: Arc<Peer>) {
        let id = peer.identity();
        let reader = PeerReader::new(
            Arc::clone(&peer),
            Arc::new(self.sink.clone()),
            self.params.network_id,
        );
        match reader.run(self.shutdown.clone()).await {
            Ok(()) => debug!(peer = %id.short(), "[prober] Reader stopped"),
            Err(e) => warn!(peer = %id.short(), error = %e, "[prober] Peer dropped"),
        }
        if let Err(e) = self.peers.unregister(&id) {
            debug!(peer = %id.short(), error = %e, "[prober] Unregister skipped");
        }
    }

    async fn record_address(&self, addr: SocketAddr) {
        let now = chrono::Utc::now().timestamp();
        if let Err(e) = self.address_book.register_reachable(addr, now).await {
            warn!(%addr, error = %e, "[prober] Failed to record reachable address");
            return;
        }
        if let Err(e) = self.address_book.register_good(addr).await {
            warn!(%addr, error = %e, "[prober] Failed to record good address");
        }
    }

    /// Dial `addr` over TCP and attach the session.
    pub async fn dial(self: &Arc<Self>, addr: SocketAddr) -> Result<PeerIdentity, AttachError> {
        let channel = TcpChannel::connect(addr, self.hello()).await?;
        self.attach(Arc::new(channel)).await
    }

    /// Accept inbound TCP sessions until shutdown.
    pub async fn listen(self: Arc<Self>, listener: TcpListener) {
        let mut shutdown = self.shutdown.clone();
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "[prober] Listening");
        }
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("[prober] Listener shutdown signal received");
                    return;
                }
                accepted = listener.accept() => {
                    let (stream, addr) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!(error = %e, "[prober] Accept failed");
                            continue;
                        }
                    };
                    let node = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = node.accept(stream, addr).await {
                            debug!(%addr, error = %e, "[prober] Inbound session rejected");
                        }
                    });
                }
            }
        }
    }

    async fn accept(
        self: &Arc<Self>,
        stream: tokio::net::TcpStream,
        addr: SocketAddr,
    ) -> Result<PeerIdentity, AttachError> {
        let channel = TcpChannel::accept(stream, addr, self.hello()).await?;
        self.attach(Arc::new(channel)).await
    }
}

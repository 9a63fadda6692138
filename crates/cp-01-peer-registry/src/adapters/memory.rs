//! In-process `MessageChannel` pair over bounded tokio channels.
//!
//! Used by tests and by simulations that wire two registries together
//! without sockets.

use async_trait::async_trait;
use shared_types::PeerIdentity;
use std::net::SocketAddr;
use tokio::sync::{mpsc, Mutex};

use crate::domain::{RawMessage, TransportError};
use crate::ports::outbound::MessageChannel;

/// Default per-direction buffer.
pub const DEFAULT_PIPE_CAPACITY: usize = 64;

/// One end of an in-memory pipe.
pub struct MemoryChannel {
    remote: PeerIdentity,
    version: u32,
    remote_addr: Option<SocketAddr>,
    tx: mpsc::Sender<RawMessage>,
    rx: Mutex<mpsc::Receiver<RawMessage>>,
}

impl MemoryChannel {
    /// Attach a fake socket address to this end.
    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }
}

/// Create two connected ends. `a` sees `b_identity` as its remote and vice
/// versa; both report the same negotiated version.
pub fn pipe(
    a_identity: PeerIdentity,
    b_identity: PeerIdentity,
    version: u32,
    capacity: usize,
) -> (MemoryChannel, MemoryChannel) {
    let (a_tx, b_rx) = mpsc::channel(capacity.max(1));
    let (b_tx, a_rx) = mpsc::channel(capacity.max(1));
    let a = MemoryChannel {
        remote: b_identity,
        version,
        remote_addr: None,
        tx: a_tx,
        rx: Mutex::new(a_rx),
    };
    let b = MemoryChannel {
        remote: a_identity,
        version,
        remote_addr: None,
        tx: b_tx,
        rx: Mutex::new(b_rx),
    };
    (a, b)
}

#[async_trait]
impl MessageChannel for MemoryChannel {
    async fn send(&self, msg: RawMessage) -> Result<(), TransportError> {
        self.tx.send(msg).await.map_err(|_| TransportError::Closed)
    }

    async fn recv(&self) -> Result<RawMessage, TransportError> {
        self.rx.lock().await.recv().await.ok_or(TransportError::Closed)
    }

    fn remote_identity(&self) -> PeerIdentity {
        self.remote
    }

    fn protocol_version(&self) -> u32 {
        self.version
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }
}

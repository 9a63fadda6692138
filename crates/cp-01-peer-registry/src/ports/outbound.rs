//! Driven ports (Outbound dependencies)
//!
//! The registry consumes an already-established session per remote node and
//! pushes what it learns to a single observation consumer.

use async_trait::async_trait;
use shared_types::{ChainStateObservation, HeaderBatch, HeightObservation, PeerIdentity};
use std::net::SocketAddr;

pub use crate::domain::{RawMessage, SinkError, TransportError};

/// Bidirectional typed-message session with one remote node.
///
/// Identity and sub-protocol version are settled by the session layer before
/// the `eth` handshake runs. `send` and `recv` may be driven concurrently,
/// but at most one task calls `recv` at a time.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Write one message.
    async fn send(&self, msg: RawMessage) -> Result<(), TransportError>;

    /// Next inbound message. The payload stays encoded until the caller
    /// decodes it.
    async fn recv(&self) -> Result<RawMessage, TransportError>;

    fn remote_identity(&self) -> PeerIdentity;

    /// Negotiated `eth` version.
    fn protocol_version(&self) -> u32;

    /// Remote socket address, when the transport knows one.
    fn remote_addr(&self) -> Option<SocketAddr> {
        None
    }
}

/// Consumer of per-peer observations (implemented by the chain aggregator).
///
/// Calls suspend while the consumer is busy, which is the back-pressure
/// applied to reader tasks.
#[async_trait]
pub trait ObservationSink: Send + Sync {
    async fn report_height(&self, observation: HeightObservation) -> Result<(), SinkError>;

    async fn report_chain_state(
        &self,
        observation: ChainStateObservation,
    ) -> Result<(), SinkError>;

    async fn report_headers(&self, batch: HeaderBatch) -> Result<(), SinkError>;
}

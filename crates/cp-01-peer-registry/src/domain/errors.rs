//! Error taxonomy for peers, handshakes and the registry.
//!
//! None of these are fatal to the process: a failed peer is dropped by its
//! caller and the registry stays serviceable.

use shared_types::{Hash, PeerIdentity};
use std::time::Duration;
use thiserror::Error;

/// Failures of the underlying session, reported by `MessageChannel`
/// implementations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Connection closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: u32, max: u32 },

    #[error("Session setup failed: {0}")]
    Session(String),
}

/// Malformed, oversized or undecodable traffic. Terminal for the handshake;
/// the caller should drop the connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("First message has code {got:#x} (!= {expected:#x})")]
    NoStatusMsg { got: u64, expected: u64 },

    #[error("Message too large: {size} > {max}")]
    MsgTooLarge { size: u32, max: u32 },

    #[error("Failed to decode message {code:#x}: {reason}")]
    Decode { code: u64, reason: String },

    #[error("Failed to encode message {code:#x}: {reason}")]
    Encode { code: u64, reason: String },

    #[error("Invalid message code {0:#x}")]
    InvalidMsgCode(u64),
}

/// The remote is healthy but on another chain, network or protocol version.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NegotiationMismatch {
    #[error("Genesis block mismatch: {} (!= {})", short_hash(.theirs), short_hash(.ours))]
    GenesisBlock { ours: Hash, theirs: Hash },

    #[error("Network id mismatch: {theirs} (!= {ours})")]
    NetworkId { ours: u64, theirs: u64 },

    #[error("Protocol version mismatch: {theirs} (!= {ours})")]
    ProtocolVersion { ours: u32, theirs: u32 },
}

fn short_hash(hash: &Hash) -> String {
    hex::encode(&hash[..8])
}

/// Outcome of a failed `Peer::handshake`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Mismatch(#[from] NegotiationMismatch),

    #[error("Handshake read timeout after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Errors from outbound sends and inbound reads on a negotiated peer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeerError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl From<PeerError> for HandshakeError {
    fn from(err: PeerError) -> Self {
        match err {
            PeerError::Protocol(e) => HandshakeError::Protocol(e),
            PeerError::Transport(e) => HandshakeError::Transport(e),
        }
    }
}

/// The observation consumer has gone away (aggregator shut down).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("Observation sink closed")]
    Closed,
}

/// Caller-visible registry misuse. Never corrupts registry state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Peer is already registered: {0:?}")]
    AlreadyRegistered(PeerIdentity),

    #[error("Peer is not registered: {0:?}")]
    NotRegistered(PeerIdentity),

    #[error("Peer set is closed")]
    Closed,
}

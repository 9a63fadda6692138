//! # Peer Registry Subsystem (cp-01)
//!
//! Negotiates the `eth` sub-protocol with remote nodes and keeps the set of
//! live, negotiated peers.
//!
//! ## Architecture Role
//!
//! ```text
//! [Transport] ──MessageChannel──→ [Peer] ──handshake──→ [PeerSet]
//!                                    │
//!                                    ↓ PeerReader (one task per peer)
//!                          ObservationSink ──→ [Chain Aggregator (2)]
//! ```
//!
//! ## Locking
//!
//! Two tiers: the `PeerSet` map lock, then each `Peer`'s own head lock.
//! Always set-lock-then-peer-lock; no code path takes a peer lock and then
//! the set lock, and no code path holds two peer locks at once.
//!
//! ## Known-hash caches
//!
//! Every peer keeps two bounded caches (blocks: 1024, transactions: 32768)
//! so that a busy or hostile peer cannot grow memory without bound. Eviction
//! is insertion-order FIFO; lookups do not refresh an entry.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

pub use domain::*;
pub use ports::outbound::{MessageChannel, ObservationSink};
pub use service::{Peer, PeerInfo, PeerReader, PeerSet, HANDSHAKE_TIMEOUT};

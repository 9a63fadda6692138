//! # Observation Payloads
//!
//! Values reported by per-peer reader tasks to the chain-state aggregator.
//! Each kind travels over its own single-consumer channel.

use serde::{Deserialize, Serialize};

use crate::entities::{BlockHeader, Hash, PeerIdentity, TotalDifficulty};

/// Message class a height observation was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeightSource {
    /// `NewBlockHashes` announcement (hash + number records).
    Announcement,
    /// `NewBlock` propagation (full block with header number).
    Block,
}

/// "Peer X told us about a block at height N."
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeightObservation {
    /// Observed block number.
    pub height: u64,
    /// Peer the observation came from.
    pub origin: PeerIdentity,
    /// Message class that carried it.
    pub source: HeightSource,
}

/// Full chain-state claim: the fields of a status message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainStateObservation {
    pub protocol_version: u32,
    pub network_id: u64,
    pub total_difficulty: TotalDifficulty,
    pub head: Hash,
    pub genesis: Hash,
    /// Reporting peer, when known.
    pub origin: Option<PeerIdentity>,
}

/// A batch of headers received from one peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderBatch {
    pub origin: PeerIdentity,
    pub headers: Vec<BlockHeader>,
}

impl HeaderBatch {
    /// Highest-numbered header in the batch (first one wins on equal numbers).
    pub fn highest(&self) -> Option<&BlockHeader> {
        self.headers
            .iter()
            .fold(None, |best: Option<&BlockHeader>, h| match best {
                Some(b) if b.number >= h.number => Some(b),
                _ => Some(h),
            })
    }
}

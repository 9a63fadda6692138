//! # Aggregate State
//!
//! The best-known chain state and best observed height, owned by exactly one
//! task. Every merge is "replace only if strictly better", so the result
//! does not depend on the order observations arrive in.

use serde::Serialize;
use shared_types::{
    hash_hex, BlockHeader, ChainStateObservation, Hash, HeaderBatch, HeightObservation,
    PeerIdentity, TotalDifficulty,
};
use std::fmt;

/// Best chain state seen so far. Total difficulty never decreases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BestChainState {
    pub protocol_version: u32,
    pub network_id: u64,
    pub total_difficulty: TotalDifficulty,
    pub current_block: Hash,
    pub genesis: Hash,
}

impl fmt::Display for BestChainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "td={} head={} genesis={}",
            self.total_difficulty,
            hash_hex(&self.current_block),
            hash_hex(&self.genesis)
        )
    }
}

/// Highest block number reported by any peer, and who reported it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BestHeight {
    pub height: u64,
    pub origin: Option<PeerIdentity>,
}

/// Outcome of merging a chain-state observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainStateMerge {
    Accepted,
    /// Difficulty not strictly greater than the current best.
    NotBetter,
    /// Observation belongs to another network.
    GenesisMismatch,
}

/// Published view of the aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateSnapshot {
    pub best_height: u64,
    pub best_height_peer: Option<PeerIdentity>,
    pub best_state: BestChainState,
    pub best_header_number: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct AggregateState {
    genesis: Hash,
    best_state: BestChainState,
    best_height: BestHeight,
    best_header: Option<BlockHeader>,
}

impl AggregateState {
    /// Start from `seed`; only observations on `genesis` will be merged.
    pub fn new(genesis: Hash, seed: BestChainState) -> Self {
        Self {
            genesis,
            best_state: seed,
            best_height: BestHeight::default(),
            best_header: None,
        }
    }

    pub fn best_state(&self) -> &BestChainState {
        &self.best_state
    }

    pub fn best_height(&self) -> BestHeight {
        self.best_height
    }

    pub fn best_header(&self) -> Option<&BlockHeader> {
        self.best_header.as_ref()
    }

    /// Returns `true` when the observation became the new best height.
    pub fn merge_height(&mut self, observation: HeightObservation) -> bool {
        if observation.height <= self.best_height.height {
            return false;
        }
        self.best_height = BestHeight {
            height: observation.height,
            origin: Some(observation.origin),
        };
        true
    }

    pub fn merge_chain_state(&mut self, observation: &ChainStateObservation) -> ChainStateMerge {
        if observation.genesis != self.genesis {
            return ChainStateMerge::GenesisMismatch;
        }
        if observation.total_difficulty <= self.best_state.total_difficulty {
            return ChainStateMerge::NotBetter;
        }
        self.best_state = BestChainState {
            protocol_version: observation.protocol_version,
            network_id: observation.network_id,
            total_difficulty: observation.total_difficulty,
            current_block: observation.head,
            genesis: observation.genesis,
        };
        ChainStateMerge::Accepted
    }

    /// Keeps the batch's highest header if it is above the retained one.
    pub fn merge_headers(&mut self, batch: &HeaderBatch) -> bool {
        let Some(highest) = batch.highest() else {
            return false;
        };
        match &self.best_header {
            Some(current) if highest.number <= current.number => false,
            _ => {
                self.best_header = Some(highest.clone());
                true
            }
        }
    }

    pub fn snapshot(&self) -> AggregateSnapshot {
        AggregateSnapshot {
            best_height: self.best_height.height,
            best_height_peer: self.best_height.origin,
            best_state: self.best_state.clone(),
            best_header_number: self.best_header.as_ref().map(|h| h.number),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::{HeightSource, U256, PEER_IDENTITY_LEN};

    const GENESIS: Hash = [0x01; 32];

    fn peer(byte: u8) -> PeerIdentity {
        PeerIdentity::new([byte; PEER_IDENTITY_LEN])
    }

    fn state() -> AggregateState {
        AggregateState::new(
            GENESIS,
            BestChainState {
                protocol_version: 63,
                network_id: 1,
                total_difficulty: U256::zero(),
                current_block: GENESIS,
                genesis: GENESIS,
            },
        )
    }

    fn chain_state(td: u64, genesis: Hash) -> ChainStateObservation {
        ChainStateObservation {
            protocol_version: 63,
            network_id: 1,
            total_difficulty: U256::from(td),
            head: [td as u8; 32],
            genesis,
            origin: None,
        }
    }

    fn height(height: u64, byte: u8) -> HeightObservation {
        HeightObservation {
            height,
            origin: peer(byte),
            source: HeightSource::Announcement,
        }
    }

    #[test]
    fn test_lower_and_foreign_chain_states_are_rejected() {
        let mut agg = state();
        assert_eq!(
            agg.merge_chain_state(&chain_state(10, GENESIS)),
            ChainStateMerge::Accepted
        );
        assert_eq!(
            agg.merge_chain_state(&chain_state(8, GENESIS)),
            ChainStateMerge::NotBetter
        );
        assert_eq!(
            agg.merge_chain_state(&chain_state(15, [0xFF; 32])),
            ChainStateMerge::GenesisMismatch
        );
        assert_eq!(agg.best_state().total_difficulty, U256::from(10u64));
        assert_eq!(agg.best_state().current_block, [10u8; 32]);
    }

    #[test]
    fn test_equal_difficulty_does_not_replace() {
        let mut agg = state();
        agg.merge_chain_state(&chain_state(10, GENESIS));
        let mut same = chain_state(10, GENESIS);
        same.head = [0xAB; 32];
        assert_eq!(agg.merge_chain_state(&same), ChainStateMerge::NotBetter);
        assert_eq!(agg.best_state().current_block, [10u8; 32]);
    }

    #[test]
    fn test_height_only_moves_up() {
        let mut agg = state();
        assert!(agg.merge_height(height(100, 1)));
        assert!(!agg.merge_height(height(100, 2)));
        assert!(!agg.merge_height(height(50, 3)));
        assert!(agg.merge_height(height(101, 4)));

        assert_eq!(
            agg.best_height(),
            BestHeight {
                height: 101,
                origin: Some(peer(4))
            }
        );
    }

    #[test]
    fn test_merge_order_does_not_matter() {
        let observations = [12u64, 3, 40, 40, 7, 39];
        let mut forward = state();
        let mut backward = state();
        for td in observations {
            forward.merge_chain_state(&chain_state(td, GENESIS));
        }
        for td in observations.iter().rev() {
            backward.merge_chain_state(&chain_state(*td, GENESIS));
        }
        assert_eq!(forward.best_state(), backward.best_state());
    }

    #[test]
    fn test_headers_keep_highest_number() {
        let mut agg = state();
        let header = |number| BlockHeader {
            number,
            ..Default::default()
        };

        assert!(agg.merge_headers(&HeaderBatch {
            origin: peer(1),
            headers: vec![header(4), header(9)],
        }));
        assert!(!agg.merge_headers(&HeaderBatch {
            origin: peer(2),
            headers: vec![header(9), header(2)],
        }));
        assert!(!agg.merge_headers(&HeaderBatch {
            origin: peer(2),
            headers: vec![],
        }));
        assert_eq!(agg.best_header().map(|h| h.number), Some(9));
    }

    #[test]
    fn test_snapshot_serializes() {
        let mut agg = state();
        agg.merge_height(height(5, 1));
        let snapshot = agg.snapshot();
        assert_eq!(snapshot.best_height, 5);
        assert_eq!(snapshot.best_header_number, None);
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"best_height\":5"));
    }
}

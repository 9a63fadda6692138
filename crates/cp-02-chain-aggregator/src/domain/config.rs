//! Aggregator configuration.

use shared_types::{Hash, TotalDifficulty, U256};
use std::time::Duration;

use super::BestChainState;

/// Mainnet genesis hash.
pub const DEFAULT_GENESIS: Hash = [
    0xd4, 0xe5, 0x67, 0x40, 0xf8, 0x76, 0xae, 0xf8, 0xc0, 0x10, 0xb8, 0x6a, 0x40, 0xd5, 0xf5, 0x67,
    0x45, 0xa1, 0x18, 0xd0, 0x90, 0x6a, 0x34, 0xe6, 0x9a, 0xec, 0x8c, 0x0d, 0xb1, 0xcb, 0x8f, 0xa3,
];

/// Aggregator settings. The seed fields form the initial best state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatorConfig {
    /// Network id used for refresh handshakes.
    pub network_id: u64,
    pub protocol_version: u32,
    /// Only chain states on this genesis are merged.
    pub genesis: Hash,
    pub start_block: Hash,
    pub start_total_difficulty: TotalDifficulty,
    /// Slow tick: log, publish a snapshot and heartbeat peer addresses.
    pub report_interval: Duration,
    /// Fast tick: refresh the best peer.
    pub pull_interval: Duration,
    /// Capacity of each input channel.
    pub channel_capacity: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            network_id: 1,
            protocol_version: 63,
            genesis: DEFAULT_GENESIS,
            start_block: DEFAULT_GENESIS,
            start_total_difficulty: U256::zero(),
            report_interval: Duration::from_secs(30),
            pull_interval: Duration::from_secs(5),
            channel_capacity: 64,
        }
    }
}

impl AggregatorConfig {
    /// Initial best state built from the seed fields.
    pub fn seed_state(&self) -> BestChainState {
        BestChainState {
            protocol_version: self.protocol_version,
            network_id: self.network_id,
            total_difficulty: self.start_total_difficulty,
            current_block: self.start_block,
            genesis: self.genesis,
        }
    }
}

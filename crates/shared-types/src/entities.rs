//! # Core Domain Entities
//!
//! ## Clusters
//!
//! - **Chain**: `BlockHeader`, `Block`, `Transaction`, total difficulty
//! - **Networking**: `PeerIdentity`

use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::fmt;
use std::str::FromStr;

use crate::errors::ParseError;

// Re-export U256 from primitive-types for use across all subsystems
pub use primitive_types::U256;

// =============================================================================
// CLUSTER A: THE CHAIN
// =============================================================================

/// A 32-byte Keccak-256 hash.
pub type Hash = [u8; 32];

/// A 20-byte account address.
pub type Address = [u8; 20];

/// Cumulative proof-of-work weight from genesis to a given block.
pub type TotalDifficulty = U256;

/// Keccak-256 over `data`.
pub fn keccak256(data: &[u8]) -> Hash {
    Keccak256::digest(data).into()
}

/// Render a hash as `0x`-prefixed lowercase hex.
pub fn hash_hex(hash: &Hash) -> String {
    format!("0x{}", hex::encode(hash))
}

/// Parse a hash from hex, with or without the `0x` prefix.
pub fn parse_hash(s: &str) -> Result<Hash, ParseError> {
    let bytes = hex::decode(s.trim_start_matches("0x"))
        .map_err(|e| ParseError::InvalidHex(e.to_string()))?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| ParseError::InvalidLength {
            expected: 32,
            actual: bytes.len(),
        })
}

/// Parse a decimal total difficulty.
pub fn parse_total_difficulty(s: &str) -> Result<TotalDifficulty, ParseError> {
    U256::from_dec_str(s.trim()).map_err(|e| ParseError::InvalidNumber(format!("{e:?}")))
}

/// Block header as announced on the wire.
///
/// The prober never validates headers; it only reads `number` and the
/// derived hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BlockHeader {
    /// Hash of the parent block.
    pub parent_hash: Hash,
    /// Root of the state trie after this block.
    pub state_root: Hash,
    /// Root of the transaction trie.
    pub transactions_root: Hash,
    /// Block difficulty (not cumulative).
    pub difficulty: U256,
    /// Block number (height).
    pub number: u64,
    /// Gas limit of the block.
    pub gas_limit: u64,
    /// Gas used by the block.
    pub gas_used: u64,
    /// Unix timestamp.
    pub timestamp: u64,
    /// Arbitrary extra data.
    pub extra_data: Vec<u8>,
}

impl BlockHeader {
    /// Keccak-256 over the header fields in declaration order.
    pub fn hash(&self) -> Hash {
        let mut hasher = Keccak256::new();
        hasher.update(self.parent_hash);
        hasher.update(self.state_root);
        hasher.update(self.transactions_root);
        let mut difficulty = [0u8; 32];
        self.difficulty.to_big_endian(&mut difficulty);
        hasher.update(difficulty);
        hasher.update(self.number.to_be_bytes());
        hasher.update(self.gas_limit.to_be_bytes());
        hasher.update(self.gas_used.to_be_bytes());
        hasher.update(self.timestamp.to_be_bytes());
        hasher.update(&self.extra_data);
        hasher.finalize().into()
    }
}

/// A transaction as relayed between peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Transaction {
    /// Sender's nonce.
    pub nonce: u64,
    /// Gas price in wei.
    pub gas_price: U256,
    /// Gas limit.
    pub gas_limit: u64,
    /// Recipient (None for contract creation).
    pub to: Option<Address>,
    /// Value in wei.
    pub value: U256,
    /// Call data.
    pub data: Vec<u8>,
    /// Signature bytes (v, r, s), opaque to the prober.
    pub signature: Vec<u8>,
}

impl Transaction {
    /// Compute the transaction hash.
    pub fn hash(&self) -> Hash {
        let mut hasher = Keccak256::new();
        hasher.update(self.nonce.to_be_bytes());
        let mut word = [0u8; 32];
        self.gas_price.to_big_endian(&mut word);
        hasher.update(word);
        hasher.update(self.gas_limit.to_be_bytes());
        if let Some(to) = &self.to {
            hasher.update(to);
        }
        self.value.to_big_endian(&mut word);
        hasher.update(word);
        hasher.update(&self.data);
        hasher.update(&self.signature);
        hasher.finalize().into()
    }
}

/// A full block: header, transactions and uncle headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Block {
    /// The block header.
    pub header: BlockHeader,
    /// Transactions in block order.
    pub transactions: Vec<Transaction>,
    /// Uncle headers.
    pub uncles: Vec<BlockHeader>,
}

impl Block {
    /// The block hash is the header hash.
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    /// Block number.
    pub fn number(&self) -> u64 {
        self.header.number
    }
}

// =============================================================================
// CLUSTER B: NETWORKING
// =============================================================================

/// Length of a peer identity (uncompressed secp256k1 public key without prefix).
pub const PEER_IDENTITY_LEN: usize = 64;

/// Opaque identifier of a remote node, stable for the life of a connection.
///
/// Displayed as full lowercase hex; `Debug` shows only the first 8 bytes.
#[serde_with::serde_as]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeerIdentity(#[serde_as(as = "serde_with::Bytes")] pub [u8; PEER_IDENTITY_LEN]);

impl PeerIdentity {
    /// Creates an identity from raw bytes.
    pub fn new(bytes: [u8; PEER_IDENTITY_LEN]) -> Self {
        Self(bytes)
    }

    /// Creates an identity from a slice; `None` unless exactly 64 bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(Self)
    }

    /// Raw identity bytes.
    pub fn as_bytes(&self) -> &[u8; PEER_IDENTITY_LEN] {
        &self.0
    }

    /// First 8 bytes as hex, for compact log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PeerIdentity({}..)", self.short())
    }
}

impl FromStr for PeerIdentity {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim_start_matches("0x"))
            .map_err(|e| ParseError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes).ok_or(ParseError::InvalidLength {
            expected: PEER_IDENTITY_LEN,
            actual: bytes.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hash_accepts_prefix() {
        let hex = "0xd4e56740f876aef8c010b86a40d5f56745a118d0906a34e69aec8c0db1cb8fa3";
        let hash = parse_hash(hex).unwrap();
        assert_eq!(hash[0], 0xd4);
        assert_eq!(hash_hex(&hash), hex);
        assert_eq!(parse_hash(&hex[2..]).unwrap(), hash);
    }

    #[test]
    fn test_parse_hash_rejects_wrong_length() {
        assert_eq!(
            parse_hash("0xabcd"),
            Err(ParseError::InvalidLength {
                expected: 32,
                actual: 2
            })
        );
        assert!(matches!(parse_hash("zz"), Err(ParseError::InvalidHex(_))));
    }

    #[test]
    fn test_parse_total_difficulty() {
        let td = parse_total_difficulty("2303762395359969").unwrap();
        assert_eq!(td, U256::from(2_303_762_395_359_969u64));
        assert!(parse_total_difficulty("-1").is_err());
    }

    #[test]
    fn test_header_hash_changes_with_number() {
        let a = BlockHeader {
            number: 1,
            ..Default::default()
        };
        let b = BlockHeader {
            number: 2,
            ..Default::default()
        };
        assert_ne!(a.hash(), b.hash());
        assert_eq!(a.hash(), a.clone().hash());
    }

    #[test]
    fn test_block_hash_is_header_hash() {
        let block = Block {
            header: BlockHeader {
                number: 7,
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(block.hash(), block.header.hash());
        assert_eq!(block.number(), 7);
    }

    #[test]
    fn test_peer_identity_display_and_parse() {
        let id = PeerIdentity::new([0xAB; PEER_IDENTITY_LEN]);
        let text = id.to_string();
        assert_eq!(text.len(), 128);
        assert_eq!(text.parse::<PeerIdentity>().unwrap(), id);
        assert_eq!(id.short(), "abababababababab");
        assert!(PeerIdentity::from_slice(&[0u8; 32]).is_none());
    }

    #[test]
    fn test_peer_identity_serde() {
        let id = PeerIdentity::new([7u8; PEER_IDENTITY_LEN]);
        let bytes = bincode::serialize(&id).unwrap();
        let back: PeerIdentity = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, id);
    }
}

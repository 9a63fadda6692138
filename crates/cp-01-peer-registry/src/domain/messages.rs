//! # Wire Messages
//!
//! The `eth` sub-protocol's message set is fixed per version, so it is
//! modelled as a closed enum rather than a code + dynamic payload pair.
//!
//! ## Message codes
//!
//! | Code | Message | Since |
//! |------|---------|-------|
//! | 0x00 | Status | eth/62 |
//! | 0x01 | NewBlockHashes | eth/62 |
//! | 0x02 | Transactions | eth/62 |
//! | 0x03 | GetBlockHeaders | eth/62 |
//! | 0x04 | BlockHeaders | eth/62 |
//! | 0x05 | GetBlockBodies | eth/62 |
//! | 0x06 | BlockBodies | eth/62 |
//! | 0x07 | NewBlock | eth/62 |
//! | 0x0d | GetNodeData | eth/63 |
//! | 0x0e | NodeData | eth/63 |
//! | 0x0f | GetReceipts | eth/63 |
//! | 0x10 | Receipts | eth/63 |

use serde::{Deserialize, Serialize};
use shared_types::{Block, BlockHeader, Hash, TotalDifficulty, Transaction};

use super::{decode_payload, encode_payload, ProtocolError};

/// Official short name of the protocol used during capability negotiation.
pub const PROTOCOL_NAME: &str = "eth";

pub const ETH62: u32 = 62;
pub const ETH63: u32 = 63;

/// Supported versions of the eth protocol (first is primary).
pub const PROTOCOL_VERSIONS: [u32; 2] = [ETH63, ETH62];

/// Number of implemented messages for each entry of `PROTOCOL_VERSIONS`.
pub const PROTOCOL_LENGTHS: [u64; 2] = [17, 8];

/// Maximum cap on the size of a protocol message (10 MiB).
pub const PROTOCOL_MAX_MSG_SIZE: u32 = 10 * 1024 * 1024;

/// Wire-stable message kind tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u64)]
pub enum MessageCode {
    Status = 0x00,
    NewBlockHashes = 0x01,
    Transactions = 0x02,
    GetBlockHeaders = 0x03,
    BlockHeaders = 0x04,
    GetBlockBodies = 0x05,
    BlockBodies = 0x06,
    NewBlock = 0x07,
    GetNodeData = 0x0d,
    NodeData = 0x0e,
    GetReceipts = 0x0f,
    Receipts = 0x10,
}

impl MessageCode {
    pub fn as_u64(self) -> u64 {
        self as u64
    }

    /// Whether the code belongs to the given protocol version.
    pub fn supported_by(self, version: u32) -> bool {
        match self {
            Self::GetNodeData | Self::NodeData | Self::GetReceipts | Self::Receipts => {
                version >= ETH63
            }
            _ => true,
        }
    }
}

impl TryFrom<u64> for MessageCode {
    type Error = ProtocolError;

    fn try_from(code: u64) -> Result<Self, Self::Error> {
        Ok(match code {
            0x00 => Self::Status,
            0x01 => Self::NewBlockHashes,
            0x02 => Self::Transactions,
            0x03 => Self::GetBlockHeaders,
            0x04 => Self::BlockHeaders,
            0x05 => Self::GetBlockBodies,
            0x06 => Self::BlockBodies,
            0x07 => Self::NewBlock,
            0x0d => Self::GetNodeData,
            0x0e => Self::NodeData,
            0x0f => Self::GetReceipts,
            0x10 => Self::Receipts,
            other => return Err(ProtocolError::InvalidMsgCode(other)),
        })
    }
}

/// Status message: the first message on every connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusData {
    pub protocol_version: u32,
    pub network_id: u64,
    pub total_difficulty: TotalDifficulty,
    pub current_block: Hash,
    pub genesis_block: Hash,
}

/// One record of a `NewBlockHashes` announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHashAnnouncement {
    pub hash: Hash,
    pub number: u64,
}

/// Origin of a header query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashOrNumber {
    Hash(Hash),
    Number(u64),
}

/// `GetBlockHeaders` query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetBlockHeadersRequest {
    pub origin: HashOrNumber,
    pub amount: u64,
    pub skip: u64,
    pub reverse: bool,
}

/// `NewBlock` propagation payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBlockData {
    pub block: Block,
    pub total_difficulty: TotalDifficulty,
}

/// Pre-encoded item (block body, receipt list, trie node).
pub type RawValue = Vec<u8>;

/// Every message of eth/62 and eth/63.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolMessage {
    Status(StatusData),
    NewBlockHashes(Vec<BlockHashAnnouncement>),
    Transactions(Vec<Transaction>),
    GetBlockHeaders(GetBlockHeadersRequest),
    BlockHeaders(Vec<BlockHeader>),
    GetBlockBodies(Vec<Hash>),
    BlockBodies(Vec<RawValue>),
    NewBlock(NewBlockData),
    GetNodeData(Vec<Hash>),
    NodeData(Vec<RawValue>),
    GetReceipts(Vec<Hash>),
    Receipts(Vec<RawValue>),
}

impl ProtocolMessage {
    pub fn code(&self) -> MessageCode {
        match self {
            Self::Status(_) => MessageCode::Status,
            Self::NewBlockHashes(_) => MessageCode::NewBlockHashes,
            Self::Transactions(_) => MessageCode::Transactions,
            Self::GetBlockHeaders(_) => MessageCode::GetBlockHeaders,
            Self::BlockHeaders(_) => MessageCode::BlockHeaders,
            Self::GetBlockBodies(_) => MessageCode::GetBlockBodies,
            Self::BlockBodies(_) => MessageCode::BlockBodies,
            Self::NewBlock(_) => MessageCode::NewBlock,
            Self::GetNodeData(_) => MessageCode::GetNodeData,
            Self::NodeData(_) => MessageCode::NodeData,
            Self::GetReceipts(_) => MessageCode::GetReceipts,
            Self::Receipts(_) => MessageCode::Receipts,
        }
    }

    /// Encode into a transport frame.
    pub fn encode(&self) -> Result<RawMessage, ProtocolError> {
        let code = self.code().as_u64();
        let payload = match self {
            Self::Status(v) => encode_payload(code, v)?,
            Self::NewBlockHashes(v) => encode_payload(code, v)?,
            Self::Transactions(v) => encode_payload(code, v)?,
            Self::GetBlockHeaders(v) => encode_payload(code, v)?,
            Self::BlockHeaders(v) => encode_payload(code, v)?,
            Self::GetBlockBodies(v) => encode_payload(code, v)?,
            Self::BlockBodies(v) => encode_payload(code, v)?,
            Self::NewBlock(v) => encode_payload(code, v)?,
            Self::GetNodeData(v) => encode_payload(code, v)?,
            Self::NodeData(v) => encode_payload(code, v)?,
            Self::GetReceipts(v) => encode_payload(code, v)?,
            Self::Receipts(v) => encode_payload(code, v)?,
        };
        Ok(RawMessage::new(code, payload))
    }

    /// Decode a transport frame. Oversized frames are rejected before the
    /// payload is touched.
    pub fn decode(raw: &RawMessage) -> Result<Self, ProtocolError> {
        raw.check_size()?;
        let code = MessageCode::try_from(raw.code)?;
        Ok(match code {
            MessageCode::Status => Self::Status(raw.decode()?),
            MessageCode::NewBlockHashes => Self::NewBlockHashes(raw.decode()?),
            MessageCode::Transactions => Self::Transactions(raw.decode()?),
            MessageCode::GetBlockHeaders => Self::GetBlockHeaders(raw.decode()?),
            MessageCode::BlockHeaders => Self::BlockHeaders(raw.decode()?),
            MessageCode::GetBlockBodies => Self::GetBlockBodies(raw.decode()?),
            MessageCode::BlockBodies => Self::BlockBodies(raw.decode()?),
            MessageCode::NewBlock => Self::NewBlock(raw.decode()?),
            MessageCode::GetNodeData => Self::GetNodeData(raw.decode()?),
            MessageCode::NodeData => Self::NodeData(raw.decode()?),
            MessageCode::GetReceipts => Self::GetReceipts(raw.decode()?),
            MessageCode::Receipts => Self::Receipts(raw.decode()?),
        })
    }
}

/// A message as delivered by the transport: kind tag, declared size and the
/// still-encoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub code: u64,
    /// Size declared by the transport; may exceed `payload.len()` when the
    /// transport refused to buffer an oversized frame.
    pub size: u32,
    pub payload: Vec<u8>,
}

impl RawMessage {
    pub fn new(code: u64, payload: Vec<u8>) -> Self {
        let size = u32::try_from(payload.len()).unwrap_or(u32::MAX);
        Self {
            code,
            size,
            payload,
        }
    }

    /// Rejects messages declaring more than `PROTOCOL_MAX_MSG_SIZE` bytes.
    pub fn check_size(&self) -> Result<(), ProtocolError> {
        if self.size > PROTOCOL_MAX_MSG_SIZE {
            return Err(ProtocolError::MsgTooLarge {
                size: self.size,
                max: PROTOCOL_MAX_MSG_SIZE,
            });
        }
        Ok(())
    }

    /// Lazily decode the payload into `T`.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        decode_payload(self.code, &self.payload)
    }
}

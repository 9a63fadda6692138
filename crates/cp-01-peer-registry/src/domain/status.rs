//! Validation of a received Status message.
//!
//! Checks run in a fixed order and the first failure wins:
//! code, declared size, decode, genesis, network id, protocol version.

use shared_types::Hash;

use super::{
    HandshakeError, MessageCode, NegotiationMismatch, ProtocolError, RawMessage, StatusData,
    PROTOCOL_MAX_MSG_SIZE,
};

/// What the local side expects from the remote's Status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusExpectation {
    pub genesis: Hash,
    pub network_id: u64,
    pub protocol_version: u32,
}

/// Validate the first inbound message of a handshake and return the
/// decoded status on success.
pub fn validate_status(
    raw: &RawMessage,
    expected: &StatusExpectation,
) -> Result<StatusData, HandshakeError> {
    let status_code = MessageCode::Status.as_u64();
    if raw.code != status_code {
        return Err(ProtocolError::NoStatusMsg {
            got: raw.code,
            expected: status_code,
        }
        .into());
    }
    if raw.size > PROTOCOL_MAX_MSG_SIZE {
        return Err(ProtocolError::MsgTooLarge {
            size: raw.size,
            max: PROTOCOL_MAX_MSG_SIZE,
        }
        .into());
    }

    let status: StatusData = raw.decode()?;

    if status.genesis_block != expected.genesis {
        return Err(NegotiationMismatch::GenesisBlock {
            ours: expected.genesis,
            theirs: status.genesis_block,
        }
        .into());
    }
    if status.network_id != expected.network_id {
        return Err(NegotiationMismatch::NetworkId {
            ours: expected.network_id,
            theirs: status.network_id,
        }
        .into());
    }
    if status.protocol_version != expected.protocol_version {
        return Err(NegotiationMismatch::ProtocolVersion {
            ours: expected.protocol_version,
            theirs: status.protocol_version,
        }
        .into());
    }
    Ok(status)
}

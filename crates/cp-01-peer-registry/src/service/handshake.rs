//! # Status Handshake
//!
//! Sends the local Status and reads the remote's concurrently, bounded by a
//! single deadline. The same procedure refreshes an already registered peer.
//!
//! ```text
//! Idle ──→ AwaitingBoth ──┬──→ Negotiated (head/td recorded)
//!                         └──→ Failed     (head/td untouched)
//! ```

use shared_types::{hash_hex, Hash, TotalDifficulty};
use std::time::Duration;
use tracing::debug;

use crate::domain::{
    validate_status, HandshakeError, ProtocolMessage, StatusData, StatusExpectation,
};

use super::Peer;

/// Deadline for the whole status exchange.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

impl Peer {
    /// Negotiate (or refresh) chain identity and head with the remote.
    ///
    /// On success the peer's head and total difficulty are replaced by the
    /// remote's and the received status is returned. On any failure the
    /// recorded head is left as it was; the caller decides whether to drop
    /// the connection.
    pub async fn handshake(
        &self,
        network_id: u64,
        total_difficulty: TotalDifficulty,
        head: Hash,
        genesis: Hash,
    ) -> Result<StatusData, HandshakeError> {
        let expected = StatusExpectation {
            genesis,
            network_id,
            protocol_version: self.version(),
        };
        let outbound = ProtocolMessage::Status(StatusData {
            protocol_version: self.version(),
            network_id,
            total_difficulty,
            current_block: head,
            genesis_block: genesis,
        })
        .encode()?;

        let read = async {
            self.read_status()
                .await
                .map_err(HandshakeError::from)
                .and_then(|raw| validate_status(&raw, &expected))
        };
        let write = async {
            self.send_raw(outbound)
                .await
                .map_err(HandshakeError::from)
        };

        let status = match tokio::time::timeout(HANDSHAKE_TIMEOUT, async {
            tokio::try_join!(read, write)
        })
        .await
        {
            Ok(result) => result?.0,
            Err(_) => return Err(HandshakeError::Timeout(HANDSHAKE_TIMEOUT)),
        };

        self.set_head(status.current_block, status.total_difficulty);
        debug!(
            peer = %self.identity().short(),
            head = %hash_hex(&status.current_block),
            td = %status.total_difficulty,
            "Status handshake complete"
        );
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{pipe, MemoryChannel};
    use crate::domain::{
        NegotiationMismatch, ProtocolError, RawMessage, TransportError, ETH63,
    };
    use crate::ports::outbound::MessageChannel;
    use shared_types::{PeerIdentity, U256, PEER_IDENTITY_LEN};
    use std::sync::Arc;

    const GENESIS: Hash = [0x0A; 32];
    const NETWORK: u64 = 1;

    fn setup() -> (Arc<Peer>, MemoryChannel) {
        let (local, remote) = pipe(
            PeerIdentity::new([1u8; PEER_IDENTITY_LEN]),
            PeerIdentity::new([2u8; PEER_IDENTITY_LEN]),
            ETH63,
            8,
        );
        (Arc::new(Peer::new(Arc::new(local))), remote)
    }

    fn remote_status(genesis: Hash, network_id: u64, td: u64) -> RawMessage {
        ProtocolMessage::Status(StatusData {
            protocol_version: ETH63,
            network_id,
            total_difficulty: U256::from(td),
            current_block: [0xEE; 32],
            genesis_block: genesis,
        })
        .encode()
        .unwrap()
    }

    async fn local_handshake(peer: &Peer) -> Result<StatusData, HandshakeError> {
        peer.handshake(NETWORK, U256::from(1u64), [0x01; 32], GENESIS)
            .await
    }

    #[tokio::test]
    async fn test_handshake_records_remote_head() {
        let (peer, remote) = setup();
        remote
            .send(remote_status(GENESIS, NETWORK, 500))
            .await
            .unwrap();

        let status = local_handshake(&peer).await.unwrap();
        assert_eq!(status.total_difficulty, U256::from(500u64));
        assert_eq!(peer.head(), ([0xEE; 32], Some(U256::from(500u64))));

        // The remote received our status
        let ours = ProtocolMessage::decode(&remote.recv().await.unwrap()).unwrap();
        match ours {
            ProtocolMessage::Status(s) => {
                assert_eq!(s.genesis_block, GENESIS);
                assert_eq!(s.current_block, [0x01; 32]);
            }
            other => panic!("expected status, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_genesis_mismatch_leaves_head_unchanged() {
        let (peer, remote) = setup();
        peer.set_head([0x33; 32], U256::from(9u64));
        remote
            .send(remote_status([0xFF; 32], NETWORK, 10_000))
            .await
            .unwrap();

        let err = local_handshake(&peer).await.unwrap_err();
        assert!(matches!(
            err,
            HandshakeError::Mismatch(NegotiationMismatch::GenesisBlock { .. })
        ));
        assert_eq!(peer.head(), ([0x33; 32], Some(U256::from(9u64))));
    }

    #[tokio::test]
    async fn test_non_status_first_message() {
        let (peer, remote) = setup();
        remote
            .send(ProtocolMessage::Transactions(vec![]).encode().unwrap())
            .await
            .unwrap();

        assert_eq!(
            local_handshake(&peer).await,
            Err(HandshakeError::Protocol(ProtocolError::NoStatusMsg {
                got: 0x02,
                expected: 0x00
            }))
        );
        assert_eq!(peer.head().1, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_remote_times_out() {
        let (peer, _remote) = setup();
        assert_eq!(
            local_handshake(&peer).await,
            Err(HandshakeError::Timeout(HANDSHAKE_TIMEOUT))
        );
    }

    #[tokio::test]
    async fn test_closed_transport() {
        let (peer, remote) = setup();
        drop(remote);
        assert!(matches!(
            local_handshake(&peer).await,
            Err(HandshakeError::Transport(TransportError::Closed))
        ));
    }

    #[tokio::test]
    async fn test_refresh_while_serving_uses_status_inbox() {
        let (peer, remote) = setup();
        peer.start_serving();

        let reader_peer = Arc::clone(&peer);
        let reader = tokio::spawn(async move { reader_peer.next_message().await });

        let refresher = Arc::clone(&peer);
        let refresh = tokio::spawn(async move {
            refresher
                .handshake(NETWORK, U256::from(1u64), [0x01; 32], GENESIS)
                .await
        });

        // Answer the refresh once our status arrives, then send a normal
        // message for the reader.
        let ours = remote.recv().await.unwrap();
        assert_eq!(ours.code, 0x00);
        remote
            .send(remote_status(GENESIS, NETWORK, 777))
            .await
            .unwrap();

        let status = refresh.await.unwrap().unwrap();
        assert_eq!(status.total_difficulty, U256::from(777u64));
        assert_eq!(peer.head().1, Some(U256::from(777u64)));

        remote
            .send(ProtocolMessage::GetReceipts(vec![]).encode().unwrap())
            .await
            .unwrap();
        assert_eq!(
            reader.await.unwrap().unwrap(),
            ProtocolMessage::GetReceipts(vec![])
        );
    }
}

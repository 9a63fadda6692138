//! # Peer
//!
//! One negotiated connection: immutable identity and version, lock-protected
//! chain head, two bounded known-hash caches and the outbound message paths.
//!
//! The head lock is a `parking_lot::RwLock` and is never held across an
//! `.await`, so `head()` always yields a consistent (hash, difficulty) pair.

use parking_lot::RwLock;
use serde::Serialize;
use shared_types::{
    hash_hex, Block, BlockHeader, Hash, PeerIdentity, TotalDifficulty, Transaction,
};
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::domain::{
    BlockHashAnnouncement, GetBlockHeadersRequest, HashOrNumber, KnownHashCache, MessageCode,
    NewBlockData, PeerError, ProtocolError, ProtocolMessage, RawMessage, RawValue,
    TransportError, PROTOCOL_NAME,
};
use crate::ports::outbound::MessageChannel;

#[derive(Debug, Clone, Copy, Default)]
struct ChainHead {
    head: Hash,
    total_difficulty: Option<TotalDifficulty>,
    genesis: Hash,
}

/// Diagnostic snapshot of a peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerInfo {
    pub version: u32,
    pub difficulty: Option<TotalDifficulty>,
    pub head: String,
}

/// A remote node speaking the `eth` sub-protocol.
pub struct Peer {
    identity: PeerIdentity,
    version: u32,
    remote_addr: Option<SocketAddr>,
    channel: Arc<dyn MessageChannel>,

    chain: RwLock<ChainHead>,

    known_blocks: KnownHashCache,
    known_txs: KnownHashCache,

    /// Set once a reader task owns `channel.recv()`.
    serving: AtomicBool,
    /// Set while a refresh handshake waits for the remote's Status.
    awaiting_status: AtomicBool,
    status_tx: mpsc::Sender<RawMessage>,
    status_rx: Mutex<mpsc::Receiver<RawMessage>>,
}

impl Peer {
    /// Wrap an established session. Identity and version come from the
    /// session layer.
    pub fn new(channel: Arc<dyn MessageChannel>) -> Self {
        let (status_tx, status_rx) = mpsc::channel(1);
        Self {
            identity: channel.remote_identity(),
            version: channel.protocol_version(),
            remote_addr: channel.remote_addr(),
            channel,
            chain: RwLock::new(ChainHead::default()),
            known_blocks: KnownHashCache::for_blocks(),
            known_txs: KnownHashCache::for_transactions(),
            serving: AtomicBool::new(false),
            awaiting_status: AtomicBool::new(false),
            status_tx,
            status_rx: Mutex::new(status_rx),
        }
    }

    pub fn identity(&self) -> PeerIdentity {
        self.identity
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    // =========================================================================
    // Head state
    // =========================================================================

    /// Current head and total difficulty. The difficulty is `None` until a
    /// handshake or `set_head` has recorded one.
    pub fn head(&self) -> (Hash, Option<TotalDifficulty>) {
        let chain = self.chain.read();
        (chain.head, chain.total_difficulty)
    }

    pub fn set_head(&self, head: Hash, total_difficulty: TotalDifficulty) {
        let mut chain = self.chain.write();
        chain.head = head;
        chain.total_difficulty = Some(total_difficulty);
    }

    pub fn genesis(&self) -> Hash {
        self.chain.read().genesis
    }

    pub fn set_genesis(&self, genesis: Hash) {
        self.chain.write().genesis = genesis;
    }

    pub fn info(&self) -> PeerInfo {
        let (head, difficulty) = self.head();
        PeerInfo {
            version: self.version,
            difficulty,
            head: hash_hex(&head),
        }
    }

    // =========================================================================
    // Known hashes
    // =========================================================================

    pub fn mark_block(&self, hash: Hash) {
        self.known_blocks.add(hash);
    }

    pub fn mark_transaction(&self, hash: Hash) {
        self.known_txs.add(hash);
    }

    pub fn knows_block(&self, hash: &Hash) -> bool {
        self.known_blocks.has(hash)
    }

    pub fn knows_transaction(&self, hash: &Hash) -> bool {
        self.known_txs.has(hash)
    }

    pub fn known_blocks(&self) -> &KnownHashCache {
        &self.known_blocks
    }

    pub fn known_transactions(&self) -> &KnownHashCache {
        &self.known_txs
    }

    // =========================================================================
    // Gossip
    // =========================================================================

    /// Marks every transaction known, then sends them all.
    pub async fn send_transactions(&self, txs: Vec<Transaction>) -> Result<(), PeerError> {
        for tx in &txs {
            self.known_txs.add(tx.hash());
        }
        self.send(ProtocolMessage::Transactions(txs)).await
    }

    /// Announces blocks by hash and number. The two slices are zipped; any
    /// surplus on the longer side is ignored.
    pub async fn send_new_block_hashes(
        &self,
        hashes: &[Hash],
        numbers: &[u64],
    ) -> Result<(), PeerError> {
        let announcements = hashes
            .iter()
            .zip(numbers)
            .map(|(hash, number)| {
                self.known_blocks.add(*hash);
                BlockHashAnnouncement {
                    hash: *hash,
                    number: *number,
                }
            })
            .collect();
        self.send(ProtocolMessage::NewBlockHashes(announcements))
            .await
    }

    pub async fn send_new_block(
        &self,
        block: Block,
        total_difficulty: TotalDifficulty,
    ) -> Result<(), PeerError> {
        self.known_blocks.add(block.hash());
        self.send(ProtocolMessage::NewBlock(NewBlockData {
            block,
            total_difficulty,
        }))
        .await
    }

    // =========================================================================
    // Responses
    // =========================================================================

    pub async fn send_block_headers(&self, headers: Vec<BlockHeader>) -> Result<(), PeerError> {
        self.send(ProtocolMessage::BlockHeaders(headers)).await
    }

    /// Sends pre-encoded block bodies.
    pub async fn send_block_bodies(&self, bodies: Vec<RawValue>) -> Result<(), PeerError> {
        self.send(ProtocolMessage::BlockBodies(bodies)).await
    }

    pub async fn send_node_data(&self, data: Vec<Vec<u8>>) -> Result<(), PeerError> {
        self.send(ProtocolMessage::NodeData(data)).await
    }

    /// Sends pre-encoded receipt lists.
    pub async fn send_receipts(&self, receipts: Vec<RawValue>) -> Result<(), PeerError> {
        self.send(ProtocolMessage::Receipts(receipts)).await
    }

    // =========================================================================
    // Requests
    // =========================================================================

    /// Fetches a single header by hash.
    pub async fn request_one_header(&self, hash: Hash) -> Result<(), PeerError> {
        debug!(peer = %self.identity.short(), hash = %hash_hex(&hash), "Fetching single header");
        self.request_headers(GetBlockHeadersRequest {
            origin: HashOrNumber::Hash(hash),
            amount: 1,
            skip: 0,
            reverse: false,
        })
        .await
    }

    pub async fn request_headers_by_hash(
        &self,
        origin: Hash,
        amount: u64,
        skip: u64,
        reverse: bool,
    ) -> Result<(), PeerError> {
        debug!(
            peer = %self.identity.short(),
            origin = %hash_hex(&origin),
            amount,
            skip,
            reverse,
            "Fetching batch of headers"
        );
        self.request_headers(GetBlockHeadersRequest {
            origin: HashOrNumber::Hash(origin),
            amount,
            skip,
            reverse,
        })
        .await
    }

    pub async fn request_headers_by_number(
        &self,
        origin: u64,
        amount: u64,
        skip: u64,
        reverse: bool,
    ) -> Result<(), PeerError> {
        debug!(
            peer = %self.identity.short(),
            origin,
            amount,
            skip,
            reverse,
            "Fetching batch of headers"
        );
        self.request_headers(GetBlockHeadersRequest {
            origin: HashOrNumber::Number(origin),
            amount,
            skip,
            reverse,
        })
        .await
    }

    async fn request_headers(&self, request: GetBlockHeadersRequest) -> Result<(), PeerError> {
        self.send(ProtocolMessage::GetBlockHeaders(request)).await
    }

    pub async fn request_bodies(&self, hashes: Vec<Hash>) -> Result<(), PeerError> {
        debug!(peer = %self.identity.short(), count = hashes.len(), "Fetching batch of block bodies");
        self.send(ProtocolMessage::GetBlockBodies(hashes)).await
    }

    /// Requests state trie nodes (eth/63).
    pub async fn request_node_data(&self, hashes: Vec<Hash>) -> Result<(), PeerError> {
        debug!(peer = %self.identity.short(), count = hashes.len(), "Fetching batch of state data");
        self.send(ProtocolMessage::GetNodeData(hashes)).await
    }

    /// Requests block receipts (eth/63).
    pub async fn request_receipts(&self, hashes: Vec<Hash>) -> Result<(), PeerError> {
        debug!(peer = %self.identity.short(), count = hashes.len(), "Fetching batch of receipts");
        self.send(ProtocolMessage::GetReceipts(hashes)).await
    }

    // =========================================================================
    // Wire
    // =========================================================================

    /// Encode and send one message. Codes the negotiated version does not
    /// define are refused locally.
    pub async fn send(&self, msg: ProtocolMessage) -> Result<(), PeerError> {
        let code = msg.code();
        if !code.supported_by(self.version) {
            return Err(ProtocolError::InvalidMsgCode(code.as_u64()).into());
        }
        let raw = msg.encode()?;
        self.send_raw(raw).await?;
        Ok(())
    }

    pub(crate) async fn send_raw(&self, raw: RawMessage) -> Result<(), TransportError> {
        self.channel.send(raw).await
    }

    /// Hand `recv()` over to a reader task. From now on Status messages are
    /// only seen by a refresh handshake through the status inbox.
    pub fn start_serving(&self) {
        self.serving.store(true, Ordering::Release);
    }

    pub fn is_serving(&self) -> bool {
        self.serving.load(Ordering::Acquire)
    }

    /// Next non-Status message from the remote.
    ///
    /// Status messages are routed to the status inbox; unknown codes and
    /// codes outside the negotiated version are skipped.
    pub async fn next_message(&self) -> Result<ProtocolMessage, PeerError> {
        loop {
            let raw = self.channel.recv().await?;
            if raw.code == MessageCode::Status.as_u64() {
                self.deliver_status(raw);
                continue;
            }
            let known = MessageCode::try_from(raw.code)
                .map(|code| code.supported_by(self.version))
                .unwrap_or(false);
            if !known {
                debug!(peer = %self.identity.short(), code = raw.code, "Ignoring unknown message");
                continue;
            }
            return Ok(ProtocolMessage::decode(&raw)?);
        }
    }

    fn deliver_status(&self, raw: RawMessage) {
        if !self.awaiting_status.load(Ordering::Acquire) {
            debug!(peer = %self.identity.short(), "Dropping unsolicited status");
            return;
        }
        if self.status_tx.try_send(raw).is_err() {
            debug!(peer = %self.identity.short(), "Status inbox full, dropping");
        }
    }

    /// The remote's next Status frame, undecoded.
    ///
    /// Before serving this reads the channel directly. While serving it
    /// waits on the inbox the reader task feeds.
    pub(crate) async fn read_status(&self) -> Result<RawMessage, TransportError> {
        if !self.is_serving() {
            return self.channel.recv().await;
        }
        let mut inbox = self.status_rx.lock().await;
        while inbox.try_recv().is_ok() {}
        self.awaiting_status.store(true, Ordering::Release);
        let _awaiting = AwaitingStatus(&self.awaiting_status);
        inbox.recv().await.ok_or(TransportError::Closed)
    }
}

/// Clears the awaiting flag when a status wait ends, including on timeout.
struct AwaitingStatus<'a>(&'a AtomicBool);

impl Drop for AwaitingStatus<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Peer {} [{}/{}]", self.identity, PROTOCOL_NAME, self.version)
    }
}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peer")
            .field("identity", &self.identity)
            .field("version", &self.version)
            .field("remote_addr", &self.remote_addr)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::pipe;
    use crate::domain::{ETH62, ETH63};
    use shared_types::{U256, PEER_IDENTITY_LEN};

    fn identity(byte: u8) -> PeerIdentity {
        PeerIdentity::new([byte; PEER_IDENTITY_LEN])
    }

    fn peer_pair(version: u32) -> (Peer, crate::adapters::MemoryChannel) {
        let (local, remote) = pipe(identity(0xAA), identity(0xBB), version, 16);
        (Peer::new(Arc::new(local)), remote)
    }

    async fn next(remote: &crate::adapters::MemoryChannel) -> ProtocolMessage {
        ProtocolMessage::decode(&remote.recv().await.unwrap()).unwrap()
    }

    fn tx(nonce: u64) -> Transaction {
        Transaction {
            nonce,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_head_is_unset_until_recorded() {
        let (peer, _remote) = peer_pair(ETH63);
        assert_eq!(peer.head(), ([0u8; 32], None));

        peer.set_head([3u8; 32], U256::from(42u64));
        assert_eq!(peer.head(), ([3u8; 32], Some(U256::from(42u64))));
    }

    #[tokio::test]
    async fn test_genesis_setter() {
        let (peer, _remote) = peer_pair(ETH63);
        peer.set_genesis([9u8; 32]);
        assert_eq!(peer.genesis(), [9u8; 32]);
        // Genesis does not touch the head pair
        assert_eq!(peer.head().1, None);
    }

    #[tokio::test]
    async fn test_send_transactions_marks_then_sends() {
        let (peer, remote) = peer_pair(ETH63);
        let txs = vec![tx(1), tx(2)];
        let hashes: Vec<Hash> = txs.iter().map(Transaction::hash).collect();

        peer.send_transactions(txs.clone()).await.unwrap();

        assert!(hashes.iter().all(|h| peer.knows_transaction(h)));
        assert_eq!(next(&remote).await, ProtocolMessage::Transactions(txs));
    }

    #[tokio::test]
    async fn test_send_new_block_hashes_zips_records() {
        let (peer, remote) = peer_pair(ETH63);
        peer.send_new_block_hashes(&[[1u8; 32], [2u8; 32], [3u8; 32]], &[10, 11])
            .await
            .unwrap();

        assert!(peer.knows_block(&[1u8; 32]));
        assert!(peer.knows_block(&[2u8; 32]));
        assert!(!peer.knows_block(&[3u8; 32]));
        assert_eq!(
            next(&remote).await,
            ProtocolMessage::NewBlockHashes(vec![
                BlockHashAnnouncement {
                    hash: [1u8; 32],
                    number: 10
                },
                BlockHashAnnouncement {
                    hash: [2u8; 32],
                    number: 11
                },
            ])
        );
    }

    #[tokio::test]
    async fn test_send_new_block_marks_block_hash() {
        let (peer, remote) = peer_pair(ETH63);
        let block = Block::default();
        let hash = block.hash();

        peer.send_new_block(block.clone(), U256::from(7u64))
            .await
            .unwrap();

        assert!(peer.knows_block(&hash));
        assert_eq!(
            next(&remote).await,
            ProtocolMessage::NewBlock(NewBlockData {
                block,
                total_difficulty: U256::from(7u64)
            })
        );
    }

    #[tokio::test]
    async fn test_responses_do_not_touch_caches() {
        let (peer, remote) = peer_pair(ETH63);
        peer.send_block_headers(vec![BlockHeader::default()])
            .await
            .unwrap();
        peer.send_receipts(vec![vec![1, 2]]).await.unwrap();

        assert!(peer.known_blocks().is_empty());
        assert!(matches!(next(&remote).await, ProtocolMessage::BlockHeaders(_)));
        assert_eq!(next(&remote).await, ProtocolMessage::Receipts(vec![vec![1, 2]]));
    }

    #[tokio::test]
    async fn test_request_one_header() {
        let (peer, remote) = peer_pair(ETH63);
        peer.request_one_header([5u8; 32]).await.unwrap();
        assert_eq!(
            next(&remote).await,
            ProtocolMessage::GetBlockHeaders(GetBlockHeadersRequest {
                origin: HashOrNumber::Hash([5u8; 32]),
                amount: 1,
                skip: 0,
                reverse: false,
            })
        );
    }

    #[tokio::test]
    async fn test_eth63_requests_refused_on_eth62() {
        let (peer, _remote) = peer_pair(ETH62);
        assert_eq!(
            peer.request_receipts(vec![[1u8; 32]]).await,
            Err(PeerError::Protocol(ProtocolError::InvalidMsgCode(0x0f)))
        );
        assert!(peer.request_bodies(vec![[1u8; 32]]).await.is_ok());
    }

    #[tokio::test]
    async fn test_next_message_skips_unknown_and_unsolicited_status() {
        let (peer, remote) = peer_pair(ETH63);
        peer.start_serving();

        remote.send(RawMessage::new(0x00, vec![])).await.unwrap();
        remote.send(RawMessage::new(0x11, vec![1])).await.unwrap();
        remote
            .send(ProtocolMessage::GetBlockBodies(vec![]).encode().unwrap())
            .await
            .unwrap();

        assert_eq!(
            peer.next_message().await.unwrap(),
            ProtocolMessage::GetBlockBodies(vec![])
        );
    }

    #[tokio::test]
    async fn test_display_and_info() {
        let (peer, _remote) = peer_pair(ETH63);
        let shown = peer.to_string();
        assert!(shown.starts_with("Peer bbbb"));
        assert!(shown.ends_with(" [eth/63]"));

        peer.set_head([0xCD; 32], U256::from(100u64));
        let info = peer.info();
        assert_eq!(info.version, 63);
        assert_eq!(info.difficulty, Some(U256::from(100u64)));
        assert_eq!(info.head, hash_hex(&[0xCD; 32]));
        assert!(serde_json::to_string(&info).unwrap().contains("\"version\":63"));
    }
}

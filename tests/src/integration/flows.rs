//! # Integration Test Flows
//!
//! Drives the peer registry, the chain aggregator, the address book and the
//! runtime node together.
//!
//! ## Flows Tested:
//!
//! 1. **Attach → Aggregator**: a negotiated peer's status becomes the best
//!    chain state, its gossip becomes the best height
//! 2. **Pull → Refresh → Headers**: the pull tick refreshes the best peer and
//!    the requested head header comes back as the best header
//! 3. **Report → Address book**: registered peers are heartbeated
//! 4. **TCP**: two probers negotiate over the development transport

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;

    use cp_01_peer_registry::adapters::{pipe, MemoryChannel};
    use cp_01_peer_registry::{
        MessageChannel, Peer, PeerSet, ProtocolMessage, StatusData, ETH63,
    };
    use cp_02_chain_aggregator::{AggregateSnapshot, AggregatorConfig, ChainStateAggregator};
    use cp_03_address_book::{AddressStore, InMemoryAddressStore};
    use prober_runtime::{NodeParams, ProberNode};
    use shared_types::{Block, BlockHeader, Hash, PeerIdentity, U256, PEER_IDENTITY_LEN};
    use tokio::net::TcpListener;
    use tokio::sync::watch;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    fn identity(byte: u8) -> PeerIdentity {
        PeerIdentity::new([byte; PEER_IDENTITY_LEN])
    }

    fn config() -> AggregatorConfig {
        AggregatorConfig {
            start_total_difficulty: U256::from(100u64),
            ..AggregatorConfig::default()
        }
    }

    /// One prober: node, its address book and its snapshot stream.
    struct Prober {
        node: Arc<ProberNode>,
        store: Arc<InMemoryAddressStore>,
        snapshots: watch::Receiver<AggregateSnapshot>,
        shutdown: watch::Sender<bool>,
    }

    fn prober(id: u8) -> Prober {
        listening_prober(id, 0)
    }

    fn listening_prober(id: u8, listen_port: u16) -> Prober {
        let config = config();
        let peers = Arc::new(PeerSet::new());
        let store = Arc::new(InMemoryAddressStore::new());
        let (aggregator, handle) = ChainStateAggregator::new(config.clone(), Arc::clone(&peers));
        let aggregator = aggregator.with_address_book(store.clone());
        let snapshots = aggregator.subscribe();
        let (shutdown, shutdown_rx) = watch::channel(false);
        tokio::spawn(aggregator.run(shutdown_rx.clone()));

        let params = NodeParams {
            identity: identity(id),
            network_id: config.network_id,
            protocol_version: ETH63,
            genesis: config.genesis,
            max_peers: 8,
            listen_port,
        };
        let node = ProberNode::new(
            params,
            peers,
            store.clone(),
            handle,
            snapshots.clone(),
            shutdown_rx,
        );
        Prober {
            node,
            store,
            snapshots,
            shutdown,
        }
    }

    fn head_header(number: u64) -> BlockHeader {
        BlockHeader {
            number,
            difficulty: U256::from(7u64),
            ..BlockHeader::default()
        }
    }

    fn status(td: u64, head: Hash) -> ProtocolMessage {
        ProtocolMessage::Status(StatusData {
            protocol_version: ETH63,
            network_id: config().network_id,
            total_difficulty: U256::from(td),
            current_block: head,
            genesis_block: config().genesis,
        })
    }

    /// Remote node that answers every status with `td` and every header
    /// query with `header`.
    fn scripted_remote(channel: MemoryChannel, td: u64, header: BlockHeader) {
        tokio::spawn(async move {
            while let Ok(raw) = channel.recv().await {
                let reply = match ProtocolMessage::decode(&raw) {
                    Ok(ProtocolMessage::Status(_)) => status(td, header.hash()),
                    Ok(ProtocolMessage::GetBlockHeaders(_)) => {
                        ProtocolMessage::BlockHeaders(vec![header.clone()])
                    }
                    _ => continue,
                };
                let Ok(raw) = reply.encode() else { return };
                if channel.send(raw).await.is_err() {
                    return;
                }
            }
        });
    }

    fn remote_addr(byte: u8) -> SocketAddr {
        SocketAddr::from(([10, 0, 0, byte], 30303))
    }

    // =============================================================================
    // ATTACH → AGGREGATOR
    // =============================================================================

    #[tokio::test(start_paused = true)]
    async fn test_attached_peer_status_becomes_best_state() {
        let p = prober(0);
        let header = head_header(500);
        let (local, far) = pipe(identity(0), identity(1), ETH63, 16);
        scripted_remote(far, 1_000, header.clone());

        p.node
            .attach(Arc::new(local.with_remote_addr(remote_addr(1))))
            .await
            .unwrap();

        let mut snapshots = p.snapshots.clone();
        let snapshot = snapshots
            .wait_for(|s| s.best_state.total_difficulty == U256::from(1_000u64))
            .await
            .unwrap()
            .clone();
        assert_eq!(snapshot.best_state.current_block, header.hash());
        assert_eq!(snapshot.best_state.genesis, config().genesis);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gossip_raises_best_height() {
        let p = prober(0);
        let (local, far) = pipe(identity(0), identity(2), ETH63, 16);
        let far = Peer::new(Arc::new(far));
        let genesis = config().genesis;

        let (attached, negotiated) = tokio::join!(
            p.node.attach(Arc::new(local)),
            far.handshake(config().network_id, U256::from(200u64), [2; 32], genesis),
        );
        attached.unwrap();
        negotiated.unwrap();

        let block = Block {
            header: head_header(90),
            ..Block::default()
        };
        far.send_new_block(block, U256::from(300u64)).await.unwrap();
        far.send_new_block_hashes(&[[0x77; 32]], &[120]).await.unwrap();

        let mut snapshots = p.snapshots.clone();
        let snapshot = snapshots
            .wait_for(|s| s.best_height == 120)
            .await
            .unwrap()
            .clone();
        assert_eq!(snapshot.best_height_peer, Some(identity(2)));
        assert_eq!(snapshot.best_state.total_difficulty, U256::from(300u64));

        let peer = p.node.peers().peer(&identity(2)).unwrap();
        assert!(peer.knows_block(&[0x77; 32]));
        assert_eq!(peer.head().1, Some(U256::from(300u64)));
    }

    // =============================================================================
    // PULL → REFRESH → HEADERS
    // =============================================================================

    #[tokio::test(start_paused = true)]
    async fn test_refresh_fetches_best_header() {
        let p = prober(0);
        let header = head_header(4_242);
        let (local, far) = pipe(identity(0), identity(3), ETH63, 16);
        scripted_remote(far, 5_000, header.clone());
        p.node.attach(Arc::new(local)).await.unwrap();

        let mut snapshots = p.snapshots.clone();
        let snapshot = snapshots
            .wait_for(|s| s.best_header_number.is_some())
            .await
            .unwrap()
            .clone();
        assert_eq!(snapshot.best_header_number, Some(4_242));
    }

    #[tokio::test(start_paused = true)]
    async fn test_best_peer_is_highest_difficulty() {
        let p = prober(0);
        for (byte, td) in [(4u8, 700u64), (5, 900), (6, 800)] {
            let (local, far) = pipe(identity(0), identity(byte), ETH63, 16);
            scripted_remote(far, td, head_header(td));
            p.node.attach(Arc::new(local)).await.unwrap();
        }

        let best = p.node.peers().best_peer().unwrap();
        assert_eq!(best.identity(), identity(5));
        assert_eq!(p.node.peers().len(), 3);
    }

    // =============================================================================
    // REPORT → ADDRESS BOOK
    // =============================================================================

    #[tokio::test(start_paused = true)]
    async fn test_report_heartbeats_connected_peers() {
        let p = prober(0);
        let (local, far) = pipe(identity(0), identity(7), ETH63, 16);
        scripted_remote(far, 1_000, head_header(1));
        p.node
            .attach(Arc::new(local.with_remote_addr(remote_addr(7))))
            .await
            .unwrap();

        let ip = remote_addr(7).ip();
        let first = p.store.record(ip).await.unwrap().unwrap();

        // Past one report tick
        tokio::time::sleep(Duration::from_secs(31)).await;
        tokio::task::yield_now().await;

        let record = p.store.record(ip).await.unwrap().unwrap();
        assert_eq!(record.port, 30303);
        assert!(record.last_beat >= first.last_beat);
        assert!(p.store.good_addresses().await.unwrap().contains(&remote_addr(7)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_peer_set_refuses_new_peers() {
        let p = prober(0);
        p.node.peers().close();
        let (local, far) = pipe(identity(0), identity(8), ETH63, 16);
        scripted_remote(far, 1_000, head_header(1));

        assert!(p.node.attach(Arc::new(local)).await.is_err());
        assert!(p.node.peers().is_empty());
    }

    // =============================================================================
    // TCP
    // =============================================================================

    #[tokio::test]
    async fn test_two_probers_connect_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let a = listening_prober(0xA, addr.port());
        let b = prober(0xB);
        tokio::spawn(Arc::clone(&a.node).listen(listener));

        let id = b.node.dial(addr).await.unwrap();
        assert_eq!(id, identity(0xA));

        tokio::time::timeout(Duration::from_secs(5), async {
            while !a.node.peers().contains(&identity(0xB)) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        assert!(b.store.exists(addr.ip()).await.unwrap());
        assert_eq!(b.store.port(addr.ip()).await.unwrap(), Some(addr.port()));
        // B does not listen, so A has no address to dial it back on.
        assert_eq!(a.node.peers().peer(&identity(0xB)).unwrap().remote_addr(), None);
        assert!(!a.store.exists(addr.ip()).await.unwrap());

        a.shutdown.send(true).unwrap();
        b.shutdown.send(true).unwrap();
    }
}

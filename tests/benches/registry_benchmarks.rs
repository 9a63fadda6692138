//! # Peer Registry Benchmarks
//!
//! | Target | Operation | Expectation |
//! |--------|-----------|-------------|
//! | KnownHashCache | add at capacity (evicting) | O(1) |
//! | KnownHashCache | membership | O(1) |
//! | PeerSet | best_peer scan | O(n) |
//! | PeerSet | peers_without_block | O(n) |

use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use cp_01_peer_registry::adapters::pipe;
use cp_01_peer_registry::{KnownHashCache, Peer, PeerSet, ETH63, MAX_KNOWN_TXS};
use primitive_types::U256;
use rand::Rng;
use shared_types::{Hash, PeerIdentity, PEER_IDENTITY_LEN};

fn random_hashes(n: usize) -> Vec<Hash> {
    let mut rng = rand::thread_rng();
    (0..n).map(|_| rng.gen()).collect()
}

fn bench_known_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("cp-01-known-cache");
    group.measurement_time(Duration::from_secs(5));

    let hashes = random_hashes(MAX_KNOWN_TXS * 2);
    let cache = KnownHashCache::for_transactions();
    for hash in &hashes[..MAX_KNOWN_TXS] {
        cache.add(*hash);
    }

    group.bench_function("add_evicting", |b| {
        let mut i = MAX_KNOWN_TXS;
        b.iter(|| {
            cache.add(hashes[i]);
            i = if i + 1 == hashes.len() { MAX_KNOWN_TXS } else { i + 1 };
        })
    });

    group.bench_function("has", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % hashes.len();
            black_box(cache.has(&hashes[i]))
        })
    });

    group.finish();
}

fn peer_set(size: usize) -> PeerSet {
    let set = PeerSet::new();
    let mut rng = rand::thread_rng();
    for i in 0..size {
        let mut id = [0u8; PEER_IDENTITY_LEN];
        id[..8].copy_from_slice(&(i as u64).to_be_bytes());
        let (local, _remote) = pipe(PeerIdentity::new([0; PEER_IDENTITY_LEN]), PeerIdentity::new(id), ETH63, 1);
        let peer = Arc::new(Peer::new(Arc::new(local)));
        peer.set_head(rng.gen(), U256::from(rng.gen::<u64>()));
        for _ in 0..64 {
            peer.mark_block(rng.gen());
        }
        // Unique identities; registration cannot fail
        let _ = set.register(peer);
    }
    set
}

fn bench_peer_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("cp-01-peer-set");

    for size in [10, 100, 200] {
        let set = peer_set(size);
        let unseen: Hash = rand::thread_rng().gen();
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::new("best_peer", size), &set, |b, set| {
            b.iter(|| black_box(set.best_peer()))
        });
        group.bench_with_input(
            BenchmarkId::new("peers_without_block", size),
            &set,
            |b, set| b.iter(|| black_box(set.peers_without_block(&unseen).len())),
        );
    }

    group.finish();
}

criterion_group!(benches, bench_known_cache, bench_peer_set);
criterion_main!(benches);

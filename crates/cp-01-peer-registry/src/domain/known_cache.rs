//! Bounded membership set of hashes a peer is known to hold.

use parking_lot::Mutex;
use shared_types::Hash;
use std::collections::{HashSet, VecDeque};

/// Maximum block hashes to keep per peer.
pub const MAX_KNOWN_BLOCKS: usize = 1024;

/// Maximum transaction hashes to keep per peer.
pub const MAX_KNOWN_TXS: usize = 32768;

/// Bounded, internally synchronized set of hashes.
///
/// When full, `add` evicts the oldest inserted member before inserting the
/// new one. `has` does not refresh an entry, so this is FIFO, not LRU.
pub struct KnownHashCache {
    inner: Mutex<CacheInner>,
    capacity: usize,
}

struct CacheInner {
    members: HashSet<Hash>,
    order: VecDeque<Hash>,
}

impl KnownHashCache {
    /// Creates an empty cache. A zero capacity is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(CacheInner {
                members: HashSet::new(),
                order: VecDeque::new(),
            }),
            capacity,
        }
    }

    /// Cache sized for block hashes.
    pub fn for_blocks() -> Self {
        Self::new(MAX_KNOWN_BLOCKS)
    }

    /// Cache sized for transaction hashes.
    pub fn for_transactions() -> Self {
        Self::new(MAX_KNOWN_TXS)
    }

    pub fn has(&self, hash: &Hash) -> bool {
        self.inner.lock().members.contains(hash)
    }

    /// Inserts `hash`, evicting as needed to stay within capacity.
    /// Re-adding a present hash is a no-op.
    pub fn add(&self, hash: Hash) {
        let mut inner = self.inner.lock();
        if inner.members.contains(&hash) {
            return;
        }
        while inner.members.len() >= self.capacity {
            match inner.order.pop_front() {
                Some(evicted) => {
                    inner.members.remove(&evicted);
                }
                None => break,
            }
        }
        inner.members.insert(hash);
        inner.order.push_back(hash);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl std::fmt::Debug for KnownHashCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnownHashCache")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

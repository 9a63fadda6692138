//! # Peer Set
//!
//! Registry of live, negotiated peers keyed by identity.
//!
//! A single set-wide `RwLock` guards the map. Scans that need per-peer state
//! (`best_peer`, `peers_without_*`) hold the set's read lock and take each
//! peer's own lock briefly inside it: set-lock, then peer-lock, never the
//! other way around.

use parking_lot::RwLock;
use shared_types::{Hash, PeerIdentity, TotalDifficulty};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::domain::RegistryError;

use super::Peer;

struct PeerSetInner {
    peers: BTreeMap<PeerIdentity, Arc<Peer>>,
    closed: bool,
}

/// Thread-safe peer registry. Iteration follows identity order, so scans
/// and ties are deterministic.
pub struct PeerSet {
    inner: RwLock<PeerSetInner>,
}

impl Default for PeerSet {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerSet {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(PeerSetInner {
                peers: BTreeMap::new(),
                closed: false,
            }),
        }
    }

    /// Inject a peer into the active set.
    pub fn register(&self, peer: Arc<Peer>) -> Result<(), RegistryError> {
        let mut inner = self.inner.write();
        if inner.closed {
            return Err(RegistryError::Closed);
        }
        let id = peer.identity();
        if inner.peers.contains_key(&id) {
            return Err(RegistryError::AlreadyRegistered(id));
        }
        inner.peers.insert(id, peer);
        debug!(peer = %id.short(), total = inner.peers.len(), "Peer registered");
        Ok(())
    }

    /// Remove a peer from the active set, returning it.
    pub fn unregister(&self, id: &PeerIdentity) -> Result<Arc<Peer>, RegistryError> {
        let mut inner = self.inner.write();
        let peer = inner
            .peers
            .remove(id)
            .ok_or(RegistryError::NotRegistered(*id))?;
        debug!(peer = %id.short(), total = inner.peers.len(), "Peer unregistered");
        Ok(peer)
    }

    pub fn peer(&self, id: &PeerIdentity) -> Option<Arc<Peer>> {
        self.inner.read().peers.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &PeerIdentity) -> bool {
        self.inner.read().peers.contains_key(id)
    }

    /// Copy of the current map. Mutating it does not affect the registry.
    pub fn all_peers(&self) -> BTreeMap<PeerIdentity, Arc<Peer>> {
        self.inner.read().peers.clone()
    }

    /// Peers that do not have `hash` in their known-block cache.
    pub fn peers_without_block(&self, hash: &Hash) -> Vec<Arc<Peer>> {
        self.filter(|peer| !peer.knows_block(hash))
    }

    /// Peers that do not have `hash` in their known-transaction cache.
    pub fn peers_without_tx(&self, hash: &Hash) -> Vec<Arc<Peer>> {
        self.filter(|peer| !peer.knows_transaction(hash))
    }

    fn filter(&self, keep: impl Fn(&Peer) -> bool) -> Vec<Arc<Peer>> {
        let inner = self.inner.read();
        inner
            .peers
            .values()
            .filter(|peer| keep(Arc::as_ref(peer)))
            .cloned()
            .collect()
    }

    /// Peer with the strictly greatest recorded total difficulty.
    ///
    /// Peers without a recorded difficulty are skipped; on ties the first
    /// peer in identity order wins.
    pub fn best_peer(&self) -> Option<Arc<Peer>> {
        let inner = self.inner.read();
        let mut best: Option<(&Arc<Peer>, TotalDifficulty)> = None;
        for peer in inner.peers.values() {
            let Some(td) = peer.head().1 else {
                continue;
            };
            match best {
                Some((_, best_td)) if td <= best_td => {}
                _ => best = Some((peer, td)),
            }
        }
        best.map(|(peer, _)| Arc::clone(peer))
    }

    /// Refuse further registrations. Existing entries stay until removed.
    pub fn close(&self) {
        self.inner.write().closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.inner.read().closed
    }
}

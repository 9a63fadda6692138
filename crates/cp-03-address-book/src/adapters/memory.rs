//! In-memory `AddressStore`.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::net::{IpAddr, SocketAddr};
use tracing::debug;

use crate::domain::{NodeRecord, StoreError};
use crate::ports::AddressStore;

#[derive(Default)]
struct Tables {
    nodes: BTreeMap<IpAddr, NodeRecord>,
    good: BTreeSet<SocketAddr>,
}

/// Process-local address book. Contents are lost on restart.
#[derive(Default)]
pub struct InMemoryAddressStore {
    tables: RwLock<Tables>,
}

impl InMemoryAddressStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tables.read().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of all host records, for diagnostics.
    pub fn snapshot(&self) -> BTreeMap<IpAddr, NodeRecord> {
        self.tables.read().nodes.clone()
    }
}

#[async_trait]
impl AddressStore for InMemoryAddressStore {
    async fn register_reachable(
        &self,
        addr: SocketAddr,
        last_seen: i64,
    ) -> Result<(), StoreError> {
        let record = NodeRecord {
            port: addr.port(),
            last_beat: last_seen,
        };
        self.tables.write().nodes.insert(addr.ip(), record);
        debug!(%addr, last_seen, "Reachable address recorded");
        Ok(())
    }

    async fn register_good(&self, addr: SocketAddr) -> Result<(), StoreError> {
        self.tables.write().good.insert(addr);
        Ok(())
    }

    async fn exists(&self, ip: IpAddr) -> Result<bool, StoreError> {
        Ok(self.tables.read().nodes.contains_key(&ip))
    }

    async fn port(&self, ip: IpAddr) -> Result<Option<u16>, StoreError> {
        Ok(self.tables.read().nodes.get(&ip).map(|r| r.port))
    }

    async fn record(&self, ip: IpAddr) -> Result<Option<NodeRecord>, StoreError> {
        Ok(self.tables.read().nodes.get(&ip).copied())
    }

    async fn known_addresses(&self) -> Result<Vec<SocketAddr>, StoreError> {
        Ok(self
            .tables
            .read()
            .nodes
            .iter()
            .map(|(ip, record)| SocketAddr::new(*ip, record.port))
            .collect())
    }

    async fn good_addresses(&self) -> Result<Vec<SocketAddr>, StoreError> {
        Ok(self.tables.read().good.iter().copied().collect())
    }
}

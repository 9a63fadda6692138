//! Driven port for address persistence.

use async_trait::async_trait;
use std::net::{IpAddr, SocketAddr};

use crate::domain::{NodeRecord, StoreError};

/// Persistence collaborator for reachable and known-good addresses.
#[async_trait]
pub trait AddressStore: Send + Sync {
    /// Record that `addr` answered at `last_seen` (unix seconds). Replaces
    /// any earlier port for the same host.
    async fn register_reachable(&self, addr: SocketAddr, last_seen: i64)
        -> Result<(), StoreError>;

    /// Add `addr` to the known-good set.
    async fn register_good(&self, addr: SocketAddr) -> Result<(), StoreError>;

    async fn exists(&self, ip: IpAddr) -> Result<bool, StoreError>;

    /// Last known port for `ip`.
    async fn port(&self, ip: IpAddr) -> Result<Option<u16>, StoreError>;

    async fn record(&self, ip: IpAddr) -> Result<Option<NodeRecord>, StoreError>;

    /// Every reachable host with its last known port.
    async fn known_addresses(&self) -> Result<Vec<SocketAddr>, StoreError>;

    async fn good_addresses(&self) -> Result<Vec<SocketAddr>, StoreError>;
}

//! # Address Book (cp-03)
//!
//! Remembers where reachable peers live so the dialer can come back to them.
//!
//! Two collections are kept:
//! - per host: the last port a peer answered on and when it was last seen
//! - a set of "good" `host:port` pairs that completed a handshake
//!
//! The storage backend sits behind [`AddressStore`]; the in-memory adapter
//! is used by the runtime and tests.

pub mod adapters;
pub mod domain;
pub mod ports;

pub use adapters::InMemoryAddressStore;
pub use domain::{NodeRecord, StoreError};
pub use ports::AddressStore;

//! Service layer: the stateful objects built on the domain and ports.

mod handshake;
mod peer;
mod peer_set;
mod reader;

pub use handshake::HANDSHAKE_TIMEOUT;
pub use peer::{Peer, PeerInfo};
pub use peer_set::PeerSet;
pub use reader::PeerReader;

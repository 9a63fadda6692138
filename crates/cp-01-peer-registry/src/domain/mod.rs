//! # Domain Layer for the Peer Registry
//!
//! Pure logic with no I/O: the bounded known-hash cache, the closed set of
//! wire messages, status validation and the error taxonomy.

mod codec;
mod errors;
mod known_cache;
mod messages;
mod status;

pub use codec::*;
pub use errors::*;
pub use known_cache::*;
pub use messages::*;
pub use status::*;

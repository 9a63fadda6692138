//! Adapters for the registry's outbound ports.

pub mod memory;

pub use memory::{pipe, MemoryChannel, DEFAULT_PIPE_CAPACITY};

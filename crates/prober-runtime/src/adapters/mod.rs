//! Transport adapters.

pub mod tcp;

pub use tcp::{Hello, TcpChannel};

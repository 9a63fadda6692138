//! Address book records and errors.

use serde::Serialize;
use thiserror::Error;

/// What is known about one reachable host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NodeRecord {
    /// Port the host last answered on.
    pub port: u16,
    /// Unix seconds of the last successful contact.
    pub last_beat: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Address store unavailable: {0}")]
    Unavailable(String),
}

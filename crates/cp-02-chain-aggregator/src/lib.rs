//! # Chain State Aggregator (cp-02)
//!
//! Serializes "I observed this" reports from every peer reader into one
//! authoritative best-known chain state and best height.
//!
//! ## Architecture Role
//!
//! ```text
//! [PeerReader] ×N ──AggregatorHandle──→ [ChainStateAggregator] ──watch──→ snapshot
//!                                               │
//!                                               ├─ pull tick → best peer refresh handshake
//!                                               └─ report tick → log + address heartbeat
//! ```
//!
//! ## Merge Rules
//!
//! - height replaces the best height only if strictly greater
//! - chain state replaces the best state only if its total difficulty is
//!   strictly greater and its genesis matches the configured one
//! - a header batch replaces the retained header only with a higher number
//!
//! The aggregate state is owned by the run loop alone and needs no lock.

pub mod domain;
pub mod service;

pub use domain::*;
pub use service::{AggregatorHandle, ChainStateAggregator};

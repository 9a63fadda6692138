//! # Shared Types Crate
//!
//! Domain entities and cross-subsystem payloads shared by the Chain-Prober
//! crates.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: chain entities (`BlockHeader`, `Block`,
//!   `Transaction`) and the peer identity are defined once, here.
//! - **Observations are values**: the peer registry never touches the
//!   aggregator's state; it reports `HeightObservation`,
//!   `ChainStateObservation` and `HeaderBatch` values instead.

pub mod entities;
pub mod errors;
pub mod observations;

pub use entities::*;
pub use errors::*;
pub use observations::*;

//! # Chain-Prober Runtime
//!
//! Wires the subsystems into a running prober:
//!
//! - `config` - TOML file plus `CP_*` environment overrides
//! - `telemetry` - tracing subscriber
//! - `adapters` - TCP development transport
//! - `node` - session to registered peer, listener
//! - `dialer` - periodic outbound dials
//!
//! ## Startup Sequence
//!
//! 1. Load configuration, install tracing, log the load notices
//! 2. Create the peer set, address book and chain aggregator
//! 3. Spawn the aggregator loop, the listener and the dialer
//! 4. Wait for Ctrl-C, signal shutdown, close the peer set

pub mod adapters;
pub mod config;
pub mod dialer;
pub mod node;
pub mod telemetry;

pub use config::{load_config, ConfigError, LoadedConfig, ProberConfig};
pub use dialer::Dialer;
pub use node::{AttachError, NodeParams, ProberNode};

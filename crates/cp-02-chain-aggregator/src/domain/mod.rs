//! Pure aggregate state and configuration. No I/O, no tasks.

mod config;
mod state;

pub use config::*;
pub use state::*;

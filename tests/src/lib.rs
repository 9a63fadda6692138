//! # Chain-Prober Test Suite
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── benches/          # criterion benchmarks (caches, peer set)
//! └── src/integration/  # registry + aggregator + address book + runtime
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p cp-tests
//! cargo bench -p cp-tests
//! ```

pub mod integration;

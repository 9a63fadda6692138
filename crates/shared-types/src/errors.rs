//! # Error Types
//!
//! Parsing errors for the textual forms of shared entities.

use thiserror::Error;

/// Errors raised when parsing hex-encoded hashes and identities.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Input is not valid hexadecimal.
    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    /// Decoded byte length does not match the fixed-size target.
    #[error("Invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Decimal number could not be parsed.
    #[error("Invalid number: {0}")]
    InvalidNumber(String),
}

//! # Error Types
//!
//! Errors raised when constructing shared identifiers.

use thiserror::Error;

/// A hash of the wrong width was supplied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid hash length: expected {expected} bytes, got {actual}")]
pub struct InvalidHashLength {
    pub expected: usize,
    pub actual: usize,
}

/// A hex string could not be turned into a hash.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HashParseError {
    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    #[error(transparent)]
    Length(#[from] InvalidHashLength),
}

/// A `host:port` string could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressParseError {
    #[error("Missing port in address: {0}")]
    MissingPort(String),

    #[error("Invalid port: {0}")]
    InvalidPort(String),

    #[error("Malformed address: {0}")]
    Malformed(String),
}

//! Decode errors.

use thiserror::Error;

/// Errors produced while decoding a frame.
///
/// Any of these is fatal for the session that produced the bytes: the stream
/// cannot be resynchronised once framing is lost.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Bad network magic: expected {expected:02x?}, got {actual:02x?}")]
    BadMagic { expected: [u8; 4], actual: [u8; 4] },

    #[error("Invalid command field: {0:02x?}")]
    InvalidCommand([u8; 12]),

    #[error("Payload too large: {size} bytes (max: {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Checksum mismatch for '{command}'")]
    ChecksumMismatch { command: String },

    #[error("Too many inventory entries: {count} (max: {max})")]
    TooManyInventory { count: u64, max: usize },

    #[error("Malformed '{command}' payload: {reason}")]
    MalformedPayload { command: String, reason: String },
}

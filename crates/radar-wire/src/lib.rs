//! # Radar Wire Codec
//!
//! Encodes and decodes the Bitcoin P2P (v1) messages the propagation radar
//! needs. Everything else on the wire is surfaced as [`Message::Other`] and
//! ignored by the core.
//!
//! ## Frame Layout
//!
//! ```text
//! [magic:     4 bytes]  network identifier
//! [command:  12 bytes]  ASCII, NUL padded
//! [length:    4 bytes]  payload length, little-endian
//! [checksum:  4 bytes]  first 4 bytes of sha256d(payload)
//! [payload:   length bytes]
//! ```
//!
//! ## Message Categories
//!
//! The core only distinguishes three categories (see [`MessageCategory`]):
//! handshake (`version`/`verack`), inventory (`inv`) and everything else.

mod codec;
mod error;
mod message;
mod network;
mod reader;

pub use codec::{BitcoinCodec, MessageCodec, HEADER_LEN, MAX_PAYLOAD_LEN};
pub use error::DecodeError;
pub use message::{
    InvType, Inventory, Message, MessageCategory, NetAddress, VersionMessage, MAX_INV_ENTRIES,
    MAX_USER_AGENT_LEN,
};
pub use network::{Network, ServiceFlags};

//! # Core Entities
//!
//! - **Transactions**: [`TxHash`], [`sha256d`]
//! - **Networking**: [`ConnectionId`], [`PeerAddress`]

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::errors::{AddressParseError, HashParseError, InvalidHashLength};

/// Width of a transaction hash in bytes.
pub const HASH_LEN: usize = 32;

/// A 32-byte hash.
pub type Hash = [u8; HASH_LEN];

/// Double SHA-256, the hash used for transaction ids and frame checksums.
pub fn sha256d(data: &[u8]) -> Hash {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    let mut out = [0u8; HASH_LEN];
    out.copy_from_slice(&second);
    out
}

// =============================================================================
// TRANSACTION HASH
// =============================================================================

/// Identifier of a transaction as it appears on the wire.
///
/// Bytes are kept in wire (internal) order. [`fmt::Display`] renders the
/// conventional reversed hex used by block explorers and RPC interfaces.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct TxHash(Hash);

impl TxHash {
    /// Wrap raw wire-order bytes.
    pub const fn new(bytes: Hash) -> Self {
        Self(bytes)
    }

    /// Build a hash from a caller-supplied slice, rejecting wrong widths.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, InvalidHashLength> {
        let arr: Hash = bytes.try_into().map_err(|_| InvalidHashLength {
            expected: HASH_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    /// Txid of a serialized transaction.
    ///
    /// Segwit transactions (BIP144 marker `00 01`) are hashed without their
    /// witness data, matching the id peers announce in `MSG_TX` entries.
    /// Anything else is hashed as-is.
    pub fn of_payload(payload: &[u8]) -> Self {
        match strip_witness(payload) {
            Some(stripped) => Self(sha256d(&stripped)),
            None => Self(sha256d(payload)),
        }
    }

    /// Wire-order bytes.
    pub fn as_bytes(&self) -> &Hash {
        &self.0
    }

    /// Wire-order bytes, by value.
    pub fn to_bytes(self) -> Hash {
        self.0
    }

    /// Reversed (display order) hex string.
    pub fn to_hex(&self) -> String {
        let mut reversed = self.0;
        reversed.reverse();
        hex::encode(reversed)
    }

    /// Parse a display-order hex string back into wire order.
    pub fn from_hex(s: &str) -> Result<Self, HashParseError> {
        let mut bytes =
            hex::decode(s.trim()).map_err(|e| HashParseError::InvalidHex(e.to_string()))?;
        bytes.reverse();
        Ok(Self::from_slice(&bytes)?)
    }
}

impl From<Hash> for TxHash {
    fn from(bytes: Hash) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({})", self.to_hex())
    }
}

/// Non-witness serialization of a segwit transaction.
///
/// `None` when the marker is absent or the witness layout does not parse.
fn strip_witness(payload: &[u8]) -> Option<Vec<u8>> {
    if payload.len() < 10 || payload[4] != 0x00 || payload[5] != 0x01 {
        return None;
    }
    let mut cursor = Cursor { buf: payload, pos: 6 };

    let inputs = cursor.compact_size()?;
    for _ in 0..inputs {
        cursor.skip(36)?; // outpoint
        let script = cursor.compact_size()?;
        cursor.skip(script)?;
        cursor.skip(4)?; // sequence
    }
    let outputs = cursor.compact_size()?;
    for _ in 0..outputs {
        cursor.skip(8)?; // value
        let script = cursor.compact_size()?;
        cursor.skip(script)?;
    }
    let body_end = cursor.pos;

    for _ in 0..inputs {
        let items = cursor.compact_size()?;
        for _ in 0..items {
            let len = cursor.compact_size()?;
            cursor.skip(len)?;
        }
    }
    let witness_end = cursor.pos;
    if payload.len() - witness_end != 4 {
        return None;
    }

    let mut stripped = Vec::with_capacity(payload.len() - (witness_end - body_end) - 2);
    stripped.extend_from_slice(&payload[..4]);
    stripped.extend_from_slice(&payload[6..body_end]);
    stripped.extend_from_slice(&payload[witness_end..]);
    Some(stripped)
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl Cursor<'_> {
    fn skip(&mut self, n: usize) -> Option<()> {
        let end = self.pos.checked_add(n)?;
        if end > self.buf.len() {
            return None;
        }
        self.pos = end;
        Some(())
    }

    fn take(&mut self, n: usize) -> Option<&[u8]> {
        let start = self.pos;
        self.skip(n)?;
        Some(&self.buf[start..self.pos])
    }

    fn compact_size(&mut self) -> Option<usize> {
        let prefix = self.take(1)?[0];
        let value = match prefix {
            0xfd => u64::from(u16::from_le_bytes(self.take(2)?.try_into().ok()?)),
            0xfe => u64::from(u32::from_le_bytes(self.take(4)?.try_into().ok()?)),
            0xff => u64::from_le_bytes(self.take(8)?.try_into().ok()?),
            n => u64::from(n),
        };
        usize::try_from(value).ok()
    }
}

// =============================================================================
// CONNECTION ID
// =============================================================================

/// Small integer identifying one peer session for the lifetime of a
/// monitoring session. Never reused within a Start/Stop cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(pub u32);

impl ConnectionId {
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// =============================================================================
// PEER ADDRESS
// =============================================================================

/// A candidate `host:port` pair. The host may be a DNS name or an IP literal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PeerAddress {
    pub host: String,
    pub port: u16,
}

impl PeerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Address in the form accepted by `tokio::net::TcpStream::connect`.
    pub fn to_connect_string(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl From<std::net::SocketAddr> for PeerAddress {
    fn from(addr: std::net::SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_connect_string())
    }
}

impl FromStr for PeerAddress {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (host, port) = if let Some(rest) = s.strip_prefix('[') {
            // [v6]:port
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| AddressParseError::Malformed(s.to_string()))?;
            let port = tail
                .strip_prefix(':')
                .ok_or_else(|| AddressParseError::MissingPort(s.to_string()))?;
            (host, port)
        } else {
            s.rsplit_once(':')
                .ok_or_else(|| AddressParseError::MissingPort(s.to_string()))?
        };

        if host.is_empty() {
            return Err(AddressParseError::Malformed(s.to_string()));
        }
        let port: u16 = port
            .parse()
            .map_err(|_| AddressParseError::InvalidPort(port.to_string()))?;

        Ok(Self::new(host, port))
    }
}

impl TryFrom<String> for PeerAddress {
    type Error = AddressParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PeerAddress> for String {
    fn from(addr: PeerAddress) -> Self {
        addr.to_connect_string()
    }
}

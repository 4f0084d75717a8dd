//! Typed messages and their payload encodings.

use shared_types::{Hash, TxHash};
use std::net::{IpAddr, Ipv6Addr, SocketAddr};

use crate::error::DecodeError;
use crate::network::ServiceFlags;
use crate::reader::{write_varint, ReadError, Reader};

/// Maximum entries accepted in one `inv`/`getdata` message.
pub const MAX_INV_ENTRIES: usize = 50_000;

/// Maximum length of the `version` user agent.
pub const MAX_USER_AGENT_LEN: usize = 256;

/// The three categories the radar core distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageCategory {
    /// `version` / `verack`
    Handshake,
    /// `inv` announcements
    Inventory,
    /// Everything else (keep-alive, data requests, unknown commands)
    Other,
}

// =============================================================================
// INVENTORY
// =============================================================================

/// Inventory vector type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvType {
    Error,
    Tx,
    Block,
    FilteredBlock,
    CompactBlock,
    WitnessTx,
    WitnessBlock,
    Unknown(u32),
}

impl InvType {
    const WITNESS_FLAG: u32 = 1 << 30;

    pub fn from_u32(raw: u32) -> Self {
        match raw {
            0 => InvType::Error,
            1 => InvType::Tx,
            2 => InvType::Block,
            3 => InvType::FilteredBlock,
            4 => InvType::CompactBlock,
            r if r == Self::WITNESS_FLAG | 1 => InvType::WitnessTx,
            r if r == Self::WITNESS_FLAG | 2 => InvType::WitnessBlock,
            other => InvType::Unknown(other),
        }
    }

    pub fn to_u32(self) -> u32 {
        match self {
            InvType::Error => 0,
            InvType::Tx => 1,
            InvType::Block => 2,
            InvType::FilteredBlock => 3,
            InvType::CompactBlock => 4,
            InvType::WitnessTx => Self::WITNESS_FLAG | 1,
            InvType::WitnessBlock => Self::WITNESS_FLAG | 2,
            InvType::Unknown(raw) => raw,
        }
    }

    pub fn is_transaction(self) -> bool {
        matches!(self, InvType::Tx | InvType::WitnessTx)
    }

    pub fn is_block(self) -> bool {
        matches!(
            self,
            InvType::Block | InvType::FilteredBlock | InvType::CompactBlock | InvType::WitnessBlock
        )
    }
}

/// One inventory vector: an object type plus its hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Inventory {
    pub kind: InvType,
    pub hash: Hash,
}

impl Inventory {
    pub fn transaction(hash: TxHash) -> Self {
        Self {
            kind: InvType::Tx,
            hash: hash.to_bytes(),
        }
    }

    /// The transaction hash, if this vector announces a transaction.
    pub fn tx_hash(&self) -> Option<TxHash> {
        self.kind.is_transaction().then(|| TxHash::new(self.hash))
    }
}

// =============================================================================
// VERSION
// =============================================================================

/// Network address as embedded in `version` (no timestamp field).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetAddress {
    pub services: ServiceFlags,
    /// IPv6 or IPv4-mapped IPv6 address.
    pub ip: [u8; 16],
    pub port: u16,
}

impl NetAddress {
    pub fn unspecified() -> Self {
        Self {
            services: ServiceFlags::NONE,
            ip: [0u8; 16],
            port: 0,
        }
    }

    pub fn from_socket_addr(addr: SocketAddr, services: ServiceFlags) -> Self {
        let v6 = match addr.ip() {
            IpAddr::V4(v4) => v4.to_ipv6_mapped(),
            IpAddr::V6(v6) => v6,
        };
        Self {
            services,
            ip: v6.octets(),
            port: addr.port(),
        }
    }

    pub fn to_socket_addr(&self) -> SocketAddr {
        let v6 = Ipv6Addr::from(self.ip);
        let ip = match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(v6),
        };
        SocketAddr::new(ip, self.port)
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.services.0.to_le_bytes());
        out.extend_from_slice(&self.ip);
        // Port is big-endian on the wire.
        out.extend_from_slice(&self.port.to_be_bytes());
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self, ReadError> {
        Ok(Self {
            services: ServiceFlags(reader.u64_le()?),
            ip: reader.array()?,
            port: reader.u16_be()?,
        })
    }
}

/// The `version` handshake message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionMessage {
    pub version: i32,
    pub services: ServiceFlags,
    pub timestamp: i64,
    pub receiver: NetAddress,
    pub sender: NetAddress,
    pub nonce: u64,
    pub user_agent: String,
    pub start_height: i32,
    /// Whether the peer wants transaction announcements (BIP37).
    pub relay: bool,
}

impl VersionMessage {
    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&self.services.0.to_le_bytes());
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        self.receiver.write(out);
        self.sender.write(out);
        out.extend_from_slice(&self.nonce.to_le_bytes());
        let agent = self.user_agent.as_bytes();
        let agent = &agent[..agent.len().min(MAX_USER_AGENT_LEN)];
        write_varint(out, agent.len() as u64);
        out.extend_from_slice(agent);
        out.extend_from_slice(&self.start_height.to_le_bytes());
        out.push(u8::from(self.relay));
    }

    fn read(reader: &mut Reader<'_>) -> Result<Self, ReadError> {
        let version = reader.i32_le()?;
        let services = ServiceFlags(reader.u64_le()?);
        let timestamp = reader.i64_le()?;
        let receiver = NetAddress::read(reader)?;

        // Very old peers stop after addr_recv; treat the rest as absent.
        if reader.is_empty() {
            return Ok(Self {
                version,
                services,
                timestamp,
                receiver,
                sender: NetAddress::unspecified(),
                nonce: 0,
                user_agent: String::new(),
                start_height: 0,
                relay: true,
            });
        }

        let sender = NetAddress::read(reader)?;
        let nonce = reader.u64_le()?;
        let user_agent = reader.var_str(MAX_USER_AGENT_LEN)?;
        let start_height = reader.i32_le()?;
        // Relay flag is optional; absent means "relay".
        let relay = if reader.is_empty() {
            true
        } else {
            reader.u8()? != 0
        };

        Ok(Self {
            version,
            services,
            timestamp,
            receiver,
            sender,
            nonce,
            user_agent,
            start_height,
            relay,
        })
    }
}

// =============================================================================
// MESSAGE
// =============================================================================

/// A decoded protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Version(VersionMessage),
    Verack,
    Ping(u64),
    Pong(u64),
    Inv(Vec<Inventory>),
    GetData(Vec<Inventory>),
    /// Serialized transaction, opaque to the radar.
    Tx(Vec<u8>),
    SendHeaders,
    WtxidRelay,
    SendAddrV2,
    /// Minimum fee rate (sat/kvB) the peer wants announced (BIP133).
    FeeFilter(u64),
    /// Any command the radar does not interpret.
    Other { command: String, payload: Vec<u8> },
}

impl Message {
    /// The wire command name.
    pub fn command(&self) -> &str {
        match self {
            Message::Version(_) => "version",
            Message::Verack => "verack",
            Message::Ping(_) => "ping",
            Message::Pong(_) => "pong",
            Message::Inv(_) => "inv",
            Message::GetData(_) => "getdata",
            Message::Tx(_) => "tx",
            Message::SendHeaders => "sendheaders",
            Message::WtxidRelay => "wtxidrelay",
            Message::SendAddrV2 => "sendaddrv2",
            Message::FeeFilter(_) => "feefilter",
            Message::Other { command, .. } => command.as_str(),
        }
    }

    pub fn category(&self) -> MessageCategory {
        match self {
            Message::Version(_) | Message::Verack => MessageCategory::Handshake,
            Message::Inv(_) => MessageCategory::Inventory,
            _ => MessageCategory::Other,
        }
    }

    /// Serialize the payload (without the frame header).
    pub fn encode_payload(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            Message::Version(v) => v.write(&mut out),
            Message::Ping(nonce) | Message::Pong(nonce) => {
                out.extend_from_slice(&nonce.to_le_bytes())
            }
            Message::Inv(items) | Message::GetData(items) => write_inventory(&mut out, items),
            Message::Tx(raw) => out.extend_from_slice(raw),
            Message::FeeFilter(rate) => out.extend_from_slice(&rate.to_le_bytes()),
            Message::Other { payload, .. } => out.extend_from_slice(payload),
            Message::Verack | Message::SendHeaders | Message::WtxidRelay | Message::SendAddrV2 => {}
        }
        out
    }

    /// Parse a payload for the given command.
    pub fn decode_payload(command: &str, payload: &[u8]) -> Result<Self, DecodeError> {
        let malformed = |e: ReadError| DecodeError::MalformedPayload {
            command: command.to_string(),
            reason: e.to_string(),
        };
        let mut reader = Reader::new(payload);

        let message = match command {
            "version" => Message::Version(VersionMessage::read(&mut reader).map_err(malformed)?),
            "verack" => Message::Verack,
            "ping" => {
                // Pre-BIP31 pings carry no nonce.
                if reader.is_empty() {
                    Message::Ping(0)
                } else {
                    Message::Ping(reader.u64_le().map_err(malformed)?)
                }
            }
            "pong" => Message::Pong(reader.u64_le().map_err(malformed)?),
            "inv" => Message::Inv(read_inventory(&mut reader, command)?),
            "getdata" => Message::GetData(read_inventory(&mut reader, command)?),
            "tx" => Message::Tx(payload.to_vec()),
            "sendheaders" => Message::SendHeaders,
            "wtxidrelay" => Message::WtxidRelay,
            "sendaddrv2" => Message::SendAddrV2,
            "feefilter" => Message::FeeFilter(reader.u64_le().map_err(malformed)?),
            other => Message::Other {
                command: other.to_string(),
                payload: payload.to_vec(),
            },
        };
        Ok(message)
    }
}

fn write_inventory(out: &mut Vec<u8>, items: &[Inventory]) {
    write_varint(out, items.len() as u64);
    for item in items {
        out.extend_from_slice(&item.kind.to_u32().to_le_bytes());
        out.extend_from_slice(&item.hash);
    }
}

fn read_inventory(reader: &mut Reader<'_>, command: &str) -> Result<Vec<Inventory>, DecodeError> {
    let malformed = |e: ReadError| DecodeError::MalformedPayload {
        command: command.to_string(),
        reason: e.to_string(),
    };

    let count = reader.varint().map_err(malformed)?;
    if count > MAX_INV_ENTRIES as u64 {
        return Err(DecodeError::TooManyInventory {
            count,
            max: MAX_INV_ENTRIES,
        });
    }
    // 36 bytes per entry; reject before allocating.
    if (count as usize) * 36 > reader.remaining() {
        return Err(malformed(ReadError::Truncated {
            wanted: count as usize * 36,
            remaining: reader.remaining(),
        }));
    }

    let mut items = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let kind = InvType::from_u32(reader.u32_le().map_err(malformed)?);
        let hash = reader.array().map_err(malformed)?;
        items.push(Inventory { kind, hash });
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_version() -> VersionMessage {
        VersionMessage {
            version: 70016,
            services: ServiceFlags::NETWORK | ServiceFlags::WITNESS,
            timestamp: 1_700_000_000,
            receiver: NetAddress::from_socket_addr(
                "127.0.0.1:18444".parse().unwrap(),
                ServiceFlags::NETWORK,
            ),
            sender: NetAddress::unspecified(),
            nonce: 0xDEAD_BEEF,
            user_agent: "/tx-radar:0.1.0/".to_string(),
            start_height: 800_000,
            relay: true,
        }
    }

    #[test]
    fn test_version_payload_layout() {
        let payload = Message::Version(sample_version()).encode_payload();
        // 4+8+8+26+26+8 + (1+16) + 4 + 1
        assert_eq!(payload.len(), 80 + 17 + 5);
        assert_eq!(&payload[..4], &70016i32.to_le_bytes());

        let decoded = Message::decode_payload("version", &payload).unwrap();
        assert_eq!(decoded, Message::Version(sample_version()));
    }

    #[test]
    fn test_version_without_relay_flag_defaults_to_relay() {
        let mut payload = Message::Version(VersionMessage {
            relay: false,
            ..sample_version()
        })
        .encode_payload();
        payload.pop();

        match Message::decode_payload("version", &payload).unwrap() {
            Message::Version(v) => assert!(v.relay),
            other => panic!("expected version, got {:?}", other),
        }
    }

    #[test]
    fn test_truncated_version_is_malformed() {
        let payload = Message::Version(sample_version()).encode_payload();
        let result = Message::decode_payload("version", &payload[..30]);
        assert!(matches!(
            result,
            Err(DecodeError::MalformedPayload { ref command, .. }) if command == "version"
        ));
    }

    #[test]
    fn test_inventory_tx_hash_only_for_transactions() {
        let tx = Inventory {
            kind: InvType::WitnessTx,
            hash: [1u8; 32],
        };
        let block = Inventory {
            kind: InvType::Block,
            hash: [2u8; 32],
        };
        assert_eq!(tx.tx_hash(), Some(TxHash::new([1u8; 32])));
        assert_eq!(block.tx_hash(), None);
        assert!(InvType::from_u32(0x4000_0001).is_transaction());
        assert_eq!(InvType::from_u32(99), InvType::Unknown(99));
    }

    #[test]
    fn test_inventory_count_limit() {
        let mut payload = Vec::new();
        write_varint(&mut payload, MAX_INV_ENTRIES as u64 + 1);
        let result = Message::decode_payload("inv", &payload);
        assert!(matches!(result, Err(DecodeError::TooManyInventory { .. })));
    }

    #[test]
    fn test_inventory_count_exceeding_payload_is_rejected() {
        let mut payload = Vec::new();
        write_varint(&mut payload, 3);
        payload.extend_from_slice(&[0u8; 36]);
        let result = Message::decode_payload("inv", &payload);
        assert!(matches!(result, Err(DecodeError::MalformedPayload { .. })));
    }

    #[test]
    fn test_unknown_command_is_other() {
        let msg = Message::decode_payload("addrv2", &[1, 2, 3]).unwrap();
        assert_eq!(msg.category(), MessageCategory::Other);
        assert_eq!(msg.command(), "addrv2");
    }

    #[test]
    fn test_categories() {
        assert_eq!(Message::Verack.category(), MessageCategory::Handshake);
        assert_eq!(Message::Inv(vec![]).category(), MessageCategory::Inventory);
        assert_eq!(Message::Ping(1).category(), MessageCategory::Other);
    }

    #[test]
    fn test_net_address_ipv4_mapping() {
        let addr: SocketAddr = "10.1.2.3:8333".parse().unwrap();
        let net = NetAddress::from_socket_addr(addr, ServiceFlags::NETWORK);
        assert_eq!(&net.ip[10..12], &[0xFF, 0xFF]);
        assert_eq!(net.to_socket_addr(), addr);
    }
}

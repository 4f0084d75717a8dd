//! Frame codec.

use shared_types::sha256d;

use crate::error::DecodeError;
use crate::message::Message;
use crate::network::Network;

/// Size of the fixed frame header.
pub const HEADER_LEN: usize = 24;

/// Largest payload a peer may send (matches the reference node limit).
pub const MAX_PAYLOAD_LEN: usize = 4_000_000;

const COMMAND_LEN: usize = 12;

/// Converts between typed messages and framed bytes.
///
/// Sessions hold the codec behind this trait so tests can drive them with
/// a codec of their choosing.
pub trait MessageCodec: Send + Sync + 'static {
    /// Produce a complete frame for `message`.
    fn encode(&self, message: &Message) -> Vec<u8>;

    /// Try to decode one frame from the front of `buf`.
    ///
    /// Returns `Ok(None)` when more bytes are needed, or the message plus the
    /// number of bytes it consumed.
    fn decode(&self, buf: &[u8]) -> Result<Option<(Message, usize)>, DecodeError>;
}

/// Bitcoin P2P v1 framing for one network.
#[derive(Debug, Clone)]
pub struct BitcoinCodec {
    network: Network,
    max_payload: usize,
}

impl BitcoinCodec {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            max_payload: MAX_PAYLOAD_LEN,
        }
    }

    /// Override the payload ceiling.
    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }

    pub fn network(&self) -> Network {
        self.network
    }
}

impl MessageCodec for BitcoinCodec {
    fn encode(&self, message: &Message) -> Vec<u8> {
        let payload = message.encode_payload();
        let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());

        frame.extend_from_slice(&self.network.magic());

        let mut command = [0u8; COMMAND_LEN];
        let name = message.command().as_bytes();
        let len = name.len().min(COMMAND_LEN);
        command[..len].copy_from_slice(&name[..len]);
        frame.extend_from_slice(&command);

        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(&sha256d(&payload)[..4]);
        frame.extend_from_slice(&payload);
        frame
    }

    fn decode(&self, buf: &[u8]) -> Result<Option<(Message, usize)>, DecodeError> {
        if buf.len() < HEADER_LEN {
            return Ok(None);
        }

        let mut magic = [0u8; 4];
        magic.copy_from_slice(&buf[0..4]);
        let expected = self.network.magic();
        if magic != expected {
            return Err(DecodeError::BadMagic {
                expected,
                actual: magic,
            });
        }

        let mut raw_command = [0u8; COMMAND_LEN];
        raw_command.copy_from_slice(&buf[4..16]);
        let command = parse_command(&raw_command)?;

        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&buf[16..20]);
        let length = u32::from_le_bytes(len_bytes) as usize;
        if length > self.max_payload {
            return Err(DecodeError::PayloadTooLarge {
                size: length,
                max: self.max_payload,
            });
        }

        let total = HEADER_LEN + length;
        if buf.len() < total {
            return Ok(None);
        }

        let payload = &buf[HEADER_LEN..total];
        if sha256d(payload)[..4] != buf[20..24] {
            return Err(DecodeError::ChecksumMismatch { command });
        }

        let message = Message::decode_payload(&command, payload)?;
        Ok(Some((message, total)))
    }
}

/// ASCII command name, NUL padded on the right. Nothing may follow the
/// first NUL.
fn parse_command(raw: &[u8; COMMAND_LEN]) -> Result<String, DecodeError> {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(COMMAND_LEN);
    let (name, padding) = raw.split_at(end);

    let valid = !name.is_empty()
        && name.iter().all(|b| b.is_ascii_graphic())
        && padding.iter().all(|&b| b == 0);
    if !valid {
        return Err(DecodeError::InvalidCommand(*raw));
    }

    Ok(name.iter().map(|&b| b as char).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{InvType, Inventory};

    fn codec() -> BitcoinCodec {
        BitcoinCodec::new(Network::Regtest)
    }

    #[test]
    fn test_verack_frame_bytes() {
        let frame = codec().encode(&Message::Verack);
        assert_eq!(frame.len(), HEADER_LEN);
        assert_eq!(&frame[0..4], &[0xFA, 0xBF, 0xB5, 0xDA]);
        assert_eq!(&frame[4..10], b"verack");
        assert!(frame[10..16].iter().all(|&b| b == 0));
        assert_eq!(&frame[16..20], &[0, 0, 0, 0]);
        // First 4 bytes of sha256d("")
        assert_eq!(&frame[20..24], &[0x5d, 0xf6, 0xe0, 0xe2]);
    }

    #[test]
    fn test_partial_frame_needs_more() {
        let frame = codec().encode(&Message::Ping(42));
        assert_eq!(codec().decode(&frame[..10]).unwrap(), None);
        assert_eq!(codec().decode(&frame[..frame.len() - 1]).unwrap(), None);

        let (msg, used) = codec().decode(&frame).unwrap().unwrap();
        assert_eq!(msg, Message::Ping(42));
        assert_eq!(used, frame.len());
    }

    #[test]
    fn test_two_frames_back_to_back() {
        let inv = Message::Inv(vec![Inventory {
            kind: InvType::Tx,
            hash: [9u8; 32],
        }]);
        let mut buf = codec().encode(&inv);
        buf.extend_from_slice(&codec().encode(&Message::Verack));

        let (first, used) = codec().decode(&buf).unwrap().unwrap();
        assert_eq!(first, inv);
        let (second, rest) = codec().decode(&buf[used..]).unwrap().unwrap();
        assert_eq!(second, Message::Verack);
        assert_eq!(used + rest, buf.len());
    }

    #[test]
    fn test_wrong_network_magic() {
        let frame = BitcoinCodec::new(Network::Mainnet).encode(&Message::Verack);
        assert!(matches!(
            codec().decode(&frame),
            Err(DecodeError::BadMagic { .. })
        ));
    }

    #[test]
    fn test_checksum_mismatch() {
        let mut frame = codec().encode(&Message::Ping(7));
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;
        assert_eq!(
            codec().decode(&frame),
            Err(DecodeError::ChecksumMismatch {
                command: "ping".to_string()
            })
        );
    }

    #[test]
    fn test_oversized_payload_rejected_from_header() {
        let mut frame = codec().encode(&Message::Verack);
        frame[16..20].copy_from_slice(&(MAX_PAYLOAD_LEN as u32 + 1).to_le_bytes());
        assert!(matches!(
            codec().decode(&frame),
            Err(DecodeError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn test_command_with_garbage_after_nul() {
        let mut frame = codec().encode(&Message::Verack);
        frame[15] = b'x';
        assert!(matches!(
            codec().decode(&frame),
            Err(DecodeError::InvalidCommand(_))
        ));
    }

    #[test]
    fn test_unknown_command_passes_through() {
        let msg = Message::Other {
            command: "addrv2".to_string(),
            payload: vec![0x00],
        };
        let frame = codec().encode(&msg);
        let (decoded, _) = codec().decode(&frame).unwrap().unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_tx_payload_is_opaque() {
        let raw = vec![0x02, 0x00, 0x00, 0x00, 0x01];
        let frame = codec().encode(&Message::Tx(raw.clone()));
        let (decoded, _) = codec().decode(&frame).unwrap().unwrap();
        assert_eq!(decoded, Message::Tx(raw));
    }
}

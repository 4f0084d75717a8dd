//! Version handshake.
//!
//! We send `version` first. On the peer's `version` we validate it and reply
//! `verack`; the session is Ready once we have both the peer's `version` and
//! its `verack`. Other messages arriving in between (`sendheaders`,
//! `wtxidrelay`, ...) are ignored.

use radar_wire::{Message, NetAddress, ServiceFlags, VersionMessage};
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use super::{SessionContext, READ_CHUNK};
use crate::config::HandshakeConfig;
use crate::errors::HandshakeError;

/// Build our `version` message.
pub fn build_version(
    config: &HandshakeConfig,
    remote: Option<SocketAddr>,
    nonce: u64,
) -> VersionMessage {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default();

    VersionMessage {
        version: config.protocol_version,
        services: config.local_services,
        timestamp,
        receiver: remote
            .map(|addr| NetAddress::from_socket_addr(addr, ServiceFlags::NONE))
            .unwrap_or_else(NetAddress::unspecified),
        sender: NetAddress::unspecified(),
        nonce,
        user_agent: config.user_agent.clone(),
        start_height: config.start_height,
        relay: config.relay,
    }
}

/// Check a peer's `version` against our requirements.
pub fn verify_version(
    remote: &VersionMessage,
    config: &HandshakeConfig,
    local_nonce: u64,
) -> Result<(), HandshakeError> {
    if remote.nonce != 0 && remote.nonce == local_nonce {
        return Err(HandshakeError::SelfConnection(remote.nonce));
    }
    if remote.version < config.min_peer_version {
        return Err(HandshakeError::VersionTooOld {
            version: remote.version,
            min: config.min_peer_version,
        });
    }
    if !remote.services.contains(config.required_services) {
        return Err(HandshakeError::MissingServices {
            advertised: remote.services.0,
            required: config.required_services.0,
        });
    }
    Ok(())
}

/// Non-handshake messages kept for replay once the session is Ready.
const MAX_EARLY_MESSAGES: usize = 32;

/// A finished handshake.
pub(super) struct Completed {
    pub version: VersionMessage,
    /// Messages the peer sent before its `verack`, in wire order.
    pub early: Vec<Message>,
}

/// Run the handshake over `stream`.
///
/// Bytes read past the final handshake frame stay in `buf` for the main loop.
pub(super) async fn perform(
    stream: &mut TcpStream,
    buf: &mut Vec<u8>,
    ctx: &SessionContext,
) -> Result<Completed, HandshakeError> {
    let config = &ctx.config.handshake;
    let ours = build_version(config, stream.peer_addr().ok(), ctx.local_nonce);
    send(stream, ctx, &Message::Version(ours)).await?;

    let mut remote: Option<VersionMessage> = None;
    let mut got_verack = false;
    let mut early = Vec::new();
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        while let Some((message, used)) = ctx
            .codec
            .decode(buf)
            .map_err(|e| HandshakeError::Malformed(e.to_string()))?
        {
            buf.drain(..used);
            match message {
                Message::Version(version) => {
                    if remote.is_some() {
                        return Err(HandshakeError::Malformed("duplicate version".to_string()));
                    }
                    verify_version(&version, config, ctx.local_nonce)?;
                    send(stream, ctx, &Message::Verack).await?;
                    remote = Some(version);
                }
                Message::Verack => got_verack = true,
                other if early.len() < MAX_EARLY_MESSAGES => early.push(other),
                other => debug!(command = other.command(), "Dropping message sent during handshake"),
            }

            if got_verack {
                if let Some(version) = remote.take() {
                    return Ok(Completed { version, early });
                }
            }
        }

        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|e| HandshakeError::Io(e.to_string()))?;
        if n == 0 {
            return Err(HandshakeError::ConnectionClosed);
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

async fn send(
    stream: &mut TcpStream,
    ctx: &SessionContext,
    message: &Message,
) -> Result<(), HandshakeError> {
    let frame = ctx.codec.encode(message);
    stream
        .write_all(&frame)
        .await
        .map_err(|e| HandshakeError::Io(e.to_string()))
}

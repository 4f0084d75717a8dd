//! # Driven Ports (Outbound SPI)
//!
//! What the sentinel requires from its environment:
//!
//! - [`CandidateSource`]: peer discovery (`radar-discovery`)
//! - [`MessageCodec`]: wire encode/decode (`radar-wire`)
//! - [`SessionObserver`]: receiver of session lifecycle and message events

pub use radar_discovery::CandidateSource;
pub use radar_wire::MessageCodec;

use radar_wire::Message;
use shared_types::{ConnectionId, PeerAddress};

use crate::session::{CloseReason, SessionHandle};

/// Receives events from peer sessions.
///
/// Called from the session's own task, so implementations must not block.
/// Events from one session arrive in wire order; events from different
/// sessions are unordered.
pub trait SessionObserver: Send + Sync {
    /// Handshake completed; `handle` can now send.
    fn on_ready(&self, id: ConnectionId, peer: &PeerAddress, handle: SessionHandle);

    /// A decoded application message arrived on a Ready session.
    fn on_message(&self, id: ConnectionId, message: &Message);

    /// The session ended. Fired exactly once per session, including when
    /// it never reached Ready.
    fn on_closed(&self, id: ConnectionId, reason: CloseReason);
}

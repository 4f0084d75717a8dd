//! Peer session state machine.
//!
//! ```text
//! Connecting ──→ Handshaking ──→ Ready ⟲
//!     │               │            │
//!     └───────────────┴────────────┴──→ Closing ──→ Closed
//!
//! any non-terminal state ──→ Failed
//! ```

use shared_types::{ConnectionId, PeerAddress};
use std::fmt;
use std::time::Instant;
use thiserror::Error;

/// Lifecycle state of one peer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerState {
    Connecting,
    Handshaking,
    Ready,
    Closing,
    Closed,
    Failed,
}

impl PeerState {
    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(self, next: PeerState) -> bool {
        use PeerState::*;
        match (self, next) {
            (Closed | Failed, _) => false,
            (_, Failed) => true,
            (Connecting, Handshaking | Closing) => true,
            (Handshaking, Ready | Closing) => true,
            (Ready, Ready | Closing) => true,
            (Closing, Closed) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PeerState::Closed | PeerState::Failed)
    }
}

impl fmt::Display for PeerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PeerState::Connecting => "connecting",
            PeerState::Handshaking => "handshaking",
            PeerState::Ready => "ready",
            PeerState::Closing => "closing",
            PeerState::Closed => "closed",
            PeerState::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Invalid state transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: PeerState,
    pub to: PeerState,
}

/// A remote peer as seen by its owning session.
#[derive(Debug, Clone)]
pub struct Peer {
    pub address: PeerAddress,
    pub connection_id: ConnectionId,
    state: PeerState,
    last_activity: Instant,
    violations: u32,
}

impl Peer {
    pub fn new(address: PeerAddress, connection_id: ConnectionId) -> Self {
        Self {
            address,
            connection_id,
            state: PeerState::Connecting,
            last_activity: Instant::now(),
            violations: 0,
        }
    }

    pub fn state(&self) -> PeerState {
        self.state
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    pub fn violations(&self) -> u32 {
        self.violations
    }

    /// Move to `next`, rejecting illegal transitions.
    pub fn transition(&mut self, next: PeerState) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Note inbound traffic.
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Count a protocol violation; returns the new total.
    pub fn record_violation(&mut self) -> u32 {
        self.violations = self.violations.saturating_add(1);
        self.violations
    }
}

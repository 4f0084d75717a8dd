//! # Domain Layer
//!
//! Pure state with no I/O: the peer state machine, the inventory tracker,
//! slot bookkeeping and notification policy.

mod payloads;
mod peer;
mod policy;
mod slots;
mod tracker;

pub use payloads::PayloadStore;
pub use peer::{InvalidTransition, Peer, PeerState};
pub use policy::{should_notify, NotifyPolicy, SightingFilter};
pub use slots::{SlotDecision, SlotIndex, SlotStats, SlotTable};
pub use tracker::{InventoryTracker, SightingOutcome, SightingRecord};

//! Ports for the sentinel.

pub mod inbound;
pub mod outbound;

pub use inbound::PropagationRadar;
pub use outbound::{CandidateSource, MessageCodec, SessionObserver};

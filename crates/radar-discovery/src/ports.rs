//! # Driven Ports (Outbound SPI)
//!
//! The interface the sentinel engine requires for finding peers.

use async_trait::async_trait;
use shared_types::PeerAddress;

/// Source of connection candidates.
///
/// # Contract
///
/// - Returns at most `n` addresses, possibly fewer (including none) when the
///   source is running dry. The engine then runs with a reduced peer count.
/// - Never hands out the same address twice during one monitoring session.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`: the engine's supervisor task calls
/// the source whenever a slot needs a fresh peer.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// Next `n` candidates in preference order.
    async fn next_candidates(&self, n: usize) -> Vec<PeerAddress>;
}

#[async_trait]
impl<T: CandidateSource + ?Sized> CandidateSource for std::sync::Arc<T> {
    async fn next_candidates(&self, n: usize) -> Vec<PeerAddress> {
        (**self).next_candidates(n).await
    }
}

#[async_trait]
impl<T: CandidateSource + ?Sized> CandidateSource for Box<T> {
    async fn next_candidates(&self, n: usize) -> Vec<PeerAddress> {
        (**self).next_candidates(n).await
    }
}

use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::PeerAddress;
use std::collections::{HashSet, VecDeque};

use crate::ports::CandidateSource;

// ============================================================================
// StaticCandidates - Fixed list, each address handed out once
// ============================================================================

/// Candidate source backed by a fixed list.
///
/// Duplicates are dropped on construction; order is preserved.
#[derive(Debug, Default)]
pub struct StaticCandidates {
    queue: Mutex<VecDeque<PeerAddress>>,
}

impl StaticCandidates {
    #[must_use]
    pub fn new(addresses: impl IntoIterator<Item = PeerAddress>) -> Self {
        let mut seen = HashSet::new();
        let queue = addresses
            .into_iter()
            .filter(|addr| seen.insert(addr.clone()))
            .collect();
        Self {
            queue: Mutex::new(queue),
        }
    }

    /// Addresses not yet handed out.
    pub fn remaining(&self) -> usize {
        self.queue.lock().len()
    }
}

#[async_trait]
impl CandidateSource for StaticCandidates {
    async fn next_candidates(&self, n: usize) -> Vec<PeerAddress> {
        let mut queue = self.queue.lock();
        let take = n.min(queue.len());
        queue.drain(..take).collect()
    }
}

// ============================================================================
// ChainedCandidates - Drain several sources in order
// ============================================================================

/// Asks each inner source in turn until `n` candidates are collected.
///
/// Addresses already returned by an earlier source are skipped.
pub struct ChainedCandidates {
    sources: Vec<Box<dyn CandidateSource>>,
    handed_out: Mutex<HashSet<PeerAddress>>,
}

impl ChainedCandidates {
    #[must_use]
    pub fn new(sources: Vec<Box<dyn CandidateSource>>) -> Self {
        Self {
            sources,
            handed_out: Mutex::new(HashSet::new()),
        }
    }
}

#[async_trait]
impl CandidateSource for ChainedCandidates {
    async fn next_candidates(&self, n: usize) -> Vec<PeerAddress> {
        let mut out = Vec::with_capacity(n);
        for source in &self.sources {
            while out.len() < n {
                let batch = source.next_candidates(n - out.len()).await;
                if batch.is_empty() {
                    break;
                }
                let mut handed_out = self.handed_out.lock();
                out.extend(batch.into_iter().filter(|a| handed_out.insert(a.clone())));
            }
            if out.len() >= n {
                break;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> PeerAddress {
        PeerAddress::new("127.0.0.1", port)
    }

    #[tokio::test]
    async fn test_static_hands_out_each_address_once() {
        let source = StaticCandidates::new(vec![addr(1), addr(2), addr(3)]);

        assert_eq!(source.next_candidates(2).await, vec![addr(1), addr(2)]);
        assert_eq!(source.next_candidates(5).await, vec![addr(3)]);
        assert!(source.next_candidates(1).await.is_empty());
    }

    #[tokio::test]
    async fn test_static_drops_duplicates() {
        let source = StaticCandidates::new(vec![addr(1), addr(1), addr(2)]);
        assert_eq!(source.remaining(), 2);
    }

    #[tokio::test]
    async fn test_chained_falls_through_and_dedupes() {
        let chained = ChainedCandidates::new(vec![
            Box::new(StaticCandidates::new(vec![addr(1)])),
            Box::new(StaticCandidates::new(vec![addr(1), addr(2), addr(3)])),
        ]);

        let first = chained.next_candidates(2).await;
        assert_eq!(first, vec![addr(1), addr(2)]);

        let rest = chained.next_candidates(10).await;
        assert_eq!(rest, vec![addr(3)]);
    }
}

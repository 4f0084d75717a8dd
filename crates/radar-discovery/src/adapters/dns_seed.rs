use async_trait::async_trait;
use rand::seq::SliceRandom;
use shared_types::PeerAddress;
use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::ports::CandidateSource;

/// Default bound on a single seed lookup.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Resolves DNS seed names into candidates on first use.
///
/// Every seed is queried once; the union of answers is shuffled and then
/// handed out like a static list. Seeds that fail to resolve are logged and
/// skipped.
pub struct DnsSeedCandidates {
    seeds: Vec<String>,
    port: u16,
    lookup_timeout: Duration,
    state: Mutex<Option<VecDeque<PeerAddress>>>,
}

impl DnsSeedCandidates {
    #[must_use]
    pub fn new(seeds: Vec<String>, port: u16) -> Self {
        Self {
            seeds,
            port,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
            state: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    async fn resolve_all(&self) -> VecDeque<PeerAddress> {
        let mut seen = HashSet::new();
        let mut found = Vec::new();

        for seed in &self.seeds {
            let lookup = tokio::net::lookup_host((seed.as_str(), self.port));
            match tokio::time::timeout(self.lookup_timeout, lookup).await {
                Ok(Ok(addrs)) => {
                    let before = found.len();
                    found.extend(addrs.filter(|a| seen.insert(*a)).map(PeerAddress::from));
                    debug!(seed = %seed, resolved = found.len() - before, "DNS seed resolved");
                }
                Ok(Err(e)) => warn!(seed = %seed, error = %e, "DNS seed lookup failed"),
                Err(_) => warn!(seed = %seed, "DNS seed lookup timed out"),
            }
        }

        found.shuffle(&mut rand::thread_rng());
        found.into()
    }
}

#[async_trait]
impl CandidateSource for DnsSeedCandidates {
    async fn next_candidates(&self, n: usize) -> Vec<PeerAddress> {
        let mut state = self.state.lock().await;
        if state.is_none() {
            *state = Some(self.resolve_all().await);
        }
        match state.as_mut() {
            Some(queue) => {
                let take = n.min(queue.len());
                queue.drain(..take).collect()
            }
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ip_literal_seed_resolves_once() {
        let source = DnsSeedCandidates::new(vec!["127.0.0.1".to_string()], 18444);

        let first = source.next_candidates(4).await;
        assert_eq!(first, vec![PeerAddress::new("127.0.0.1", 18444)]);
        assert!(source.next_candidates(4).await.is_empty());
    }

    #[tokio::test]
    async fn test_unresolvable_seed_is_skipped() {
        let source = DnsSeedCandidates::new(vec!["seed.invalid".to_string()], 8333)
            .with_lookup_timeout(Duration::from_secs(2));
        assert!(source.next_candidates(1).await.is_empty());
    }
}

//! # Inventory Tracker
//!
//! Maps transaction hash to the set of sessions that announced it.
//!
//! ## Invariants
//!
//! - A connection id appears at most once per record; records only grow.
//! - `is_new_peer_for_hash` is true exactly once per (peer, hash) pair, no
//!   matter how calls interleave.
//! - When the tracked-hash cap is reached, the oldest record that was not
//!   registered via [`InventoryTracker::expect`] is evicted first. Expected
//!   records are never evicted.
//! - Evicted hashes are remembered in a second FIFO of the same capacity. A
//!   remembered hash that is announced again starts a fresh peer count but
//!   is not reported as a first sighting.

use parking_lot::Mutex;
use shared_types::{ConnectionId, TxHash};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::time::SystemTime;

/// Everything known about one hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SightingRecord {
    pub tx_hash: TxHash,
    /// Sessions that announced the hash.
    pub peers: BTreeSet<ConnectionId>,
    /// When the first peer announced it. `None` while only expected.
    pub first_seen: Option<SystemTime>,
    /// Registered by a local broadcast.
    pub expected: bool,
}

impl SightingRecord {
    fn new(tx_hash: TxHash) -> Self {
        Self {
            tx_hash,
            peers: BTreeSet::new(),
            first_seen: None,
            expected: false,
        }
    }

    pub fn distinct_peers(&self) -> usize {
        self.peers.len()
    }
}

/// Result of [`InventoryTracker::record_sighting`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SightingOutcome {
    /// No peer had announced this hash before.
    pub is_first_sighting_of_hash: bool,
    /// This peer had not announced this hash before.
    pub is_new_peer_for_hash: bool,
    /// Distinct peers that have announced the hash, this one included.
    pub total_distinct_peers: usize,
    /// The hash was registered by a local broadcast.
    pub is_expected: bool,
}

#[derive(Debug, Default)]
struct TrackerState {
    records: HashMap<TxHash, SightingRecord>,
    insertion_order: VecDeque<TxHash>,
    evicted: HashSet<TxHash>,
    evicted_order: VecDeque<TxHash>,
}

impl TrackerState {
    fn entry(&mut self, hash: TxHash, max_tracked: usize) -> &mut SightingRecord {
        if !self.records.contains_key(&hash) {
            if self.records.len() >= max_tracked {
                self.evict_oldest_unexpected(max_tracked);
            }
            self.insertion_order.push_back(hash);
        }
        self.records
            .entry(hash)
            .or_insert_with(|| SightingRecord::new(hash))
    }

    fn evict_oldest_unexpected(&mut self, max_tracked: usize) {
        let records = &self.records;
        let victim = self
            .insertion_order
            .iter()
            .position(|h| records.get(h).map_or(true, |r| !r.expected));
        if let Some(pos) = victim {
            if let Some(hash) = self.insertion_order.remove(pos) {
                self.records.remove(&hash);
                self.remember(hash, max_tracked);
            }
        }
    }

    fn remember(&mut self, hash: TxHash, max_tracked: usize) {
        if !self.evicted.insert(hash) {
            return;
        }
        self.evicted_order.push_back(hash);
        if self.evicted_order.len() > max_tracked {
            if let Some(oldest) = self.evicted_order.pop_front() {
                self.evicted.remove(&oldest);
            }
        }
    }
}

/// Concurrency-safe hash → peers registry.
#[derive(Debug)]
pub struct InventoryTracker {
    state: Mutex<TrackerState>,
    max_tracked: usize,
}

impl InventoryTracker {
    pub fn new(max_tracked: usize) -> Self {
        Self {
            state: Mutex::new(TrackerState::default()),
            max_tracked: max_tracked.max(1),
        }
    }

    /// Record that `peer` announced `hash`.
    pub fn record_sighting(&self, peer: ConnectionId, hash: TxHash) -> SightingOutcome {
        let mut state = self.state.lock();
        let seen_before = state.evicted.contains(&hash);
        let record = state.entry(hash, self.max_tracked);

        let is_first_sighting_of_hash = record.peers.is_empty() && !seen_before;
        let is_new_peer_for_hash = record.peers.insert(peer);
        if record.first_seen.is_none() {
            record.first_seen = Some(SystemTime::now());
        }

        SightingOutcome {
            is_first_sighting_of_hash,
            is_new_peer_for_hash,
            total_distinct_peers: record.peers.len(),
            is_expected: record.expected,
        }
    }

    /// Register a hash we broadcast. Existing sightings are kept.
    pub fn expect(&self, hash: TxHash) {
        let mut state = self.state.lock();
        state.entry(hash, self.max_tracked).expected = true;
    }

    /// Distinct peers that announced `hash`.
    pub fn count(&self, hash: &TxHash) -> usize {
        self.state
            .lock()
            .records
            .get(hash)
            .map_or(0, SightingRecord::distinct_peers)
    }

    /// Snapshot of the record for `hash`.
    pub fn sighting(&self, hash: &TxHash) -> Option<SightingRecord> {
        self.state.lock().records.get(hash).cloned()
    }

    pub fn is_expected(&self, hash: &TxHash) -> bool {
        self.state
            .lock()
            .records
            .get(hash)
            .is_some_and(|r| r.expected)
    }

    /// Number of hashes tracked.
    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every record.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.records.clear();
        state.insertion_order.clear();
        state.evicted.clear();
        state.evicted_order.clear();
    }
}

//! # Peer Slots
//!
//! One slot per requested peer. A slot holds at most one live session and a
//! retry budget for replacing it.
//!
//! - The first session in a slot is free.
//! - Each replacement after a failure or unexpected close costs one retry.
//! - A slot whose budget is spent, or for which discovery has no candidate,
//!   is exhausted and permanently lowers the effective peer count.

use shared_types::ConnectionId;
use std::collections::HashMap;

/// Index of a slot in the table.
pub type SlotIndex = usize;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Slot {
    current: Option<ConnectionId>,
    retries_used: u32,
    exhausted: bool,
}

/// What the supervisor should do with a freed slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotDecision {
    /// Spawn a replacement; one retry was consumed.
    Replace(SlotIndex),
    /// Budget spent; the slot is now exhausted.
    Exhausted(SlotIndex),
}

/// Slot statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotStats {
    /// Slots requested at start.
    pub requested: usize,
    /// Slots currently holding a session.
    pub occupied: usize,
    /// Slots that will never be refilled.
    pub exhausted: usize,
}

/// Manages peer slots and their retry budgets.
#[derive(Debug)]
pub struct SlotTable {
    slots: Vec<Slot>,
    by_connection: HashMap<ConnectionId, SlotIndex>,
    max_retries: u32,
}

impl SlotTable {
    pub fn new(count: usize, max_retries: u32) -> Self {
        Self {
            slots: vec![
                Slot {
                    current: None,
                    retries_used: 0,
                    exhausted: false,
                };
                count
            ],
            by_connection: HashMap::new(),
            max_retries,
        }
    }

    /// Put `id` into slot `index`.
    pub fn assign(&mut self, index: SlotIndex, id: ConnectionId) {
        if let Some(slot) = self.slots.get_mut(index) {
            if let Some(old) = slot.current.replace(id) {
                self.by_connection.remove(&old);
            }
            self.by_connection.insert(id, index);
        }
    }

    /// Free the slot that held `id`, returning its index.
    pub fn release(&mut self, id: ConnectionId) -> Option<SlotIndex> {
        let index = self.by_connection.remove(&id)?;
        if let Some(slot) = self.slots.get_mut(index) {
            slot.current = None;
        }
        Some(index)
    }

    /// Decide whether a freed slot gets a replacement.
    pub fn on_session_lost(&mut self, index: SlotIndex) -> SlotDecision {
        match self.slots.get_mut(index) {
            Some(slot) if !slot.exhausted && slot.retries_used < self.max_retries => {
                slot.retries_used += 1;
                SlotDecision::Replace(index)
            }
            Some(slot) => {
                slot.exhausted = true;
                SlotDecision::Exhausted(index)
            }
            None => SlotDecision::Exhausted(index),
        }
    }

    /// Mark a slot as never to be refilled.
    pub fn mark_exhausted(&mut self, index: SlotIndex) {
        if let Some(slot) = self.slots.get_mut(index) {
            slot.exhausted = true;
        }
    }

    pub fn slot_of(&self, id: ConnectionId) -> Option<SlotIndex> {
        self.by_connection.get(&id).copied()
    }

    /// Requested minus exhausted.
    pub fn effective_count(&self) -> usize {
        self.slots.iter().filter(|s| !s.exhausted).count()
    }

    pub fn all_exhausted(&self) -> bool {
        self.slots.iter().all(|s| s.exhausted)
    }

    pub fn stats(&self) -> SlotStats {
        SlotStats {
            requested: self.slots.len(),
            occupied: self.by_connection.len(),
            exhausted: self.slots.iter().filter(|s| s.exhausted).count(),
        }
    }
}

//! Payloads of transactions we broadcast, kept so sessions can answer
//! `getdata` requests for them.

use parking_lot::RwLock;
use shared_types::TxHash;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct PayloadStore {
    payloads: RwLock<HashMap<TxHash, Arc<[u8]>>>,
}

impl PayloadStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, hash: TxHash, payload: &[u8]) {
        self.payloads.write().insert(hash, Arc::from(payload));
    }

    pub fn get(&self, hash: &TxHash) -> Option<Arc<[u8]>> {
        self.payloads.read().get(hash).cloned()
    }

    pub fn len(&self) -> usize {
        self.payloads.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.payloads.write().clear();
    }
}

//! Two-tier in-memory address cache.
//!
//! Correctness depends only on cache *coherence* with the store, not hit
//! rate — the normal tier's eviction policy is deliberately coarse (drop
//! everything once over capacity) because a flush just forces an
//! authoritative re-read, it never produces a wrong answer.

use std::collections::HashMap;

use crate::models::{CarverAddress, Label};

#[derive(Debug)]
pub struct AddressCache {
    /// Special labels plus recently-observed tx-pseudo-addresses. Never
    /// flushed during a sync run.
    common: HashMap<Label, CarverAddress>,
    /// Ordinary address labels. Dropped wholesale once `len() > capacity`.
    normal: HashMap<Label, CarverAddress>,
    capacity: usize,
}

impl AddressCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            common: HashMap::new(),
            normal: HashMap::new(),
            capacity,
        }
    }

    pub fn get(&self, label: &Label) -> Option<&CarverAddress> {
        self.common.get(label).or_else(|| self.normal.get(label))
    }

    /// Overwrite (or insert) the cache entry for `address.label`. Callers
    /// must have already durably written the record to the store — the
    /// cache is never the system of record.
    pub fn put(&mut self, address: CarverAddress) {
        if address.label.is_special() {
            self.common.insert(address.label.clone(), address);
            return;
        }

        if self.normal.len() >= self.capacity && !self.normal.contains_key(&address.label) {
            self.normal.clear();
        }
        self.normal.insert(address.label.clone(), address);
    }

    /// Drops both tiers. Used by the Unwinder: after a rollback the common
    /// tier may reference entities that no longer exist.
    pub fn clear(&mut self) {
        self.common.clear();
        self.normal.clear();
    }

    #[cfg(test)]
    pub fn normal_len(&self) -> usize {
        self.normal.len()
    }
}

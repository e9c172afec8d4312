//! Bounded in-memory ledger backed by a ring buffer

use super::LedgerStorage;
use crate::{
    errors::{ShopResult, StorageError},
    types::{Identity, LedgerEntry, NewLedgerEntry},
};
use std::{collections::VecDeque, sync::Mutex};

struct Ring {
    entries: VecDeque<LedgerEntry>,
    next_sequence: u64,
}

/// Fixed-capacity ledger; the oldest entry is evicted once full
pub struct InMemoryLedger {
    capacity: usize,
    ring: Mutex<Ring>,
}

impl InMemoryLedger {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            ring: Mutex::new(Ring {
                entries: VecDeque::with_capacity(capacity.min(4096)),
                next_sequence: 1,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.ring.lock().map(|ring| ring.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LedgerStorage for InMemoryLedger {
    fn mode(&self) -> String {
        format!("in-memory(capacity={})", self.capacity)
    }

    fn append(&self, entry: NewLedgerEntry) -> ShopResult<LedgerEntry> {
        let mut ring = self
            .ring
            .lock()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))?;

        let stored = entry.with_sequence(ring.next_sequence);
        ring.next_sequence += 1;

        if ring.entries.len() >= self.capacity {
            ring.entries.pop_front();
        }
        ring.entries.push_back(stored.clone());

        Ok(stored)
    }

    fn recent(&self, identity: Option<Identity>, limit: usize) -> ShopResult<Vec<LedgerEntry>> {
        let ring = self
            .ring
            .lock()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))?;

        let mut matching: Vec<LedgerEntry> = ring
            .entries
            .iter()
            .filter(|e| identity.map_or(true, |id| e.identity == id))
            .cloned()
            .collect();
        drop(ring);

        matching.sort_by(LedgerEntry::newest_first);
        matching.truncate(limit);
        Ok(matching)
    }
}

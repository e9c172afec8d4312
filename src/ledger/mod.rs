//! Append-only credit ledger
//!
//! Two interchangeable backends sit behind [`LedgerStorage`]: a bounded
//! in-memory ring buffer and an unbounded RocksDB store. [`LedgerStore`] wraps
//! whichever one is configured and applies the best-effort policy: writes that
//! fail are logged and counted, reads that fail come back empty.

pub mod memory;
pub mod rocks;

use crate::{
    config::{LedgerBackend, LedgerConfig},
    errors::ShopResult,
    metrics::ShopMetrics,
    types::{Identity, LedgerEntry, NewLedgerEntry},
};
use tracing::warn;

pub use memory::InMemoryLedger;
pub use rocks::RocksLedger;

/// Storage contract shared by both backends
pub trait LedgerStorage: Send + Sync {
    /// Human-readable backend description
    fn mode(&self) -> String;

    /// Assign the next sequence id and persist the entry
    fn append(&self, entry: NewLedgerEntry) -> ShopResult<LedgerEntry>;

    /// Up to `limit` entries, newest first, optionally for one identity only
    fn recent(&self, identity: Option<Identity>, limit: usize) -> ShopResult<Vec<LedgerEntry>>;
}

pub struct LedgerStore {
    backend: Box<dyn LedgerStorage>,
    metrics: ShopMetrics,
}

impl LedgerStore {
    /// Open the backend selected by `config`
    pub fn open(config: &LedgerConfig, metrics: ShopMetrics) -> ShopResult<Self> {
        let backend: Box<dyn LedgerStorage> = match config.backend {
            LedgerBackend::InMemory => Box::new(InMemoryLedger::new(config.in_memory_capacity)),
            LedgerBackend::RocksDb => Box::new(RocksLedger::open(config)?),
        };

        tracing::info!("Ledger opened: {}", backend.mode());
        Ok(Self { backend, metrics })
    }

    pub fn in_memory(capacity: usize) -> Self {
        Self::with_backend(Box::new(InMemoryLedger::new(capacity)), ShopMetrics::new())
    }

    pub fn with_backend(backend: Box<dyn LedgerStorage>, metrics: ShopMetrics) -> Self {
        Self { backend, metrics }
    }

    pub fn mode(&self) -> String {
        self.backend.mode()
    }

    /// Append one entry. Backend failures are logged and swallowed; the
    /// entry is lost rather than retried.
    pub fn record(&self, entry: NewLedgerEntry) -> Option<LedgerEntry> {
        let identity = entry.identity;
        let action = entry.action;

        match self.backend.append(entry) {
            Ok(stored) => {
                self.metrics.ledger_entries_written.inc();
                Some(stored)
            }
            Err(e) => {
                self.metrics.ledger_write_errors.inc();
                warn!(
                    "Failed to record {} entry for {} in {}: {}",
                    action,
                    identity,
                    self.backend.mode(),
                    e
                );
                None
            }
        }
    }

    pub fn get_recent(&self, max_entries: usize) -> Vec<LedgerEntry> {
        if max_entries == 0 {
            return Vec::new();
        }
        self.read(None, max_entries)
    }

    pub fn get_recent_for_identity(&self, identity: Identity, max_entries: usize) -> Vec<LedgerEntry> {
        if max_entries == 0 || !identity.is_valid() {
            return Vec::new();
        }
        self.read(Some(identity), max_entries)
    }

    fn read(&self, identity: Option<Identity>, limit: usize) -> Vec<LedgerEntry> {
        match self.backend.recent(identity, limit) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to read ledger from {}: {}", self.backend.mode(), e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        errors::StorageError,
        types::{Credits, LedgerAction},
    };

    struct BrokenStorage;

    impl LedgerStorage for BrokenStorage {
        fn mode(&self) -> String {
            "broken".to_string()
        }

        fn append(&self, _entry: NewLedgerEntry) -> ShopResult<LedgerEntry> {
            Err(StorageError::WriteFailed("disk full".to_string()).into())
        }

        fn recent(&self, _identity: Option<Identity>, _limit: usize) -> ShopResult<Vec<LedgerEntry>> {
            Err(StorageError::ReadFailed("disk gone".to_string()).into())
        }
    }

    fn entry(identity: u64, timestamp: i64) -> NewLedgerEntry {
        NewLedgerEntry {
            timestamp,
            identity: Identity(identity),
            display_name: format!("player{}", identity),
            action: LedgerAction::Credit,
            amount: Credits::from_whole(1),
            balance_after: Credits::from_whole(1),
            item_id: None,
            item_display_name: None,
        }
    }

    #[test]
    fn test_backend_failures_are_contained() {
        let metrics = ShopMetrics::new();
        let store = LedgerStore::with_backend(Box::new(BrokenStorage), metrics.clone());

        assert!(store.record(entry(1, 10)).is_none());
        assert!(store.get_recent(10).is_empty());
        assert!(store.get_recent_for_identity(Identity(1), 10).is_empty());
        assert_eq!(metrics.snapshot().ledger_write_errors, 1);
        assert_eq!(metrics.snapshot().ledger_entries_written, 0);
    }

    #[test]
    fn test_zero_limit_and_invalid_identity_are_empty() {
        let store = LedgerStore::in_memory(10);
        store.record(entry(1, 10));

        assert!(store.get_recent(0).is_empty());
        assert!(store.get_recent_for_identity(Identity(1), 0).is_empty());
        assert!(store.get_recent_for_identity(Identity::INVALID, 10).is_empty());
        assert_eq!(store.get_recent(10).len(), 1);
    }

    #[test]
    fn test_open_from_config() -> ShopResult<()> {
        let config = LedgerConfig {
            in_memory_capacity: 5,
            ..Default::default()
        };
        let store = LedgerStore::open(&config, ShopMetrics::new())?;
        assert_eq!(store.mode(), "in-memory(capacity=5)");
        Ok(())
    }
}

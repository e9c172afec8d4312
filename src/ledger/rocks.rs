//! Persistent ledger on RocksDB
//!
//! Key layout:
//! - `ledger:meta:schema` holds the schema version as big-endian u32
//! - `ledger:entry:<seq>` holds the bincode-encoded entry
//! - `ledger:recent:<!ts><!seq>` is the global newest-first index
//! - `ledger:identity:<id><!ts><!seq>` is the per-identity newest-first index
//!
//! Timestamps and sequence ids are inverted in index keys so that a forward
//! prefix scan yields entries newest first.

use super::LedgerStorage;
use crate::{
    config::LedgerConfig,
    errors::{ShopResult, StorageError},
    storage::LedgerDb,
    types::{Identity, LedgerEntry, NewLedgerEntry},
};
use std::sync::Mutex;
use tracing::{info, warn};

pub const SCHEMA_VERSION: u32 = 1;

const SCHEMA_KEY: &[u8] = b"ledger:meta:schema";
const ENTRY_PREFIX: &[u8] = b"ledger:entry:";
const RECENT_PREFIX: &[u8] = b"ledger:recent:";
const IDENTITY_PREFIX: &[u8] = b"ledger:identity:";

/// Inverted, order-preserving encoding of a signed timestamp
fn inverted_timestamp(timestamp: i64) -> [u8; 8] {
    (!((timestamp as u64) ^ (1 << 63))).to_be_bytes()
}

fn entry_key(sequence_id: u64) -> Vec<u8> {
    let mut key = ENTRY_PREFIX.to_vec();
    key.extend_from_slice(&sequence_id.to_be_bytes());
    key
}

fn recent_key(timestamp: i64, sequence_id: u64) -> Vec<u8> {
    let mut key = RECENT_PREFIX.to_vec();
    key.extend_from_slice(&inverted_timestamp(timestamp));
    key.extend_from_slice(&(!sequence_id).to_be_bytes());
    key
}

fn identity_prefix(identity: Identity) -> Vec<u8> {
    let mut key = IDENTITY_PREFIX.to_vec();
    key.extend_from_slice(&identity.0.to_be_bytes());
    key
}

fn identity_key(identity: Identity, timestamp: i64, sequence_id: u64) -> Vec<u8> {
    let mut key = identity_prefix(identity);
    key.extend_from_slice(&inverted_timestamp(timestamp));
    key.extend_from_slice(&(!sequence_id).to_be_bytes());
    key
}

/// Trailing eight bytes of any entry or index key name the sequence id
fn sequence_from_key(key: &[u8], inverted: bool) -> Option<u64> {
    let tail: [u8; 8] = key.get(key.len().checked_sub(8)?..)?.try_into().ok()?;
    let value = u64::from_be_bytes(tail);
    Some(if inverted { !value } else { value })
}

/// Unbounded append-only ledger
pub struct RocksLedger {
    db: LedgerDb,
    path: String,
    /// Next sequence id to assign; every append and read holds this lock
    next_sequence: Mutex<u64>,
}

impl RocksLedger {
    /// Open the ledger at `config.data_directory`.
    ///
    /// With `auto_sync_structure` the database is created if missing and the
    /// schema marker is written. Without it the database must already exist
    /// with a matching marker.
    pub fn open(config: &LedgerConfig) -> ShopResult<Self> {
        let path = config.data_directory.clone();
        let db = LedgerDb::open(config, config.auto_sync_structure)
            .map_err(|e| StorageError::DatabaseOpenFailed(format!("{}: {}", path, e)))?;

        let found = Self::read_schema(&db)?;
        match found {
            Some(SCHEMA_VERSION) => {}
            None if config.auto_sync_structure => {
                db.put(SCHEMA_KEY, &SCHEMA_VERSION.to_be_bytes())?;
                info!("Initialized ledger schema v{} at {}", SCHEMA_VERSION, path);
            }
            found => {
                return Err(StorageError::SchemaMismatch {
                    expected: SCHEMA_VERSION,
                    found,
                }
                .into())
            }
        }

        let next_sequence = db
            .last_key_with_prefix(ENTRY_PREFIX)?
            .and_then(|key| sequence_from_key(&key, false))
            .map_or(1, |last| last + 1);

        info!("Ledger at {} resumes at sequence {}", path, next_sequence);

        Ok(Self {
            db,
            path,
            next_sequence: Mutex::new(next_sequence),
        })
    }

    fn read_schema(db: &LedgerDb) -> ShopResult<Option<u32>> {
        let Some(bytes) = db.get(SCHEMA_KEY)? else {
            return Ok(None);
        };
        let raw: [u8; 4] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| StorageError::CorruptedData("schema marker is not a u32".to_string()))?;
        Ok(Some(u32::from_be_bytes(raw)))
    }

    fn load_entry(&self, sequence_id: u64) -> ShopResult<Option<LedgerEntry>> {
        match self.db.get(&entry_key(sequence_id))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }
}

impl LedgerStorage for RocksLedger {
    fn mode(&self) -> String {
        format!("rocksdb({})", self.path)
    }

    fn append(&self, entry: NewLedgerEntry) -> ShopResult<LedgerEntry> {
        let mut next = self
            .next_sequence
            .lock()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))?;

        let stored = entry.with_sequence(*next);
        let encoded = bincode::serialize(&stored)?;

        let items = [
            (entry_key(stored.sequence_id), encoded),
            (recent_key(stored.timestamp, stored.sequence_id), Vec::new()),
            (
                identity_key(stored.identity, stored.timestamp, stored.sequence_id),
                Vec::new(),
            ),
        ];
        self.db
            .batch_write(&items)
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;

        *next += 1;
        Ok(stored)
    }

    fn recent(&self, identity: Option<Identity>, limit: usize) -> ShopResult<Vec<LedgerEntry>> {
        let _store = self
            .next_sequence
            .lock()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))?;

        let prefix = match identity {
            Some(identity) => identity_prefix(identity),
            None => RECENT_PREFIX.to_vec(),
        };

        let keys = self
            .db
            .scan_prefix_keys(&prefix, limit)
            .map_err(|e| StorageError::ReadFailed(e.to_string()))?;

        let mut entries = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(sequence_id) = sequence_from_key(&key, true) else {
                continue;
            };
            match self.load_entry(sequence_id)? {
                Some(entry) => entries.push(entry),
                None => warn!("Ledger index references missing entry {}", sequence_id),
            }
        }

        Ok(entries)
    }
}

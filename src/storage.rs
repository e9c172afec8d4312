//! RocksDB access layer for the persistent ledger backend

use crate::config::{CompressionType, LedgerConfig};
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use std::{path::Path, sync::Arc};

#[derive(Clone)]
pub struct LedgerDb {
    db: Arc<DB>,
}

impl LedgerDb {
    /// Open the database described by `config`.
    ///
    /// With `create_if_missing == false` the directory must already hold a database.
    pub fn open(config: &LedgerConfig, create_if_missing: bool) -> Result<Self, rocksdb::Error> {
        let mut opts = Options::default();
        opts.create_if_missing(create_if_missing);
        opts.set_write_buffer_size(config.write_buffer_size_mb * 1024 * 1024);
        opts.set_compression_type(match config.compression_type {
            CompressionType::None => rocksdb::DBCompressionType::None,
            CompressionType::Snappy => rocksdb::DBCompressionType::Snappy,
            CompressionType::Lz4 => rocksdb::DBCompressionType::Lz4,
            CompressionType::Zstd => rocksdb::DBCompressionType::Zstd,
        });

        Self::open_with(opts, &config.data_directory)
    }

    fn open_with<P: AsRef<Path>>(opts: Options, path: P) -> Result<Self, rocksdb::Error> {
        let db = DB::open(&opts, path)?;
        Ok(Self { db: Arc::new(db) })
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, rocksdb::Error> {
        self.db.get(key)
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<(), rocksdb::Error> {
        self.db.put(key, value)
    }

    /// Write all items atomically
    pub fn batch_write<K, V>(&self, items: &[(K, V)]) -> Result<(), rocksdb::Error>
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        let mut batch = WriteBatch::default();
        for (key, value) in items {
            batch.put(key, value);
        }
        self.db.write(batch)
    }

    /// Keys under `prefix` in ascending order, at most `limit`
    pub fn scan_prefix_keys(&self, prefix: &[u8], limit: usize) -> Result<Vec<Vec<u8>>, rocksdb::Error> {
        let mut keys = Vec::with_capacity(limit.min(1024));
        let iter = self.db.iterator(IteratorMode::From(prefix, Direction::Forward));

        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(prefix) || keys.len() >= limit {
                break;
            }
            keys.push(key.to_vec());
        }

        Ok(keys)
    }

    /// Greatest key under `prefix`, if any
    pub fn last_key_with_prefix(&self, prefix: &[u8]) -> Result<Option<Vec<u8>>, rocksdb::Error> {
        let mut upper = prefix.to_vec();
        upper.extend_from_slice(&[0xFF; 16]);

        let iter = self.db.iterator(IteratorMode::From(upper.as_slice(), Direction::Reverse));
        for item in iter {
            let (key, _) = item?;
            if key.starts_with(prefix) {
                return Ok(Some(key.to_vec()));
            }
            if key.as_ref() < prefix {
                break;
            }
        }

        Ok(None)
    }
}

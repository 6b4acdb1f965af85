//! RocksDB backend
//!
//! All graph tables share the default column family; table separation is
//! carried by the one-byte key tags.

use super::kv::{BatchOp, KvIter, KvStore, WriteBatch};
use super::{StorageError, StorageResult};
use crate::config::RocksDbConfig;
use rocksdb::{Direction, IteratorMode, Options, DB};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// RocksDB-based ordered store
pub struct RocksKv {
    db: DB,
    path: PathBuf,
}

impl RocksKv {
    /// Open or create a store at `path`
    pub fn open(path: impl AsRef<Path>, config: &RocksDbConfig) -> StorageResult<Self> {
        let path = path.as_ref().to_path_buf();
        info!("Opening RocksDB store at: {}", path.display());

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_write_buffer_size(config.write_buffer_size);
        opts.set_max_write_buffer_number(config.max_write_buffer_number);
        opts.set_min_write_buffer_number_to_merge(1);
        if config.compression {
            opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        } else {
            opts.set_compression_type(rocksdb::DBCompressionType::None);
        }
        opts.set_wal_recovery_mode(rocksdb::DBRecoveryMode::PointInTime);

        let db = DB::open(&opts, &path)?;
        info!("RocksDB store opened successfully");

        Ok(Self { db, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KvStore for RocksKv {
    fn backend_name(&self) -> &'static str {
        "rocksdb"
    }

    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.db.get(key)?)
    }

    fn write(&self, batch: WriteBatch) -> StorageResult<()> {
        let mut rocks_batch = rocksdb::WriteBatch::default();
        for op in batch.into_ops() {
            match op {
                BatchOp::Put(key, value) => rocks_batch.put(key, value),
                BatchOp::Delete(key) => rocks_batch.delete(key),
            }
        }
        self.db.write(rocks_batch)?;
        Ok(())
    }

    fn scan_prefix<'a>(&'a self, prefix: &[u8]) -> KvIter<'a> {
        let owned = prefix.to_vec();
        let iter = self
            .db
            .iterator(IteratorMode::From(prefix, Direction::Forward))
            .map(|item| {
                item.map(|(key, value)| (key.into_vec(), value.into_vec()))
                    .map_err(StorageError::from)
            })
            .take_while(move |item| match item {
                Ok((key, _)) => key.starts_with(&owned),
                Err(_) => true,
            });
        Box::new(iter)
    }

    fn flush(&self) -> StorageResult<()> {
        debug!("Flushing RocksDB store at {}", self.path.display());
        self.db.flush()?;
        Ok(())
    }
}

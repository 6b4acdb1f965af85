//! Ordered key-value abstraction
//!
//! The graph layer only needs point reads, atomic multi-key writes and
//! forward prefix iteration. Any ordered store offering those can back a
//! graph; `MemoryKv` is the in-process implementation.

use super::StorageResult;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::RwLock;

pub type KvPair = (Vec<u8>, Vec<u8>);

/// Lazy iterator over a key range; errors are yielded in-band
pub type KvIter<'a> = Box<dyn Iterator<Item = StorageResult<KvPair>> + 'a>;

/// One mutation inside a `WriteBatch`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

/// A set of mutations applied atomically by `KvStore::write`
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push(BatchOp::Put(key, value));
    }

    pub fn delete(&mut self, key: Vec<u8>) {
        self.ops.push(BatchOp::Delete(key));
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<BatchOp> {
        self.ops
    }
}

/// Ordered key-value store used by the graph layer
pub trait KvStore: Send + Sync {
    /// Driver name, for logging
    fn backend_name(&self) -> &'static str;

    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// Apply every operation of `batch` or none of them
    fn write(&self, batch: WriteBatch) -> StorageResult<()>;

    /// Iterate, in key order, over every pair whose key starts with `prefix`
    fn scan_prefix<'a>(&'a self, prefix: &[u8]) -> KvIter<'a>;

    fn flush(&self) -> StorageResult<()>;

    fn put(&self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        let mut batch = WriteBatch::new();
        batch.put(key.to_vec(), value.to_vec());
        self.write(batch)
    }

    fn contains(&self, key: &[u8]) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Delete every key under `prefix` in one batch; returns the count
    fn delete_prefix(&self, prefix: &[u8]) -> StorageResult<usize> {
        let mut batch = WriteBatch::new();
        for pair in self.scan_prefix(prefix) {
            let (key, _) = pair?;
            batch.delete(key);
        }
        let count = batch.len();
        if count > 0 {
            self.write(batch)?;
        }
        Ok(count)
    }
}

/// In-process ordered store backed by a `BTreeMap`
#[derive(Debug, Default)]
pub struct MemoryKv {
    map: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.map.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn poisoned() -> super::StorageError {
        super::StorageError::BackendUnavailable("memory store lock poisoned".to_string())
    }
}

impl KvStore for MemoryKv {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        let map = self.map.read().map_err(|_| Self::poisoned())?;
        Ok(map.get(key).cloned())
    }

    fn write(&self, batch: WriteBatch) -> StorageResult<()> {
        let mut map = self.map.write().map_err(|_| Self::poisoned())?;
        for op in batch.into_ops() {
            match op {
                BatchOp::Put(key, value) => {
                    map.insert(key, value);
                }
                BatchOp::Delete(key) => {
                    map.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn scan_prefix<'a>(&'a self, prefix: &[u8]) -> KvIter<'a> {
        Box::new(MemoryPrefixIter {
            store: self,
            prefix: prefix.to_vec(),
            last: None,
            done: false,
        })
    }

    fn flush(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Cursor over a `MemoryKv` prefix.
///
/// The read lock is taken per step, so writers are never blocked for the
/// lifetime of a scan; each step resumes strictly after the last key seen.
struct MemoryPrefixIter<'a> {
    store: &'a MemoryKv,
    prefix: Vec<u8>,
    last: Option<Vec<u8>>,
    done: bool,
}

impl Iterator for MemoryPrefixIter<'_> {
    type Item = StorageResult<KvPair>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let map = match self.store.map.read() {
            Ok(map) => map,
            Err(_) => {
                self.done = true;
                return Some(Err(MemoryKv::poisoned()));
            }
        };
        let lower = match &self.last {
            Some(last) => Bound::Excluded(last.as_slice()),
            None => Bound::Included(self.prefix.as_slice()),
        };
        let next = map
            .range::<[u8], _>((lower, Bound::Unbounded))
            .next()
            .filter(|(key, _)| key.starts_with(&self.prefix))
            .map(|(key, value)| (key.clone(), value.clone()));
        drop(map);

        match next {
            Some((key, value)) => {
                self.last = Some(key.clone());
                Some(Ok((key, value)))
            }
            None => {
                self.done = true;
                None
            }
        }
    }
}

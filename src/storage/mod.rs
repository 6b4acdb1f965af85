//! Storage layer
//!
//! - Binary key codec over surrogate keys (`keys`)
//! - Ordered key-value abstraction with RocksDB and in-memory drivers
//! - Per-graph identifier map (`keymap`)
//! - The graph adapter consumed by the query engine (`adapter`, `graph`)
//! - Multi-graph database handle (`db`)

pub mod adapter;
pub mod db;
pub mod graph;
pub mod keymap;
pub mod keys;
pub mod kv;
pub mod registry;
pub mod rocks;

pub use adapter::{Capabilities, ElementIter, GraphInterface, Neighbor};
pub use db::GraphDb;
pub use graph::KvGraph;
pub use keymap::KeyMap;
pub use keys::{IndexSide, KeyError};
pub use kv::{KvStore, MemoryKv, WriteBatch};
pub use registry::StorageRegistry;
pub use rocks::RocksKv;

use thiserror::Error;

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// Id has no mapping, or the element record is gone
    #[error("Not found: {0}")]
    NotFound(String),

    /// A key or record failed to decode
    #[error("Key corruption: {0}")]
    KeyCorruption(String),

    /// Forward and reverse identifier rows disagree
    #[error("Consistency fault: {0}")]
    ConsistencyFault(String),

    /// Transient backend failure; the whole operation may be retried
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Payload (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Rejected input element
    #[error("Invalid element: {0}")]
    InvalidElement(String),
}

impl StorageError {
    /// Data-integrity failures; the operation must be aborted, not retried
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StorageError::KeyCorruption(_)
                | StorageError::ConsistencyFault(_)
                | StorageError::Serialization(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

impl From<KeyError> for StorageError {
    fn from(err: KeyError) -> Self {
        StorageError::KeyCorruption(err.to_string())
    }
}

impl From<rocksdb::Error> for StorageError {
    fn from(err: rocksdb::Error) -> Self {
        match err.kind() {
            rocksdb::ErrorKind::Corruption => StorageError::KeyCorruption(err.to_string()),
            _ => StorageError::BackendUnavailable(err.to_string()),
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let err: StorageError = KeyError::InvalidUtf8 { table: "vertex" }.into();
        assert!(err.is_fatal());
        assert!(!StorageError::NotFound("x".into()).is_fatal());
        assert!(StorageError::NotFound("x".into()).is_not_found());
        assert!(!StorageError::BackendUnavailable("down".into()).is_fatal());
    }
}

//! Storage driver registry
//!
//! Maps driver names to constructors. The registry is an ordinary value
//! handed to `GraphDb::open`, so tests and embedders can register their own
//! drivers without touching process-wide state.

use super::kv::{KvStore, MemoryKv};
use super::rocks::RocksKv;
use super::{StorageError, StorageResult};
use crate::config::DatabaseConfig;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Builds a key-value store from configuration
pub type KvConstructor =
    Box<dyn Fn(&DatabaseConfig) -> StorageResult<Arc<dyn KvStore>> + Send + Sync>;

#[derive(Default)]
pub struct StorageRegistry {
    drivers: HashMap<String, KvConstructor>,
}

impl StorageRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `rocksdb` and `memory` drivers
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("rocksdb", |config: &DatabaseConfig| {
            let kv = RocksKv::open(&config.data_path, &config.rocksdb)?;
            Ok(Arc::new(kv) as Arc<dyn KvStore>)
        });
        registry.register("memory", |_: &DatabaseConfig| {
            Ok(Arc::new(MemoryKv::new()) as Arc<dyn KvStore>)
        });
        registry
    }

    /// Register (or replace) a driver
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F)
    where
        F: Fn(&DatabaseConfig) -> StorageResult<Arc<dyn KvStore>> + Send + Sync + 'static,
    {
        self.drivers.insert(name.into(), Box::new(constructor));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.drivers.contains_key(name)
    }

    pub fn driver_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.drivers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Construct the store named by `config.backend`
    pub fn open(&self, config: &DatabaseConfig) -> StorageResult<Arc<dyn KvStore>> {
        let constructor = self.drivers.get(&config.backend).ok_or_else(|| {
            StorageError::BackendUnavailable(format!(
                "unknown storage driver '{}'",
                config.backend
            ))
        })?;
        constructor(config)
    }
}

impl fmt::Debug for StorageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageRegistry")
            .field("drivers", &self.driver_names())
            .finish()
    }
}

//! Database configuration
//!
//! Every field has a default, so a partial YAML document (or none at all)
//! yields a usable configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// RocksDB tuning knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RocksDbConfig {
    /// Memtable size in bytes
    pub write_buffer_size: usize,
    pub max_write_buffer_number: i32,
    /// Compress SST files with LZ4
    pub compression: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            write_buffer_size: 64 * 1024 * 1024, // 64 MB
            max_write_buffer_number: 3,
            compression: true,
        }
    }
}

/// Top-level database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Directory holding the backend's files
    pub data_path: PathBuf,
    /// Driver name resolved through the storage registry
    pub backend: String,
    /// Surrogate keys reserved per durable counter write
    pub key_block_size: u64,
    /// Capacity of each inter-stage queue
    pub queue_capacity: usize,
    /// Travelers gathered per adjacency lookup
    pub lookup_batch_size: usize,
    pub rocksdb: RocksDbConfig,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("./trellis-data"),
            backend: "rocksdb".to_string(),
            key_block_size: 1000,
            queue_capacity: 500,
            lookup_batch_size: 100,
            rocksdb: RocksDbConfig::default(),
        }
    }
}

impl DatabaseConfig {
    /// In-process configuration backed by the memory driver
    pub fn in_memory() -> Self {
        Self {
            backend: "memory".to_string(),
            ..Self::default()
        }
    }

    pub fn with_data_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_path = path.into();
        self
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: DatabaseConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.key_block_size == 0 {
            return Err(ConfigError::Invalid("key_block_size must be positive".to_string()));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid("queue_capacity must be positive".to_string()));
        }
        if self.lookup_batch_size == 0 {
            return Err(ConfigError::Invalid("lookup_batch_size must be positive".to_string()));
        }
        Ok(())
    }
}

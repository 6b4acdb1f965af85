//! Trellis Graph Database
//!
//! A property-graph database core: elements are stored in an ordered
//! key-value backend under compact binary keys, and traversals are compiled
//! into pipelines of concurrently running stages.
//!
//! # Architecture
//!
//! - `storage`: key codec, identifier map, key-value backends (RocksDB and
//!   in-memory) and the `GraphInterface` adapter used by the query engine
//! - `query`: statements, the type-state compiler and the pipeline runtime
//! - `graph`: the vertex/edge/property data model
//!
//! ## Example Usage
//!
//! ```rust
//! use trellis::{Cancellation, DatabaseConfig, Edge, GraphDb, GraphInterface, Query, StorageRegistry, Vertex};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let db = GraphDb::open(DatabaseConfig::in_memory(), &StorageRegistry::with_defaults())?;
//! let graph = db.add_graph("people")?;
//! graph.add_vertices(&[
//!     Vertex::new("1", "Person").with_property("name", "Alex"),
//!     Vertex::new("3", "Robot").with_property("name", "Bender"),
//! ])?;
//! graph.add_edges(&[Edge::new("e1", "1", "3", "knows")])?;
//!
//! let pipeline = db.compile("people", Query::v(&["1"]).out(&["knows"]).statements())?;
//! let workdir = tempfile::tempdir()?;
//! let results = trellis::query::run(&Cancellation::new(), Arc::new(pipeline), workdir.path())
//!     .try_collect_results()
//!     .await?;
//! assert_eq!(results[0].as_vertex().map(|v| v.id.as_str()), Some("3"));
//! # Ok(())
//! # }
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod cancel;
pub mod config;
pub mod graph;
pub mod query;
pub mod storage;

// Re-export main types for convenience
pub use cancel::Cancellation;

pub use config::{ConfigError, DatabaseConfig, RocksDbConfig};

pub use graph::{
    Direction, Edge, EdgeKey, Element, GraphKey, LabelKey, PropertyMap, PropertyValue, Vertex,
    VertexKey,
};

pub use query::{
    compile, parse_statements, resume, run, DataType, ExecutionError, ExecutionResult,
    HasExpression, Pipeline, PipelineState, Query, QueryResult, RunningPipeline, Statement,
};

pub use storage::{
    GraphDb, GraphInterface, KvGraph, KvStore, MemoryKv, RocksKv, StorageError, StorageRegistry,
    StorageResult,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get version string
pub fn version() -> &'static str {
    VERSION
}

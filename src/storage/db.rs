//! Multi-graph database handle
//!
//! Owns the key-value store and hands out one `KvGraph` per named graph.
//! Graph keys come from a durable counter and are never reused, even after
//! the graph that held them is deleted.

use super::adapter::GraphInterface;
use super::graph::KvGraph;
use super::keys::{
    decode_graph_name_key, decode_u64, encode_graph_name_key, encode_graph_reverse_key,
    encode_u64, graph_counter_key, graph_name_prefix, graph_prefixes,
};
use super::kv::{KvStore, WriteBatch};
use super::registry::StorageRegistry;
use super::{StorageError, StorageResult};
use crate::config::DatabaseConfig;
use crate::graph::GraphKey;
use crate::query::{compile, ExecutionResult, Pipeline, Statement};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tracing::info;

pub struct GraphDb {
    config: DatabaseConfig,
    kv: Arc<dyn KvStore>,
    graphs: RwLock<HashMap<String, Arc<KvGraph>>>,
    /// Serializes graph creation and deletion
    catalog_lock: Mutex<()>,
}

impl GraphDb {
    /// Open the backend named by `config.backend` and load the graph catalog
    pub fn open(config: DatabaseConfig, registry: &StorageRegistry) -> StorageResult<Self> {
        let kv = registry.open(&config)?;
        info!(
            "Opening graph database with '{}' backend",
            kv.backend_name()
        );

        let mut graphs = HashMap::new();
        for pair in kv.scan_prefix(&graph_name_prefix()) {
            let (key, value) = pair?;
            let name = decode_graph_name_key(&key)?;
            let graph_key = GraphKey(decode_u64("graph key", &value)?);
            let graph = KvGraph::new(name.clone(), graph_key, Arc::clone(&kv), config.key_block_size);
            graphs.insert(name, Arc::new(graph));
        }
        info!("Loaded {} graphs", graphs.len());

        Ok(Self {
            config,
            kv,
            graphs: RwLock::new(graphs),
            catalog_lock: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Create a graph, or return the existing one with that name
    pub fn add_graph(&self, name: &str) -> StorageResult<Arc<KvGraph>> {
        if name.is_empty() {
            return Err(StorageError::InvalidElement("graph name is empty".to_string()));
        }
        let _guard = self.lock_catalog()?;
        if let Some(graph) = self.read_graphs()?.get(name) {
            return Ok(Arc::clone(graph));
        }

        let counter_key = graph_counter_key();
        let last = match self.kv.get(&counter_key)? {
            Some(raw) => decode_u64("graph counter", &raw)?,
            None => 0,
        };
        let graph_key = GraphKey(last + 1);

        let mut batch = WriteBatch::new();
        batch.put(counter_key, encode_u64(graph_key.0));
        batch.put(encode_graph_name_key(name), encode_u64(graph_key.0));
        batch.put(encode_graph_reverse_key(graph_key), name.as_bytes().to_vec());
        self.kv.write(batch)?;

        let graph = Arc::new(KvGraph::new(
            name,
            graph_key,
            Arc::clone(&self.kv),
            self.config.key_block_size,
        ));
        self.write_graphs()?.insert(name.to_string(), Arc::clone(&graph));
        info!("Created graph '{}' ({})", name, graph_key);
        Ok(graph)
    }

    /// Drop a graph and every row stored under its key
    pub fn delete_graph(&self, name: &str) -> StorageResult<()> {
        let _guard = self.lock_catalog()?;
        let graph = self
            .write_graphs()?
            .remove(name)
            .ok_or_else(|| StorageError::NotFound(format!("graph '{}'", name)))?;
        let graph_key = graph.graph_key();
        // in-flight writers through older handles finish first; later ones fail
        let _writer = graph.retire()?;

        let mut batch = WriteBatch::new();
        for prefix in graph_prefixes(graph_key) {
            for pair in self.kv.scan_prefix(&prefix) {
                let (key, _) = pair?;
                batch.delete(key);
            }
        }
        let rows = batch.len();
        batch.delete(encode_graph_name_key(name));
        batch.delete(encode_graph_reverse_key(graph_key));
        self.kv.write(batch)?;

        info!("Deleted graph '{}' ({} rows)", name, rows);
        Ok(())
    }

    pub fn graph(&self, name: &str) -> StorageResult<Arc<KvGraph>> {
        self.read_graphs()?
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("graph '{}'", name)))
    }

    pub fn list_graphs(&self) -> StorageResult<Vec<String>> {
        let mut names: Vec<String> = self.read_graphs()?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    pub fn get_timestamp(&self, name: &str) -> StorageResult<String> {
        Ok(self.graph(name)?.get_timestamp())
    }

    /// Compile a statement list against a named graph
    pub fn compile(&self, graph: &str, statements: &[Statement]) -> ExecutionResult<Pipeline> {
        let graph = self.graph(graph)?;
        compile(graph, statements, &self.config)
    }

    pub fn flush(&self) -> StorageResult<()> {
        self.kv.flush()
    }

    fn lock_catalog(&self) -> StorageResult<std::sync::MutexGuard<'_, ()>> {
        self.catalog_lock
            .lock()
            .map_err(|_| StorageError::ConsistencyFault("graph catalog lock poisoned".to_string()))
    }

    fn read_graphs(
        &self,
    ) -> StorageResult<std::sync::RwLockReadGuard<'_, HashMap<String, Arc<KvGraph>>>> {
        self.graphs
            .read()
            .map_err(|_| StorageError::ConsistencyFault("graph catalog lock poisoned".to_string()))
    }

    fn write_graphs(
        &self,
    ) -> StorageResult<std::sync::RwLockWriteGuard<'_, HashMap<String, Arc<KvGraph>>>> {
        self.graphs
            .write()
            .map_err(|_| StorageError::ConsistencyFault("graph catalog lock poisoned".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, Vertex};
    use crate::storage::kv::MemoryKv;

    fn shared_registry(kv: Arc<dyn KvStore>) -> StorageRegistry {
        let mut registry = StorageRegistry::new();
        registry.register("memory", move |_: &DatabaseConfig| Ok(Arc::clone(&kv)));
        registry
    }

    #[test]
    fn test_add_and_list_graphs() {
        let db = GraphDb::open(DatabaseConfig::in_memory(), &StorageRegistry::with_defaults()).unwrap();
        let a = db.add_graph("alpha").unwrap();
        let b = db.add_graph("beta").unwrap();
        assert_ne!(a.graph_key(), b.graph_key());
        assert_eq!(db.add_graph("alpha").unwrap().graph_key(), a.graph_key());
        assert_eq!(db.list_graphs().unwrap(), vec!["alpha", "beta"]);
        assert!(db.graph("gamma").unwrap_err().is_not_found());
        assert!(db.add_graph("").is_err());
    }

    #[test]
    fn test_catalog_reloads() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
        {
            let db = GraphDb::open(DatabaseConfig::in_memory(), &shared_registry(Arc::clone(&kv))).unwrap();
            let g = db.add_graph("people").unwrap();
            g.add_vertices(&[Vertex::new("1", "Person")]).unwrap();
        }
        let db = GraphDb::open(DatabaseConfig::in_memory(), &shared_registry(kv)).unwrap();
        let g = db.graph("people").unwrap();
        assert!(g.get_vertex("1", false).unwrap().is_some());
    }

    #[test]
    fn test_delete_graph_drops_every_row() {
        let kv = Arc::new(MemoryKv::new());
        let shared: Arc<dyn KvStore> = kv.clone();
        let db = GraphDb::open(DatabaseConfig::in_memory(), &shared_registry(shared)).unwrap();

        let keep = db.add_graph("keep").unwrap();
        keep.add_vertices(&[Vertex::new("k", "Thing")]).unwrap();
        let rows_before = kv.len();

        let doomed = db.add_graph("doomed").unwrap();
        let doomed_key = doomed.graph_key();
        doomed
            .add_vertices(&[Vertex::new("1", "A"), Vertex::new("2", "B")])
            .unwrap();
        doomed.add_edges(&[Edge::new("e", "1", "2", "r")]).unwrap();
        drop(doomed);

        db.delete_graph("doomed").unwrap();
        // row count is back to what it was before the graph existed
        assert_eq!(kv.len(), rows_before);
        assert!(db.graph("doomed").is_err());
        assert!(keep.get_vertex("k", false).unwrap().is_some());

        let again = db.add_graph("doomed").unwrap();
        assert!(again.graph_key() > doomed_key);
        assert!(again.get_vertex("1", false).unwrap().is_none());
        assert!(db.delete_graph("nope").unwrap_err().is_not_found());
    }

    #[test]
    fn test_delete_graph_fences_concurrent_writer() {
        let kv = Arc::new(MemoryKv::new());
        let shared: Arc<dyn KvStore> = kv.clone();
        let db = GraphDb::open(DatabaseConfig::in_memory(), &shared_registry(shared)).unwrap();
        let rows_before = kv.len();

        let stale = db.add_graph("busy").unwrap();
        stale.add_vertices(&[Vertex::new("0", "Node")]).unwrap();
        let writer = std::thread::spawn(move || {
            let mut n = 1usize;
            loop {
                let id = n.to_string();
                if let Err(e) = stale.add_vertices(&[Vertex::new(id.as_str(), "Node")]) {
                    return e;
                }
                n += 1;
            }
        });
        std::thread::sleep(std::time::Duration::from_millis(20));
        db.delete_graph("busy").unwrap();

        let err = writer.join().unwrap();
        assert!(err.is_not_found());
        // nothing written through the old handle survives the delete
        assert_eq!(kv.len(), rows_before);
    }
}

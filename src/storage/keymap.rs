//! Identifier map
//!
//! Translates user-visible string ids and labels into dense surrogate keys
//! and back. Forward (`id -> key`) and reverse (`key -> id`) rows are
//! always written in the same batch.
//!
//! Keys come from a buffered counter: a block of `block_size` keys is
//! reserved by persisting the new high-water mark before any key of the
//! block is handed out. A crash wastes at most the unused tail of a block
//! and never reuses a key.

use super::keys::{
    decode_id_key, decode_u64, encode_counter_key, encode_id_key, encode_reverse_id_key,
    encode_u64, id_table_prefix, CounterKind, IdTable,
};
use super::kv::{KvStore, WriteBatch};
use super::{StorageError, StorageResult};
use crate::graph::{EdgeKey, GraphKey, LabelKey, VertexKey};
use std::sync::{Arc, Mutex};
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct KeyBlock {
    next: u64,
    limit: u64,
}

#[derive(Debug, Default)]
struct Counters {
    vertex: Option<KeyBlock>,
    edge: Option<KeyBlock>,
    label: Option<KeyBlock>,
}

impl Counters {
    fn slot(&mut self, kind: CounterKind) -> &mut Option<KeyBlock> {
        match kind {
            CounterKind::Vertex => &mut self.vertex,
            CounterKind::Edge => &mut self.edge,
            CounterKind::Label => &mut self.label,
        }
    }
}

/// Per-graph bidirectional id map
pub struct KeyMap {
    kv: Arc<dyn KvStore>,
    graph: GraphKey,
    block_size: u64,
    counters: Mutex<Counters>,
}

impl KeyMap {
    pub fn new(kv: Arc<dyn KvStore>, graph: GraphKey, block_size: u64) -> Self {
        Self {
            kv,
            graph,
            block_size: block_size.max(1),
            counters: Mutex::new(Counters::default()),
        }
    }

    pub fn graph(&self) -> GraphKey {
        self.graph
    }

    // Vertex ids

    pub fn get_or_create_vertex_key(&self, id: &str) -> StorageResult<VertexKey> {
        self.get_or_create(IdTable::Vertex, id).map(VertexKey)
    }

    pub fn get_vertex_key(&self, id: &str) -> StorageResult<Option<VertexKey>> {
        Ok(self.get_key(IdTable::Vertex, id)?.map(VertexKey))
    }

    pub fn get_vertex_id(&self, key: VertexKey) -> StorageResult<Option<String>> {
        self.get_id(IdTable::Vertex, key.0)
    }

    /// Reverse lookup for a key known to be mapped
    pub fn resolve_vertex_id(&self, key: VertexKey) -> StorageResult<String> {
        self.resolve(IdTable::Vertex, key.0)
    }

    // Edge ids

    pub fn get_or_create_edge_key(&self, id: &str) -> StorageResult<EdgeKey> {
        self.get_or_create(IdTable::Edge, id).map(EdgeKey)
    }

    pub fn get_edge_key(&self, id: &str) -> StorageResult<Option<EdgeKey>> {
        Ok(self.get_key(IdTable::Edge, id)?.map(EdgeKey))
    }

    pub fn get_edge_id(&self, key: EdgeKey) -> StorageResult<Option<String>> {
        self.get_id(IdTable::Edge, key.0)
    }

    pub fn resolve_edge_id(&self, key: EdgeKey) -> StorageResult<String> {
        self.resolve(IdTable::Edge, key.0)
    }

    // Labels

    pub fn get_or_create_label_key(&self, label: &str) -> StorageResult<LabelKey> {
        self.get_or_create(IdTable::Label, label).map(LabelKey)
    }

    pub fn get_label_key(&self, label: &str) -> StorageResult<Option<LabelKey>> {
        Ok(self.get_key(IdTable::Label, label)?.map(LabelKey))
    }

    pub fn get_label(&self, key: LabelKey) -> StorageResult<Option<String>> {
        self.get_id(IdTable::Label, key.0)
    }

    pub fn resolve_label(&self, key: LabelKey) -> StorageResult<String> {
        self.resolve(IdTable::Label, key.0)
    }

    /// Every label ever mapped in this graph, with its key, in name order
    pub fn labels(&self) -> StorageResult<Vec<(String, LabelKey)>> {
        let mut out = Vec::new();
        for pair in self.kv.scan_prefix(&id_table_prefix(IdTable::Label, self.graph)) {
            let (key, value) = pair?;
            let (_, label) = decode_id_key(IdTable::Label, &key)?;
            out.push((label, LabelKey(decode_u64("label map value", &value)?)));
        }
        Ok(out)
    }

    fn get_key(&self, table: IdTable, id: &str) -> StorageResult<Option<u64>> {
        match self.kv.get(&encode_id_key(table, self.graph, id))? {
            Some(raw) => Ok(Some(decode_u64("id map value", &raw)?)),
            None => Ok(None),
        }
    }

    fn get_id(&self, table: IdTable, key: u64) -> StorageResult<Option<String>> {
        match self.kv.get(&encode_reverse_id_key(table, self.graph, key))? {
            Some(raw) => String::from_utf8(raw).map(Some).map_err(|_| {
                StorageError::KeyCorruption(format!(
                    "{} reverse map for key {} is not UTF-8",
                    table.name(),
                    key
                ))
            }),
            None => Ok(None),
        }
    }

    fn resolve(&self, table: IdTable, key: u64) -> StorageResult<String> {
        self.get_id(table, key)?.ok_or_else(|| {
            StorageError::ConsistencyFault(format!(
                "{} key {} has no reverse mapping in graph {}",
                table.name(),
                key,
                self.graph.0
            ))
        })
    }

    fn get_or_create(&self, table: IdTable, id: &str) -> StorageResult<u64> {
        if let Some(key) = self.get_key(table, id)? {
            return Ok(key);
        }

        let mut counters = self
            .counters
            .lock()
            .map_err(|_| StorageError::ConsistencyFault("key counter lock poisoned".to_string()))?;

        // another writer may have won while we waited for the lock
        if let Some(key) = self.get_key(table, id)? {
            return Ok(key);
        }

        let key = self.allocate(&mut counters, table.counter())?;
        let mut batch = WriteBatch::new();
        batch.put(encode_id_key(table, self.graph, id), encode_u64(key));
        batch.put(
            encode_reverse_id_key(table, self.graph, key),
            id.as_bytes().to_vec(),
        );
        self.kv.write(batch)?;
        Ok(key)
    }

    fn allocate(&self, counters: &mut Counters, kind: CounterKind) -> StorageResult<u64> {
        let slot = counters.slot(kind);
        let mut block = match *slot {
            Some(block) if block.next < block.limit => block,
            _ => self.reserve_block(kind)?,
        };
        let key = block.next;
        block.next += 1;
        *slot = Some(block);
        Ok(key)
    }

    fn reserve_block(&self, kind: CounterKind) -> StorageResult<KeyBlock> {
        let counter_key = encode_counter_key(kind, self.graph);
        let high = match self.kv.get(&counter_key)? {
            Some(raw) => decode_u64("key counter", &raw)?,
            None => 0,
        };
        let limit = high.checked_add(self.block_size).ok_or_else(|| {
            StorageError::ConsistencyFault(format!("{:?} key space exhausted", kind))
        })?;
        self.kv.put(&counter_key, &encode_u64(limit))?;
        debug!(
            "Reserved {:?} keys [{}, {}) for graph {}",
            kind, high, limit, self.graph.0
        );
        Ok(KeyBlock { next: high, limit })
    }
}

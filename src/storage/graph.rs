//! Key-value backed graph adapter
//!
//! Rows written per element:
//!
//! - vertex: the vertex record (`label key ++ bincode payload`) and one
//!   vertex label index row
//! - edge: the edge record (bincode payload, endpoints and label in the
//!   key), a source-anchored and a destination-anchored adjacency row, and
//!   one edge label index row
//!
//! Every public mutation gathers its rows into a single `WriteBatch`, so a
//! reader sees either all rows of a change or none of them. Mutations also
//! hold the graph's writer lock from the first read of old state until the
//! batch is committed, so two writers never stage against the same stale
//! record.

use super::adapter::{Capabilities, ElementIter, GraphInterface, Neighbor};
use super::keymap::KeyMap;
use super::keys::{
    decode_adjacency_key, decode_edge_key, decode_edge_label_key, decode_vertex_key,
    decode_vertex_label_key, edge_prefix, encode_adjacency_label_prefix, encode_adjacency_prefix,
    encode_edge_key_prefix, encode_edge_label_key, encode_edge_label_prefix, encode_vertex_key,
    encode_vertex_label_key, encode_vertex_label_prefix, vertex_prefix, AdjacencyEntry,
    EdgeEntry, IndexSide,
};
use super::kv::{KvStore, WriteBatch};
use super::{StorageError, StorageResult};
use crate::cancel::Cancellation;
use crate::graph::{
    Direction, Edge, EdgeKey, Element, GraphKey, LabelKey, PropertyMap, Vertex, VertexKey,
};
use chrono::{SecondsFormat, Utc};
use rustc_hash::{FxHashMap, FxHashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tracing::debug;

const LABEL_HEADER: usize = 8;

/// Label restriction resolved against the identifier map
#[derive(Debug, Clone)]
enum LabelFilter {
    Any,
    /// Narrowed adjacency prefix
    Single(LabelKey),
    /// Unfiltered scan plus in-memory membership test
    Set(FxHashSet<LabelKey>),
    /// Labels were requested but none of them exist
    Nothing,
}

/// Rows staged earlier in the batch being built
#[derive(Default)]
struct Pending {
    vertices: FxHashMap<VertexKey, LabelKey>,
    edges: FxHashMap<EdgeKey, EdgeEntry>,
}

fn index_sides(direction: Direction) -> Vec<IndexSide> {
    let mut sides = Vec::with_capacity(2);
    if direction.includes_out() {
        sides.push(IndexSide::Source);
    }
    if direction.includes_in() {
        sides.push(IndexSide::Destination);
    }
    sides
}

fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn encode_vertex_value(label: LabelKey, data: &PropertyMap) -> StorageResult<Vec<u8>> {
    let payload = bincode::serialize(data)?;
    let mut value = Vec::with_capacity(LABEL_HEADER + payload.len());
    value.extend_from_slice(&label.0.to_be_bytes());
    value.extend_from_slice(&payload);
    Ok(value)
}

fn decode_vertex_label(value: &[u8]) -> StorageResult<LabelKey> {
    let header: [u8; LABEL_HEADER] = value
        .get(..LABEL_HEADER)
        .and_then(|raw| raw.try_into().ok())
        .ok_or_else(|| {
            StorageError::KeyCorruption(format!(
                "vertex record of {} bytes has no label header",
                value.len()
            ))
        })?;
    Ok(LabelKey(u64::from_be_bytes(header)))
}

fn decode_vertex_payload(value: &[u8]) -> StorageResult<PropertyMap> {
    Ok(bincode::deserialize(&value[LABEL_HEADER..])?)
}

/// Graph adapter over an ordered key-value store
pub struct KvGraph {
    name: String,
    graph: GraphKey,
    kv: Arc<dyn KvStore>,
    keymap: KeyMap,
    timestamp: RwLock<String>,
    writer: Mutex<()>,
    /// Set once the graph has been dropped from its database
    retired: AtomicBool,
}

impl fmt::Debug for KvGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KvGraph")
            .field("name", &self.name)
            .field("graph", &self.graph)
            .field("backend", &self.kv.backend_name())
            .finish()
    }
}

impl KvGraph {
    pub fn new(name: impl Into<String>, graph: GraphKey, kv: Arc<dyn KvStore>, key_block_size: u64) -> Self {
        let keymap = KeyMap::new(Arc::clone(&kv), graph, key_block_size);
        Self {
            name: name.into(),
            graph,
            kv,
            keymap,
            timestamp: RwLock::new(now_timestamp()),
            writer: Mutex::new(()),
            retired: AtomicBool::new(false),
        }
    }

    pub fn graph_key(&self) -> GraphKey {
        self.graph
    }

    pub fn keymap(&self) -> &KeyMap {
        &self.keymap
    }

    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::SeqCst)
    }

    /// Exclusive write access; fails once the graph has been retired
    fn lock_writer(&self) -> StorageResult<MutexGuard<'_, ()>> {
        let guard = self
            .writer
            .lock()
            .map_err(|_| StorageError::ConsistencyFault(format!("graph '{}' writer lock poisoned", self.name)))?;
        if self.is_retired() {
            return Err(StorageError::NotFound(format!("graph '{}' (deleted)", self.name)));
        }
        Ok(guard)
    }

    /// Refuse every later write and return the writer lock, held while the
    /// caller removes the graph's rows
    pub(crate) fn retire(&self) -> StorageResult<MutexGuard<'_, ()>> {
        let guard = self.lock_writer()?;
        self.retired.store(true, Ordering::SeqCst);
        Ok(guard)
    }

    fn touch(&self) {
        if let Ok(mut ts) = self.timestamp.write() {
            *ts = now_timestamp();
        }
    }

    fn commit(&self, batch: WriteBatch) -> StorageResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let rows = batch.len();
        self.kv.write(batch)?;
        self.touch();
        debug!("Graph '{}' committed {} rows", self.name, rows);
        Ok(())
    }

    fn vertex_exists(&self, key: VertexKey, pending: &Pending) -> StorageResult<bool> {
        if pending.vertices.contains_key(&key) {
            return Ok(true);
        }
        self.kv.contains(&encode_vertex_key(self.graph, key))
    }

    fn stage_vertex(&self, batch: &mut WriteBatch, pending: &mut Pending, vertex: &Vertex) -> StorageResult<()> {
        if vertex.id.is_empty() {
            return Err(StorageError::InvalidElement("vertex id is empty".to_string()));
        }
        if vertex.label.is_empty() {
            return Err(StorageError::InvalidElement(format!(
                "vertex '{}' has no label",
                vertex.id
            )));
        }
        let vkey = self.keymap.get_or_create_vertex_key(&vertex.id)?;
        let lkey = self.keymap.get_or_create_label_key(&vertex.label)?;
        let record_key = encode_vertex_key(self.graph, vkey);

        let previous = match pending.vertices.get(&vkey) {
            Some(label) => Some(*label),
            None => match self.kv.get(&record_key)? {
                Some(value) => Some(decode_vertex_label(&value)?),
                None => None,
            },
        };
        if let Some(old_label) = previous {
            if old_label != lkey {
                batch.delete(encode_vertex_label_key(self.graph, old_label, vkey));
            }
        }

        batch.put(record_key, encode_vertex_value(lkey, &vertex.data)?);
        batch.put(encode_vertex_label_key(self.graph, lkey, vkey), Vec::new());
        pending.vertices.insert(vkey, lkey);
        Ok(())
    }

    fn stage_edge(&self, batch: &mut WriteBatch, pending: &mut Pending, edge: &Edge) -> StorageResult<()> {
        if edge.id.is_empty() {
            return Err(StorageError::InvalidElement("edge id is empty".to_string()));
        }
        if edge.label.is_empty() {
            return Err(StorageError::InvalidElement(format!(
                "edge '{}' has no label",
                edge.id
            )));
        }
        let src = self.endpoint(&edge.id, &edge.from, pending)?;
        let dst = self.endpoint(&edge.id, &edge.to, pending)?;
        let ekey = self.keymap.get_or_create_edge_key(&edge.id)?;
        let lkey = self.keymap.get_or_create_label_key(&edge.label)?;
        let entry = EdgeEntry {
            graph: self.graph,
            edge: ekey,
            src,
            dst,
            label: lkey,
        };

        let previous = match pending.edges.get(&ekey) {
            Some(old) => Some(*old),
            None => self.find_edge_entry(ekey)?.map(|(old, _)| old),
        };
        if let Some(old) = previous {
            if old != entry {
                self.stage_edge_removal(batch, &old);
            }
        }

        batch.put(entry.encode(), bincode::serialize(&edge.data)?);
        for row in entry.adjacency_rows() {
            batch.put(row.encode(), Vec::new());
        }
        batch.put(encode_edge_label_key(self.graph, lkey, ekey), Vec::new());
        pending.edges.insert(ekey, entry);
        Ok(())
    }

    fn endpoint(&self, edge_id: &str, vertex_id: &str, pending: &Pending) -> StorageResult<VertexKey> {
        let missing = || {
            StorageError::NotFound(format!(
                "edge '{}' references missing vertex '{}'",
                edge_id, vertex_id
            ))
        };
        let key = self.keymap.get_vertex_key(vertex_id)?.ok_or_else(missing)?;
        if !self.vertex_exists(key, pending)? {
            return Err(missing());
        }
        Ok(key)
    }

    /// Index rows first, then the record itself
    fn stage_edge_removal(&self, batch: &mut WriteBatch, entry: &EdgeEntry) {
        for row in entry.adjacency_rows() {
            batch.delete(row.encode());
        }
        batch.delete(encode_edge_label_key(self.graph, entry.label, entry.edge));
        batch.delete(entry.encode());
    }

    fn find_edge_entry(&self, key: EdgeKey) -> StorageResult<Option<(EdgeEntry, Vec<u8>)>> {
        let prefix = encode_edge_key_prefix(self.graph, key);
        match self.kv.scan_prefix(&prefix).next() {
            Some(pair) => {
                let (raw_key, value) = pair?;
                Ok(Some((decode_edge_key(&raw_key)?, value)))
            }
            None => Ok(None),
        }
    }

    fn build_vertex(&self, key: VertexKey, value: &[u8], load: bool) -> StorageResult<Vertex> {
        let id = self.keymap.resolve_vertex_id(key)?;
        let label = self.keymap.resolve_label(decode_vertex_label(value)?)?;
        let data = if load {
            decode_vertex_payload(value)?
        } else {
            PropertyMap::new()
        };
        Ok(Vertex { id, label, data })
    }

    fn vertex_by_key(&self, key: VertexKey, load: bool) -> StorageResult<Option<Vertex>> {
        match self.kv.get(&encode_vertex_key(self.graph, key))? {
            Some(value) => self.build_vertex(key, &value, load).map(Some),
            None => Ok(None),
        }
    }

    fn build_edge(&self, entry: &EdgeEntry, value: &[u8], load: bool) -> StorageResult<Edge> {
        let data = if load {
            bincode::deserialize(value)?
        } else {
            PropertyMap::new()
        };
        Ok(Edge {
            id: self.keymap.resolve_edge_id(entry.edge)?,
            label: self.keymap.resolve_label(entry.label)?,
            from: self.keymap.resolve_vertex_id(entry.src)?,
            to: self.keymap.resolve_vertex_id(entry.dst)?,
            data,
        })
    }

    /// Edge reached through an adjacency row; `None` if the record is gone
    fn edge_from_row(&self, row: &AdjacencyEntry, load: bool) -> StorageResult<Option<Edge>> {
        let entry = EdgeEntry {
            graph: row.graph,
            edge: row.edge,
            src: row.src(),
            dst: row.dst(),
            label: row.label,
        };
        if !load {
            return self.build_edge(&entry, &[], false).map(Some);
        }
        match self.kv.get(&entry.encode())? {
            Some(value) => self.build_edge(&entry, &value, true).map(Some),
            None => Ok(None),
        }
    }

    fn label_filter(&self, labels: &[String]) -> StorageResult<LabelFilter> {
        if labels.is_empty() {
            return Ok(LabelFilter::Any);
        }
        let mut keys = FxHashSet::default();
        for label in labels {
            if let Some(key) = self.keymap.get_label_key(label)? {
                keys.insert(key);
            }
        }
        Ok(match keys.len() {
            0 => LabelFilter::Nothing,
            1 if labels.len() == 1 => match keys.into_iter().next() {
                Some(key) => LabelFilter::Single(key),
                None => LabelFilter::Nothing,
            },
            _ => LabelFilter::Set(keys),
        })
    }

    /// Adjacency rows anchored on one requested vertex
    fn adjacency_rows<'a>(
        &'a self,
        side: IndexSide,
        id: &str,
        filter: &LabelFilter,
        cancel: &Cancellation,
    ) -> ElementIter<'a, AdjacencyEntry> {
        let anchor = match self.keymap.get_vertex_key(id) {
            Ok(Some(key)) => key,
            Ok(None) => return Box::new(std::iter::empty()),
            Err(e) => return Box::new(std::iter::once(Err(e))),
        };
        let (prefix, allowed) = match filter {
            LabelFilter::Any => (encode_adjacency_prefix(side, self.graph, anchor), None),
            LabelFilter::Single(label) => (
                encode_adjacency_label_prefix(side, self.graph, anchor, *label),
                None,
            ),
            LabelFilter::Set(labels) => (
                encode_adjacency_prefix(side, self.graph, anchor),
                Some(labels.clone()),
            ),
            LabelFilter::Nothing => return Box::new(std::iter::empty()),
        };
        let cancel = cancel.clone();
        Box::new(
            self.kv
                .scan_prefix(&prefix)
                .take_while(move |_| !cancel.is_cancelled())
                .filter_map(move |pair| {
                    let entry = match pair
                        .and_then(|(key, _)| decode_adjacency_key(side, &key).map_err(Into::into))
                    {
                        Ok(entry) => entry,
                        Err(e) => return Some(Err(e)),
                    };
                    match &allowed {
                        Some(set) if !set.contains(&entry.label) => None,
                        _ => Some(Ok(entry)),
                    }
                }),
        )
    }

    fn labels_with_rows(&self, prefix_of: impl Fn(LabelKey) -> Vec<u8>) -> StorageResult<Vec<String>> {
        let mut labels = Vec::new();
        for (label, key) in self.keymap.labels()? {
            if let Some(row) = self.kv.scan_prefix(&prefix_of(key)).next() {
                row?;
                labels.push(label);
            }
        }
        Ok(labels)
    }
}

impl GraphInterface for KvGraph {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities { label_index: true }
    }

    fn get_timestamp(&self) -> String {
        self.timestamp
            .read()
            .map(|ts| ts.clone())
            .unwrap_or_else(|_| now_timestamp())
    }

    fn add_vertices(&self, vertices: &[Vertex]) -> StorageResult<()> {
        let _writer = self.lock_writer()?;
        let mut batch = WriteBatch::new();
        let mut pending = Pending::default();
        for vertex in vertices {
            self.stage_vertex(&mut batch, &mut pending, vertex)?;
        }
        self.commit(batch)
    }

    fn add_edges(&self, edges: &[Edge]) -> StorageResult<()> {
        let _writer = self.lock_writer()?;
        let mut batch = WriteBatch::new();
        let mut pending = Pending::default();
        for edge in edges {
            self.stage_edge(&mut batch, &mut pending, edge)?;
        }
        self.commit(batch)
    }

    fn bulk_add(&self, elements: &[Element]) -> StorageResult<()> {
        let _writer = self.lock_writer()?;
        let mut batch = WriteBatch::new();
        let mut pending = Pending::default();
        for element in elements {
            match element {
                Element::Vertex(vertex) => self.stage_vertex(&mut batch, &mut pending, vertex)?,
                Element::Edge(edge) => self.stage_edge(&mut batch, &mut pending, edge)?,
            }
        }
        debug!(
            "Bulk load into '{}': {} vertices, {} edges",
            self.name,
            pending.vertices.len(),
            pending.edges.len()
        );
        self.commit(batch)
    }

    fn delete_vertex(&self, id: &str) -> StorageResult<()> {
        let not_found = || StorageError::NotFound(format!("vertex '{}'", id));
        let _writer = self.lock_writer()?;
        let vkey = self.keymap.get_vertex_key(id)?.ok_or_else(not_found)?;
        let record_key = encode_vertex_key(self.graph, vkey);
        let value = self.kv.get(&record_key)?.ok_or_else(not_found)?;
        let label = decode_vertex_label(&value)?;

        // derive the incident edge list before touching anything
        let mut incident: FxHashMap<EdgeKey, EdgeEntry> = FxHashMap::default();
        for side in [IndexSide::Source, IndexSide::Destination] {
            let prefix = encode_adjacency_prefix(side, self.graph, vkey);
            for pair in self.kv.scan_prefix(&prefix) {
                let (key, _) = pair?;
                let row = decode_adjacency_key(side, &key)?;
                incident.entry(row.edge).or_insert(EdgeEntry {
                    graph: self.graph,
                    edge: row.edge,
                    src: row.src(),
                    dst: row.dst(),
                    label: row.label,
                });
            }
        }

        let mut batch = WriteBatch::new();
        for entry in incident.values() {
            self.stage_edge_removal(&mut batch, entry);
        }
        batch.delete(encode_vertex_label_key(self.graph, label, vkey));
        batch.delete(record_key);

        debug!(
            "Deleting vertex '{}' from '{}' with {} incident edges",
            id,
            self.name,
            incident.len()
        );
        self.commit(batch)
    }

    fn delete_edge(&self, id: &str) -> StorageResult<()> {
        let not_found = || StorageError::NotFound(format!("edge '{}'", id));
        let _writer = self.lock_writer()?;
        let ekey = self.keymap.get_edge_key(id)?.ok_or_else(not_found)?;
        let (entry, _) = self.find_edge_entry(ekey)?.ok_or_else(not_found)?;
        let mut batch = WriteBatch::new();
        self.stage_edge_removal(&mut batch, &entry);
        self.commit(batch)
    }

    fn get_vertex(&self, id: &str, load: bool) -> StorageResult<Option<Vertex>> {
        match self.keymap.get_vertex_key(id)? {
            Some(key) => self.vertex_by_key(key, load),
            None => Ok(None),
        }
    }

    fn get_edge(&self, id: &str, load: bool) -> StorageResult<Option<Edge>> {
        let key = match self.keymap.get_edge_key(id)? {
            Some(key) => key,
            None => return Ok(None),
        };
        match self.find_edge_entry(key)? {
            Some((entry, value)) => self.build_edge(&entry, &value, load).map(Some),
            None => Ok(None),
        }
    }

    fn scan_vertices<'a>(&'a self, load: bool, cancel: &Cancellation) -> ElementIter<'a, Vertex> {
        let cancel = cancel.clone();
        Box::new(
            self.kv
                .scan_prefix(&vertex_prefix(self.graph))
                .take_while(move |_| !cancel.is_cancelled())
                .map(move |pair| {
                    let (key, value) = pair?;
                    let (_, vkey) = decode_vertex_key(&key)?;
                    self.build_vertex(vkey, &value, load)
                }),
        )
    }

    fn scan_edges<'a>(&'a self, load: bool, cancel: &Cancellation) -> ElementIter<'a, Edge> {
        let cancel = cancel.clone();
        Box::new(
            self.kv
                .scan_prefix(&edge_prefix(self.graph))
                .take_while(move |_| !cancel.is_cancelled())
                .map(move |pair| {
                    let (key, value) = pair?;
                    let entry = decode_edge_key(&key)?;
                    self.build_edge(&entry, &value, load)
                }),
        )
    }

    fn scan_vertex_ids_by_label<'a>(
        &'a self,
        label: &str,
        cancel: &Cancellation,
    ) -> ElementIter<'a, String> {
        let lkey = match self.keymap.get_label_key(label) {
            Ok(Some(key)) => key,
            Ok(None) => return Box::new(std::iter::empty()),
            Err(e) => return Box::new(std::iter::once(Err(e))),
        };
        let cancel = cancel.clone();
        Box::new(
            self.kv
                .scan_prefix(&encode_vertex_label_prefix(self.graph, lkey))
                .take_while(move |_| !cancel.is_cancelled())
                .map(move |pair| {
                    let (key, _) = pair?;
                    let (_, _, vkey) = decode_vertex_label_key(&key)?;
                    self.keymap.resolve_vertex_id(vkey)
                }),
        )
    }

    fn scan_edge_ids_by_label<'a>(
        &'a self,
        label: &str,
        cancel: &Cancellation,
    ) -> ElementIter<'a, String> {
        let lkey = match self.keymap.get_label_key(label) {
            Ok(Some(key)) => key,
            Ok(None) => return Box::new(std::iter::empty()),
            Err(e) => return Box::new(std::iter::once(Err(e))),
        };
        let cancel = cancel.clone();
        Box::new(
            self.kv
                .scan_prefix(&encode_edge_label_prefix(self.graph, lkey))
                .take_while(move |_| !cancel.is_cancelled())
                .map(move |pair| {
                    let (key, _) = pair?;
                    let (_, _, ekey) = decode_edge_label_key(&key)?;
                    self.keymap.resolve_edge_id(ekey)
                }),
        )
    }

    fn lookup_neighbors<'a>(
        &'a self,
        direction: Direction,
        ids: &'a [String],
        labels: &[String],
        load: bool,
        cancel: &Cancellation,
    ) -> ElementIter<'a, Neighbor<Vertex>> {
        let filter = match self.label_filter(labels) {
            Ok(filter) => Arc::new(filter),
            Err(e) => return Box::new(std::iter::once(Err(e))),
        };
        let cancel = cancel.clone();
        Box::new(index_sides(direction).into_iter().flat_map(move |side| {
            let filter = Arc::clone(&filter);
            let cancel = cancel.clone();
            ids.iter().flat_map(move |id| {
                self.adjacency_rows(side, id, &filter, &cancel)
                    .filter_map(move |row| {
                        match row.and_then(|entry| self.vertex_by_key(entry.other, load)) {
                            Ok(Some(vertex)) => Some(Ok(Neighbor {
                                request: id.clone(),
                                element: vertex,
                            })),
                            Ok(None) => None,
                            Err(e) => Some(Err(e)),
                        }
                    })
            })
        }))
    }

    fn lookup_incident_edges<'a>(
        &'a self,
        direction: Direction,
        ids: &'a [String],
        labels: &[String],
        load: bool,
        cancel: &Cancellation,
    ) -> ElementIter<'a, Neighbor<Edge>> {
        let filter = match self.label_filter(labels) {
            Ok(filter) => Arc::new(filter),
            Err(e) => return Box::new(std::iter::once(Err(e))),
        };
        let cancel = cancel.clone();
        Box::new(index_sides(direction).into_iter().flat_map(move |side| {
            let filter = Arc::clone(&filter);
            let cancel = cancel.clone();
            ids.iter().flat_map(move |id| {
                self.adjacency_rows(side, id, &filter, &cancel)
                    .filter_map(move |row| {
                        match row.and_then(|entry| self.edge_from_row(&entry, load)) {
                            Ok(Some(edge)) => Some(Ok(Neighbor {
                                request: id.clone(),
                                element: edge,
                            })),
                            Ok(None) => None,
                            Err(e) => Some(Err(e)),
                        }
                    })
            })
        }))
    }

    fn list_vertex_labels(&self) -> StorageResult<Vec<String>> {
        self.labels_with_rows(|label| encode_vertex_label_prefix(self.graph, label))
    }

    fn list_edge_labels(&self) -> StorageResult<Vec<String>> {
        self.labels_with_rows(|label| encode_edge_label_prefix(self.graph, label))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::keys::SOURCE_ADJ_TAG;
    use crate::storage::kv::MemoryKv;

    fn sample_graph() -> (Arc<dyn KvStore>, KvGraph) {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
        let graph = KvGraph::new("test", GraphKey(1), Arc::clone(&kv), 100);
        graph
            .add_vertices(&[
                Vertex::new("1", "Person").with_property("name", "Alex"),
                Vertex::new("2", "Person").with_property("name", "Kyle"),
                Vertex::new("3", "Robot").with_property("name", "Bender"),
            ])
            .unwrap();
        graph
            .add_edges(&[
                Edge::new("e13", "1", "3", "knows"),
                Edge::new("e12", "1", "2", "likes"),
                Edge::new("e21", "2", "1", "knows").with_property("weight", 0.5),
            ])
            .unwrap();
        (kv, graph)
    }

    fn neighbor_ids(graph: &KvGraph, direction: Direction, id: &str, labels: &[&str]) -> Vec<String> {
        let ids = vec![id.to_string()];
        let labels: Vec<String> = labels.iter().map(|s| s.to_string()).collect();
        let mut out: Vec<String> = graph
            .lookup_neighbors(direction, &ids, &labels, false, &Cancellation::new())
            .map(|n| n.unwrap().element.id)
            .collect();
        out.sort();
        out
    }

    #[test]
    fn test_get_vertex_with_and_without_data() {
        let (_, graph) = sample_graph();
        let full = graph.get_vertex("1", true).unwrap().unwrap();
        assert_eq!(full.label, "Person");
        assert_eq!(full.data.get("name").and_then(|v| v.as_string()), Some("Alex"));

        let light = graph.get_vertex("1", false).unwrap().unwrap();
        assert_eq!(light.label, "Person");
        assert!(light.data.is_empty());

        assert!(graph.get_vertex("404", true).unwrap().is_none());
    }

    #[test]
    fn test_get_edge() {
        let (_, graph) = sample_graph();
        let edge = graph.get_edge("e21", true).unwrap().unwrap();
        assert_eq!((edge.from.as_str(), edge.to.as_str()), ("2", "1"));
        assert_eq!(edge.label, "knows");
        assert!(edge.data.contains_key("weight"));
        assert!(graph.get_edge("missing", false).unwrap().is_none());
    }

    #[test]
    fn test_neighbor_directions_and_labels() {
        let (_, graph) = sample_graph();
        assert_eq!(neighbor_ids(&graph, Direction::Out, "1", &[]), vec!["2", "3"]);
        assert_eq!(neighbor_ids(&graph, Direction::Out, "1", &["knows"]), vec!["3"]);
        assert_eq!(neighbor_ids(&graph, Direction::In, "1", &[]), vec!["2"]);
        assert_eq!(neighbor_ids(&graph, Direction::Both, "1", &["knows"]), vec!["2", "3"]);
        assert_eq!(
            neighbor_ids(&graph, Direction::Out, "1", &["knows", "likes"]),
            vec!["2", "3"]
        );
        assert!(neighbor_ids(&graph, Direction::Out, "1", &["unknown"]).is_empty());
        assert!(neighbor_ids(&graph, Direction::Out, "nobody", &[]).is_empty());
    }

    #[test]
    fn test_both_is_out_then_in() {
        let (_, graph) = sample_graph();
        let ids = vec!["2".to_string()];
        let order: Vec<String> = graph
            .lookup_neighbors(Direction::Both, &ids, &[], false, &Cancellation::new())
            .map(|n| n.unwrap().element.id)
            .collect();
        // 2 -> 1 (out) comes before 1 -> 2 (in)
        assert_eq!(order, vec!["1", "1"]);
        let edges: Vec<String> = graph
            .lookup_incident_edges(Direction::Both, &ids, &[], false, &Cancellation::new())
            .map(|n| n.unwrap().element.id)
            .collect();
        assert_eq!(edges, vec!["e21", "e12"]);
    }

    #[test]
    fn test_label_index_scan() {
        let (_, graph) = sample_graph();
        let cancel = Cancellation::new();
        let mut people: Vec<String> = graph
            .scan_vertex_ids_by_label("Person", &cancel)
            .map(Result::unwrap)
            .collect();
        people.sort();
        assert_eq!(people, vec!["1", "2"]);
        assert_eq!(graph.scan_vertex_ids_by_label("Ghost", &cancel).count(), 0);
        assert_eq!(graph.scan_edge_ids_by_label("knows", &cancel).count(), 2);
        assert_eq!(graph.list_vertex_labels().unwrap(), vec!["Person", "Robot"]);
        assert_eq!(graph.list_edge_labels().unwrap(), vec!["knows", "likes"]);
    }

    #[test]
    fn test_replace_vertex_moves_label_index() {
        let (_, graph) = sample_graph();
        graph.add_vertices(&[Vertex::new("3", "Person")]).unwrap();
        let cancel = Cancellation::new();
        assert_eq!(graph.scan_vertex_ids_by_label("Robot", &cancel).count(), 0);
        assert_eq!(graph.scan_vertex_ids_by_label("Person", &cancel).count(), 3);
        // label mapping outlives its last element
        assert!(graph.keymap().get_label_key("Robot").unwrap().is_some());
    }

    #[test]
    fn test_replace_edge_drops_stale_adjacency() {
        let (_, graph) = sample_graph();
        graph.add_edges(&[Edge::new("e13", "2", "3", "knows")]).unwrap();
        assert_eq!(neighbor_ids(&graph, Direction::Out, "1", &["knows"]), Vec::<String>::new());
        assert_eq!(neighbor_ids(&graph, Direction::Out, "2", &[]), vec!["1", "3"]);
    }

    #[test]
    fn test_edge_requires_endpoints() {
        let (_, graph) = sample_graph();
        let err = graph.add_edges(&[Edge::new("bad", "1", "99", "knows")]).unwrap_err();
        assert!(err.is_not_found());
        assert!(graph.get_edge("bad", false).unwrap().is_none());
    }

    #[test]
    fn test_bulk_add_resolves_vertices_in_same_batch() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
        let graph = KvGraph::new("bulk", GraphKey(2), kv, 10);
        graph
            .bulk_add(&[
                Vertex::new("a", "Node").into(),
                Vertex::new("b", "Node").into(),
                Edge::new("ab", "a", "b", "link").into(),
            ])
            .unwrap();
        assert_eq!(neighbor_ids(&graph, Direction::Out, "a", &[]), vec!["b"]);
    }

    #[test]
    fn test_delete_vertex_cascades() {
        let (kv, graph) = sample_graph();
        graph.add_edges(&[Edge::new("loop", "1", "1", "self")]).unwrap();
        graph.delete_vertex("1").unwrap();

        assert!(graph.get_vertex("1", false).unwrap().is_none());
        assert!(graph.get_edge("e13", false).unwrap().is_none());
        assert!(graph.get_edge("loop", false).unwrap().is_none());
        assert!(neighbor_ids(&graph, Direction::In, "3", &[]).is_empty());
        assert!(neighbor_ids(&graph, Direction::Both, "2", &[]).is_empty());

        let vkey = graph.keymap().get_vertex_key("1").unwrap().unwrap();
        for side in [IndexSide::Source, IndexSide::Destination] {
            let prefix = encode_adjacency_prefix(side, GraphKey(1), vkey);
            assert_eq!(kv.scan_prefix(&prefix).count(), 0);
        }
        // no row anywhere still points at the deleted vertex
        let remaining: Vec<AdjacencyEntry> = kv
            .scan_prefix(&[SOURCE_ADJ_TAG])
            .map(|r| decode_adjacency_key(IndexSide::Source, &r.unwrap().0).unwrap())
            .collect();
        assert!(remaining.iter().all(|row| row.anchor != vkey && row.other != vkey));

        assert!(graph.delete_vertex("1").unwrap_err().is_not_found());
    }

    #[test]
    fn test_delete_edge() {
        let (_, graph) = sample_graph();
        graph.delete_edge("e13").unwrap();
        assert!(neighbor_ids(&graph, Direction::Out, "1", &["knows"]).is_empty());
        assert_eq!(graph.scan_edges(false, &Cancellation::new()).count(), 2);
        assert!(graph.delete_edge("e13").unwrap_err().is_not_found());
    }

    #[test]
    fn test_scan_stops_on_cancellation() {
        let (_, graph) = sample_graph();
        let cancel = Cancellation::new();
        let mut scan = graph.scan_vertices(true, &cancel);
        assert!(scan.next().is_some());
        cancel.cancel();
        assert!(scan.next().is_none());
    }

    #[test]
    fn test_corrupt_vertex_key_surfaces() {
        let (kv, graph) = sample_graph();
        let mut bad = vertex_prefix(GraphKey(1));
        bad.extend_from_slice(&[0xff, 0xff, 0xff]);
        kv.put(&bad, b"junk").unwrap();
        let results: Vec<_> = graph.scan_vertices(false, &Cancellation::new()).collect();
        let err = results.into_iter().find_map(Result::err).unwrap();
        assert!(matches!(err, StorageError::KeyCorruption(_)));
    }

    #[test]
    fn test_concurrent_relabel_keeps_one_index_row() {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
        let graph = Arc::new(KvGraph::new("race", GraphKey(3), kv, 10));
        graph.add_vertices(&[Vertex::new("v", "L0")]).unwrap();

        let writers: Vec<_> = (0..4)
            .map(|t| {
                let graph = Arc::clone(&graph);
                std::thread::spawn(move || {
                    for round in 0..200 {
                        let label = format!("L{}", (t + round) % 3);
                        graph.add_vertices(&[Vertex::new("v", label.as_str())]).unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let cancel = Cancellation::new();
        let mut indexed = Vec::new();
        for label in ["L0", "L1", "L2"] {
            for _ in graph.scan_vertex_ids_by_label(label, &cancel) {
                indexed.push(label);
            }
        }
        let stored = graph.get_vertex("v", false).unwrap().unwrap();
        assert_eq!(indexed, vec![stored.label.as_str()]);
    }

    #[test]
    fn test_retired_graph_rejects_writes() {
        let (_, graph) = sample_graph();
        drop(graph.retire().unwrap());
        assert!(graph.is_retired());
        assert!(graph.add_vertices(&[Vertex::new("9", "Person")]).unwrap_err().is_not_found());
        assert!(graph.delete_edge("e13").unwrap_err().is_not_found());
        // reads are untouched until the rows are removed
        assert!(graph.get_vertex("1", false).unwrap().is_some());
    }

    #[test]
    fn test_timestamp_changes_on_write() {
        let (_, graph) = sample_graph();
        let before = graph.get_timestamp();
        std::thread::sleep(std::time::Duration::from_millis(2));
        graph.add_vertices(&[Vertex::new("4", "Person")]).unwrap();
        assert_ne!(before, graph.get_timestamp());
    }
}

//! Graph adapter interface
//!
//! The query engine only talks to graphs through `GraphInterface`. Scans are
//! lazy and poll the caller's cancellation token between rows; a fresh call
//! is the only way to restart one.

use super::StorageResult;
use crate::cancel::Cancellation;
use crate::graph::{Direction, Edge, Element, Vertex};

/// Lazy sequence of storage results
pub type ElementIter<'a, T> = Box<dyn Iterator<Item = StorageResult<T>> + 'a>;

/// Optional primitives a backend exposes to the compiler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// `scan_vertex_ids_by_label` / `scan_edge_ids_by_label` hit an index
    pub label_index: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self { label_index: true }
    }
}

/// One element reached from a requested vertex id
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor<T> {
    /// The requesting vertex id this result belongs to
    pub request: String,
    pub element: T,
}

pub trait GraphInterface: Send + Sync {
    /// Graph name
    fn name(&self) -> &str;

    fn capabilities(&self) -> Capabilities;

    /// Timestamp of the last successful write, RFC 3339
    fn get_timestamp(&self) -> String;

    /// Insert or fully replace a batch of vertices
    fn add_vertices(&self, vertices: &[Vertex]) -> StorageResult<()>;

    /// Insert or fully replace a batch of edges
    fn add_edges(&self, edges: &[Edge]) -> StorageResult<()>;

    /// Mixed vertex/edge load applied as one batch, in order
    fn bulk_add(&self, elements: &[Element]) -> StorageResult<()>;

    /// Delete a vertex together with every incident edge
    fn delete_vertex(&self, id: &str) -> StorageResult<()>;

    fn delete_edge(&self, id: &str) -> StorageResult<()>;

    /// `load = false` returns id and label with an empty payload
    fn get_vertex(&self, id: &str, load: bool) -> StorageResult<Option<Vertex>>;

    fn get_edge(&self, id: &str, load: bool) -> StorageResult<Option<Edge>>;

    fn scan_vertices<'a>(&'a self, load: bool, cancel: &Cancellation) -> ElementIter<'a, Vertex>;

    fn scan_edges<'a>(&'a self, load: bool, cancel: &Cancellation) -> ElementIter<'a, Edge>;

    fn scan_vertex_ids_by_label<'a>(
        &'a self,
        label: &str,
        cancel: &Cancellation,
    ) -> ElementIter<'a, String>;

    fn scan_edge_ids_by_label<'a>(
        &'a self,
        label: &str,
        cancel: &Cancellation,
    ) -> ElementIter<'a, String>;

    /// Adjacent vertices of every requested id.
    ///
    /// `Both` yields the out stream followed by the in stream. Empty `labels`
    /// means any label.
    fn lookup_neighbors<'a>(
        &'a self,
        direction: Direction,
        ids: &'a [String],
        labels: &[String],
        load: bool,
        cancel: &Cancellation,
    ) -> ElementIter<'a, Neighbor<Vertex>>;

    /// Incident edges of every requested id, with the same ordering rules
    fn lookup_incident_edges<'a>(
        &'a self,
        direction: Direction,
        ids: &'a [String],
        labels: &[String],
        load: bool,
        cancel: &Cancellation,
    ) -> ElementIter<'a, Neighbor<Edge>>;

    /// Labels carried by at least one vertex
    fn list_vertex_labels(&self) -> StorageResult<Vec<String>>;

    /// Labels carried by at least one edge
    fn list_edge_labels(&self) -> StorageResult<Vec<String>>;
}

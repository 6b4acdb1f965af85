use std::sync::Arc;
use std::time::Duration;
use trellis::graph::Direction;
use trellis::query::{run, Compiler};
use trellis::storage::adapter::{Capabilities, ElementIter, Neighbor};
use trellis::storage::keys::vertex_prefix;
use trellis::{
    Cancellation, DatabaseConfig, Edge, Element, ExecutionError, ExecutionResult, GraphDb,
    GraphInterface, KvGraph, KvStore, MemoryKv, Query, QueryResult, StorageError, StorageRegistry,
    StorageResult, Vertex,
};

/// Delegates to a real graph but fails every adjacency lookup
struct FlakyGraph {
    inner: KvGraph,
}

impl GraphInterface for FlakyGraph {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities { label_index: false }
    }

    fn get_timestamp(&self) -> String {
        self.inner.get_timestamp()
    }

    fn add_vertices(&self, vertices: &[Vertex]) -> StorageResult<()> {
        self.inner.add_vertices(vertices)
    }

    fn add_edges(&self, edges: &[Edge]) -> StorageResult<()> {
        self.inner.add_edges(edges)
    }

    fn bulk_add(&self, elements: &[Element]) -> StorageResult<()> {
        self.inner.bulk_add(elements)
    }

    fn delete_vertex(&self, id: &str) -> StorageResult<()> {
        self.inner.delete_vertex(id)
    }

    fn delete_edge(&self, id: &str) -> StorageResult<()> {
        self.inner.delete_edge(id)
    }

    fn get_vertex(&self, id: &str, load: bool) -> StorageResult<Option<Vertex>> {
        self.inner.get_vertex(id, load)
    }

    fn get_edge(&self, id: &str, load: bool) -> StorageResult<Option<Edge>> {
        self.inner.get_edge(id, load)
    }

    fn scan_vertices<'a>(&'a self, load: bool, cancel: &Cancellation) -> ElementIter<'a, Vertex> {
        self.inner.scan_vertices(load, cancel)
    }

    fn scan_edges<'a>(&'a self, load: bool, cancel: &Cancellation) -> ElementIter<'a, Edge> {
        self.inner.scan_edges(load, cancel)
    }

    fn scan_vertex_ids_by_label<'a>(&'a self, label: &str, cancel: &Cancellation) -> ElementIter<'a, String> {
        self.inner.scan_vertex_ids_by_label(label, cancel)
    }

    fn scan_edge_ids_by_label<'a>(&'a self, label: &str, cancel: &Cancellation) -> ElementIter<'a, String> {
        self.inner.scan_edge_ids_by_label(label, cancel)
    }

    fn lookup_neighbors<'a>(
        &'a self,
        _direction: Direction,
        _ids: &'a [String],
        _labels: &[String],
        _load: bool,
        _cancel: &Cancellation,
    ) -> ElementIter<'a, Neighbor<Vertex>> {
        Box::new(std::iter::once(Err(StorageError::BackendUnavailable(
            "adjacency store offline".to_string(),
        ))))
    }

    fn lookup_incident_edges<'a>(
        &'a self,
        direction: Direction,
        ids: &'a [String],
        labels: &[String],
        load: bool,
        cancel: &Cancellation,
    ) -> ElementIter<'a, Neighbor<Edge>> {
        self.inner.lookup_incident_edges(direction, ids, labels, load, cancel)
    }

    fn list_vertex_labels(&self) -> StorageResult<Vec<String>> {
        self.inner.list_vertex_labels()
    }

    fn list_edge_labels(&self) -> StorageResult<Vec<String>> {
        self.inner.list_edge_labels()
    }
}

fn flaky() -> Arc<dyn GraphInterface> {
    let inner = KvGraph::new("flaky", trellis::GraphKey(1), Arc::new(MemoryKv::new()), 16);
    inner
        .add_vertices(&[Vertex::new("1", "Person"), Vertex::new("2", "Person")])
        .unwrap();
    inner.add_edges(&[Edge::new("e", "1", "2", "knows")]).unwrap();
    Arc::new(FlakyGraph { inner })
}

async fn collect(graph: Arc<dyn GraphInterface>, query: Query) -> Vec<ExecutionResult<QueryResult>> {
    let pipeline = Compiler::new(graph).compile(query.statements()).unwrap();
    let workdir = tempfile::tempdir().unwrap();
    let running = run(&Cancellation::new(), Arc::new(pipeline), workdir.path());
    tokio::time::timeout(Duration::from_secs(10), running.collect_results())
        .await
        .expect("pipeline finished")
}

#[tokio::test]
async fn test_soft_failure_ends_with_incomplete() {
    let results = collect(flaky(), Query::v(&[]).out(&[])).await;
    assert_eq!(results.len(), 1);
    match &results[0] {
        Err(ExecutionError::Incomplete { failures }) => {
            assert_eq!(failures.len(), 1);
            assert!(failures[0].contains("adjacency store offline"), "{}", failures[0]);
        }
        other => panic!("expected Incomplete, got {:?}", other),
    }
}

#[tokio::test]
async fn test_partial_rows_precede_the_error() {
    // a count never sees the missing neighbors but still reports them missing
    let results = collect(flaky(), Query::v(&[]).out(&[]).count()).await;
    assert!(matches!(results[0], Ok(QueryResult::Count(0))));
    assert!(matches!(results.last(), Some(Err(ExecutionError::Incomplete { .. }))));

    // unaffected queries on the same graph stay complete
    let results = collect(flaky(), Query::v(&[]).has_label(&["Person"]).count()).await;
    assert!(matches!(results.as_slice(), [Ok(QueryResult::Count(2))]));
}

#[tokio::test]
async fn test_key_corruption_aborts_pipeline() {
    let kv = Arc::new(MemoryKv::new());
    let shared: Arc<dyn KvStore> = kv.clone();
    let mut registry = StorageRegistry::new();
    registry.register("memory", move |_: &DatabaseConfig| Ok(Arc::clone(&shared)));
    let db = GraphDb::open(DatabaseConfig::in_memory(), &registry).unwrap();
    let graph = db.add_graph("g").unwrap();
    graph
        .add_vertices(&[Vertex::new("1", "Person"), Vertex::new("2", "Person")])
        .unwrap();

    let mut bad = vertex_prefix(graph.graph_key());
    bad.extend_from_slice(&[0xff, 0xff, 0xff]);
    kv.put(&bad, b"junk").unwrap();

    let pipeline = db.compile("g", Query::v(&[]).count().statements()).unwrap();
    let workdir = tempfile::tempdir().unwrap();
    let results = tokio::time::timeout(
        Duration::from_secs(10),
        run(&Cancellation::new(), Arc::new(pipeline), workdir.path()).collect_results(),
    )
    .await
    .unwrap();

    // no count is reported for an aborted pipeline
    assert_eq!(results.len(), 1);
    match &results[0] {
        Err(e @ ExecutionError::Aborted(message)) => {
            assert!(e.is_fatal());
            assert!(message.contains("Key corruption"), "{}", message);
        }
        other => panic!("expected Aborted, got {:?}", other),
    }
}

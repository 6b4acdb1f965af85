use std::sync::Arc;
use trellis::query::run;
use trellis::storage::keys::{decode_adjacency_key, table_prefix, DEST_ADJ_TAG, SOURCE_ADJ_TAG};
use trellis::storage::IndexSide;
use trellis::{
    Cancellation, DatabaseConfig, Direction, Edge, Element, GraphDb, GraphInterface, KvStore,
    Query, QueryResult, RocksDbConfig, RocksKv, StorageRegistry, Vertex,
};

fn rocks_config(dir: &std::path::Path) -> DatabaseConfig {
    DatabaseConfig::default().with_data_path(dir.join("db"))
}

fn neighbor_ids(graph: &dyn GraphInterface, id: &str) -> Vec<String> {
    let ids = vec![id.to_string()];
    graph
        .lookup_neighbors(Direction::Both, &ids, &[], false, &Cancellation::new())
        .map(|n| n.unwrap().element.id)
        .collect()
}

#[test]
fn test_rocksdb_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let db = GraphDb::open(rocks_config(dir.path()), &StorageRegistry::with_defaults()).unwrap();
        let graph = db.add_graph("people").unwrap();
        graph
            .bulk_add(&[
                Element::from(Vertex::new("1", "Person").with_property("name", "Alex")),
                Element::from(Vertex::new("3", "Robot").with_property("name", "Bender")),
                Element::from(Edge::new("e13", "1", "3", "knows")),
            ])
            .unwrap();
        db.flush().unwrap();
    }

    let db = GraphDb::open(rocks_config(dir.path()), &StorageRegistry::with_defaults()).unwrap();
    assert_eq!(db.list_graphs().unwrap(), vec!["people"]);
    let graph = db.graph("people").unwrap();
    let alex = graph.get_vertex("1", true).unwrap().unwrap();
    assert_eq!(alex.get_property("name").and_then(|v| v.as_string()), Some("Alex"));
    assert_eq!(neighbor_ids(graph.as_ref(), "1"), vec!["3"]);

    // new ids after a restart never collide with old ones
    graph.add_vertices(&[Vertex::new("4", "Person")]).unwrap();
    let old = graph.keymap().get_vertex_key("3").unwrap().unwrap();
    let new = graph.keymap().get_vertex_key("4").unwrap().unwrap();
    assert!(new > old);

    assert_eq!(graph.list_vertex_labels().unwrap().len(), 2);
    assert_eq!(graph.list_edge_labels().unwrap(), vec!["knows"]);
}

#[test]
fn test_delete_cascade_leaves_no_adjacency_rows() {
    let dir = tempfile::tempdir().unwrap();
    let kv: Arc<dyn KvStore> = Arc::new(RocksKv::open(dir.path(), &RocksDbConfig::default()).unwrap());
    let shared = Arc::clone(&kv);
    let mut registry = StorageRegistry::new();
    registry.register("rocksdb", move |_: &DatabaseConfig| Ok(Arc::clone(&shared)));
    let db = GraphDb::open(DatabaseConfig::default(), &registry).unwrap();

    let graph = db.add_graph("g").unwrap();
    graph
        .add_vertices(&[
            Vertex::new("1", "Person"),
            Vertex::new("2", "Person"),
            Vertex::new("3", "Robot"),
        ])
        .unwrap();
    graph
        .add_edges(&[
            Edge::new("e13", "1", "3", "knows"),
            Edge::new("e32", "3", "2", "serves"),
            Edge::new("e12", "1", "2", "knows"),
        ])
        .unwrap();
    let doomed = graph.keymap().get_vertex_key("3").unwrap().unwrap();

    graph.delete_vertex("3").unwrap();

    for (tag, side) in [(SOURCE_ADJ_TAG, IndexSide::Source), (DEST_ADJ_TAG, IndexSide::Destination)] {
        for row in kv.scan_prefix(&table_prefix(tag, graph.graph_key())) {
            let (key, _) = row.unwrap();
            let entry = decode_adjacency_key(side, &key).unwrap();
            assert_ne!(entry.anchor, doomed);
            assert_ne!(entry.other, doomed);
        }
    }
    assert_eq!(neighbor_ids(graph.as_ref(), "1"), vec!["2"]);
    assert_eq!(neighbor_ids(graph.as_ref(), "2"), vec!["1"]);
    assert!(graph.get_edge("e13", false).unwrap().is_none());
    assert!(graph.get_edge("e32", false).unwrap().is_none());
    assert!(graph.get_vertex("3", false).unwrap().is_none());
}

#[test]
fn test_concurrent_inserts_share_one_key() {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(GraphDb::open(rocks_config(dir.path()), &StorageRegistry::with_defaults()).unwrap());
    let graph = db.add_graph("g").unwrap();

    let keys: Vec<_> = (0..8)
        .map(|_| {
            let graph = Arc::clone(&graph);
            std::thread::spawn(move || graph.keymap().get_or_create_vertex_key("same").unwrap())
        })
        .collect::<Vec<_>>()
        .into_iter()
        .map(|h| h.join().unwrap())
        .collect();
    assert!(keys.windows(2).all(|w| w[0] == w[1]));

    // exactly one allocation happened: the next fresh id takes the next key
    let next = graph.keymap().get_or_create_vertex_key("other").unwrap();
    assert_eq!(next.as_u64(), keys[0].as_u64() + 1);
}

#[test]
fn test_concurrent_relabel_keeps_index_consistent() {
    let dir = tempfile::tempdir().unwrap();
    let db = GraphDb::open(rocks_config(dir.path()), &StorageRegistry::with_defaults()).unwrap();
    let graph = db.add_graph("g").unwrap();
    let labels = ["B", "C", "D", "E"];
    graph.add_vertices(&[Vertex::new("v", "A")]).unwrap();

    let writers: Vec<_> = labels
        .iter()
        .map(|label| {
            let graph = Arc::clone(&graph);
            let label = label.to_string();
            std::thread::spawn(move || {
                for _ in 0..100 {
                    graph.add_vertices(&[Vertex::new("v", label.as_str())]).unwrap();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    let cancel = Cancellation::new();
    let indexed: Vec<&str> = ["A", "B", "C", "D", "E"]
        .into_iter()
        .filter(|label| graph.scan_vertex_ids_by_label(label, &cancel).count() > 0)
        .collect();
    let stored = graph.get_vertex("v", false).unwrap().unwrap();
    assert_eq!(indexed, vec![stored.label.as_str()]);
    assert_eq!(graph.scan_vertex_ids_by_label(&stored.label, &cancel).count(), 1);
}

#[test]
fn test_concurrent_edge_rewrites_keep_one_adjacency_pair() {
    let dir = tempfile::tempdir().unwrap();
    let kv: Arc<dyn KvStore> = Arc::new(RocksKv::open(dir.path(), &RocksDbConfig::default()).unwrap());
    let shared = Arc::clone(&kv);
    let mut registry = StorageRegistry::new();
    registry.register("rocksdb", move |_: &DatabaseConfig| Ok(Arc::clone(&shared)));
    let db = GraphDb::open(DatabaseConfig::default(), &registry).unwrap();

    let graph = db.add_graph("g").unwrap();
    graph
        .add_vertices(&[Vertex::new("a", "Node"), Vertex::new("b", "Node"), Vertex::new("c", "Node")])
        .unwrap();
    graph.add_edges(&[Edge::new("e", "a", "b", "link")]).unwrap();

    let writers: Vec<_> = (0..4)
        .map(|t| {
            let graph = Arc::clone(&graph);
            std::thread::spawn(move || {
                for round in 0..100 {
                    let to = if (t + round) % 2 == 0 { "b" } else { "c" };
                    graph.add_edges(&[Edge::new("e", "a", to, "link")]).unwrap();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    let stored = graph.get_edge("e", false).unwrap().unwrap();
    let to = graph.keymap().get_vertex_key(&stored.to).unwrap().unwrap();
    for (tag, side) in [(SOURCE_ADJ_TAG, IndexSide::Source), (DEST_ADJ_TAG, IndexSide::Destination)] {
        let rows: Vec<_> = kv
            .scan_prefix(&table_prefix(tag, graph.graph_key()))
            .map(|row| decode_adjacency_key(side, &row.unwrap().0).unwrap())
            .collect();
        assert_eq!(rows.len(), 1, "one adjacency row per side");
        let endpoint = match side {
            IndexSide::Source => rows[0].other,
            IndexSide::Destination => rows[0].anchor,
        };
        assert_eq!(endpoint, to);
    }
    assert_eq!(neighbor_ids(graph.as_ref(), "a"), vec![stored.to.clone()]);
}

#[tokio::test]
async fn test_query_over_rocksdb() {
    let dir = tempfile::tempdir().unwrap();
    let db = GraphDb::open(rocks_config(dir.path()), &StorageRegistry::with_defaults()).unwrap();
    let graph = db.add_graph("g").unwrap();
    let people: Vec<Vertex> = (0..50)
        .map(|i| Vertex::new(i.to_string(), if i % 2 == 0 { "Even" } else { "Odd" }).with_property("n", i as i64))
        .collect();
    graph.add_vertices(&people).unwrap();

    let pipeline = db.compile("g", Query::v(&[]).has_label(&["Odd"]).count().statements()).unwrap();
    let results = run(&Cancellation::new(), Arc::new(pipeline), dir.path().join("work"))
        .try_collect_results()
        .await
        .unwrap();
    assert_eq!(results, vec![QueryResult::Count(25)]);
}

#[test]
fn test_unknown_backend() {
    let config = DatabaseConfig {
        backend: "cassandra".to_string(),
        ..DatabaseConfig::in_memory()
    };
    match GraphDb::open(config, &StorageRegistry::with_defaults()) {
        Err(e) => assert!(e.to_string().contains("unknown storage driver")),
        Ok(_) => panic!("unknown driver must not open"),
    }
}

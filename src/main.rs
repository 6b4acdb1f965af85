use anyhow::Context;
use std::sync::Arc;
use tokio_stream::StreamExt;
use trellis::query::{Aggregation, HasExpression};
use trellis::{
    Cancellation, DatabaseConfig, Edge, GraphDb, GraphInterface, Query, QueryResult,
    StorageRegistry, Vertex,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    println!("Trellis Graph Database v{}", trellis::version());
    println!("==========================================");
    println!();

    // An optional YAML config path selects the backend; default is in-memory
    let config = match std::env::args().nth(1) {
        Some(path) => DatabaseConfig::load(&path).with_context(|| format!("loading {}", path))?,
        None => DatabaseConfig::in_memory(),
    };
    let db = GraphDb::open(config, &StorageRegistry::with_defaults())
        .context("opening database")?;

    load_demo_graph(&db)?;

    let workdir = tempfile::tempdir()?;
    let queries = vec![
        ("People", Query::v(&[]).has_label(&["Person"]).count()),
        ("Who Alex knows", Query::v(&["1"]).out(&["knows"])),
        (
            "Friends older than 30",
            Query::v(&[])
                .has_label(&["Person"])
                .mark("p")
                .out(&["knows"])
                .has(HasExpression::gt("age", 30i64))
                .render(serde_json::json!({"who": "$p.name", "knows": "$.name"})),
        ),
        ("Labels", Query::v(&[]).group_count(None)),
        (
            "Ages",
            Query::v(&[]).aggregate(vec![
                Aggregation::histogram("by_decade", "age", 10.0),
                Aggregation::percentile("median", "age", vec![50.0]),
            ]),
        ),
    ];

    for (title, query) in queries {
        println!("=== {} ===", title);
        let pipeline = db.compile("demo", query.statements())?;
        let mut results = trellis::run(&Cancellation::new(), Arc::new(pipeline), workdir.path());
        while let Some(item) = results.next().await {
            match item? {
                QueryResult::Vertex(v) => println!("  vertex {} ({}) {:?}", v.id, v.label, v.get_property("name")),
                QueryResult::Edge(e) => println!("  edge {} {} -> {}", e.label, e.from, e.to),
                QueryResult::Count(n) => println!("  count = {}", n),
                QueryResult::Selections(row) => println!("  row {:?}", row.keys().collect::<Vec<_>>()),
                QueryResult::Render(value) => println!("  {}", value),
                QueryResult::Aggregation(a) => println!("  {} [{}] = {}", a.name, a.key, a.value),
            }
        }
        println!();
    }

    db.flush()?;
    Ok(())
}

fn load_demo_graph(db: &GraphDb) -> anyhow::Result<()> {
    let graph = db.add_graph("demo")?;
    graph.add_vertices(&[
        Vertex::new("1", "Person").with_property("name", "Alex").with_property("age", 34i64),
        Vertex::new("2", "Person").with_property("name", "Kyle").with_property("age", 27i64),
        Vertex::new("3", "Robot").with_property("name", "Bender").with_property("age", 41i64),
        Vertex::new("4", "Person").with_property("name", "Mira").with_property("age", 52i64),
    ])?;
    graph.add_edges(&[
        Edge::new("e1", "1", "3", "knows"),
        Edge::new("e2", "1", "2", "knows"),
        Edge::new("e3", "2", "4", "knows"),
        Edge::new("e4", "4", "3", "builds").with_property("year", 3000i64),
    ])?;
    println!("✓ Loaded demo graph at {}", graph.get_timestamp());
    println!();
    Ok(())
}

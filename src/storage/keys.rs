//! Binary key codec
//!
//! Every table key starts with a one-byte tag followed by fixed-width
//! big-endian `u64` fields, so byte-lexicographic order over encoded keys is
//! field-wise numeric order over the tuples they encode. Prefix scans over
//! `(tag, graph, anchor)` therefore return exactly one contiguous range.
//!
//! | table                 | layout                                         |
//! |-----------------------|------------------------------------------------|
//! | vertex                | `v` graph vertex                               |
//! | edge                  | `e` graph edge src dst label                   |
//! | source adjacency      | `s` graph src label dst edge                   |
//! | destination adjacency | `d` graph dst label src edge                   |
//! | vertex label index    | `x` graph label vertex                         |
//! | edge label index      | `y` graph label edge                           |
//! | id maps (forward)     | `V`/`E`/`L` graph utf8-id                      |
//! | id maps (reverse)     | `W`/`F`/`M` graph key                          |
//! | key counters          | `c` kind graph                                 |
//! | graph names           | `G` utf8-name, `H` graph                       |
//!
//! Adjacency rows place the label right after the anchor so that a
//! single-label neighbor scan is a narrower prefix of the same table.

use crate::graph::{EdgeKey, GraphKey, LabelKey, VertexKey};
use thiserror::Error;

const KEY_WIDTH: usize = 8;

pub const VERTEX_TAG: u8 = b'v';
pub const EDGE_TAG: u8 = b'e';
pub const SOURCE_ADJ_TAG: u8 = b's';
pub const DEST_ADJ_TAG: u8 = b'd';
pub const VERTEX_LABEL_TAG: u8 = b'x';
pub const EDGE_LABEL_TAG: u8 = b'y';
pub const VERTEX_ID_TAG: u8 = b'V';
pub const VERTEX_REV_TAG: u8 = b'W';
pub const EDGE_ID_TAG: u8 = b'E';
pub const EDGE_REV_TAG: u8 = b'F';
pub const LABEL_ID_TAG: u8 = b'L';
pub const LABEL_REV_TAG: u8 = b'M';
pub const COUNTER_TAG: u8 = b'c';
pub const GRAPH_NAME_TAG: u8 = b'G';
pub const GRAPH_REV_TAG: u8 = b'H';

/// Key decoding errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("unexpected tag {found:#04x} for {table} key (expected {expected:#04x})")]
    WrongTag {
        table: &'static str,
        expected: u8,
        found: u8,
    },

    #[error("{table} key has {found} bytes, expected {expected}")]
    WrongLength {
        table: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("{table} key carries a non UTF-8 identifier")]
    InvalidUtf8 { table: &'static str },
}

pub type KeyResult<T> = Result<T, KeyError>;

/// Which endpoint an adjacency row is anchored on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexSide {
    /// Anchored on the edge's source vertex (out-neighbors)
    Source,
    /// Anchored on the edge's destination vertex (in-neighbors)
    Destination,
}

impl IndexSide {
    pub fn tag(self) -> u8 {
        match self {
            IndexSide::Source => SOURCE_ADJ_TAG,
            IndexSide::Destination => DEST_ADJ_TAG,
        }
    }

    fn table(self) -> &'static str {
        match self {
            IndexSide::Source => "source adjacency",
            IndexSide::Destination => "destination adjacency",
        }
    }
}

/// Kinds of per-graph surrogate key counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterKind {
    Vertex,
    Edge,
    Label,
}

impl CounterKind {
    fn byte(self) -> u8 {
        match self {
            CounterKind::Vertex => b'v',
            CounterKind::Edge => b'e',
            CounterKind::Label => b'l',
        }
    }
}

/// Kinds of string-to-key identifier tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdTable {
    Vertex,
    Edge,
    Label,
}

impl IdTable {
    fn forward_tag(self) -> u8 {
        match self {
            IdTable::Vertex => VERTEX_ID_TAG,
            IdTable::Edge => EDGE_ID_TAG,
            IdTable::Label => LABEL_ID_TAG,
        }
    }

    fn reverse_tag(self) -> u8 {
        match self {
            IdTable::Vertex => VERTEX_REV_TAG,
            IdTable::Edge => EDGE_REV_TAG,
            IdTable::Label => LABEL_REV_TAG,
        }
    }

    pub fn counter(self) -> CounterKind {
        match self {
            IdTable::Vertex => CounterKind::Vertex,
            IdTable::Edge => CounterKind::Edge,
            IdTable::Label => CounterKind::Label,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            IdTable::Vertex => "vertex",
            IdTable::Edge => "edge",
            IdTable::Label => "label",
        }
    }
}

/// Decoded edge record key
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeEntry {
    pub graph: GraphKey,
    pub edge: EdgeKey,
    pub src: VertexKey,
    pub dst: VertexKey,
    pub label: LabelKey,
}

/// Decoded adjacency index row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AdjacencyEntry {
    pub side: IndexSide,
    pub graph: GraphKey,
    pub anchor: VertexKey,
    pub other: VertexKey,
    pub edge: EdgeKey,
    pub label: LabelKey,
}

impl AdjacencyEntry {
    /// Source vertex of the edge this row was derived from
    pub fn src(&self) -> VertexKey {
        match self.side {
            IndexSide::Source => self.anchor,
            IndexSide::Destination => self.other,
        }
    }

    /// Destination vertex of the edge this row was derived from
    pub fn dst(&self) -> VertexKey {
        match self.side {
            IndexSide::Source => self.other,
            IndexSide::Destination => self.anchor,
        }
    }
}

fn key_buf(tag: u8, fields: usize) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1 + fields * KEY_WIDTH);
    buf.push(tag);
    buf
}

fn put(buf: &mut Vec<u8>, value: u64) {
    buf.extend_from_slice(&value.to_be_bytes());
}

fn field(bytes: &[u8], index: usize) -> u64 {
    let start = 1 + index * KEY_WIDTH;
    let mut raw = [0u8; KEY_WIDTH];
    raw.copy_from_slice(&bytes[start..start + KEY_WIDTH]);
    u64::from_be_bytes(raw)
}

fn check(bytes: &[u8], table: &'static str, tag: u8, fields: usize) -> KeyResult<()> {
    let expected = 1 + fields * KEY_WIDTH;
    if bytes.len() != expected {
        return Err(KeyError::WrongLength {
            table,
            expected,
            found: bytes.len(),
        });
    }
    if bytes[0] != tag {
        return Err(KeyError::WrongTag {
            table,
            expected: tag,
            found: bytes[0],
        });
    }
    Ok(())
}

/// Prefix covering every row of one table within a graph
pub fn table_prefix(tag: u8, graph: GraphKey) -> Vec<u8> {
    let mut buf = key_buf(tag, 1);
    put(&mut buf, graph.0);
    buf
}

// ---------------------------------------------------------------------------
// Vertices
// ---------------------------------------------------------------------------

pub fn encode_vertex_key(graph: GraphKey, vertex: VertexKey) -> Vec<u8> {
    let mut buf = key_buf(VERTEX_TAG, 2);
    put(&mut buf, graph.0);
    put(&mut buf, vertex.0);
    buf
}

pub fn decode_vertex_key(bytes: &[u8]) -> KeyResult<(GraphKey, VertexKey)> {
    check(bytes, "vertex", VERTEX_TAG, 2)?;
    Ok((GraphKey(field(bytes, 0)), VertexKey(field(bytes, 1))))
}

pub fn vertex_prefix(graph: GraphKey) -> Vec<u8> {
    table_prefix(VERTEX_TAG, graph)
}

// ---------------------------------------------------------------------------
// Edges
// ---------------------------------------------------------------------------

pub fn encode_edge_key(
    graph: GraphKey,
    edge: EdgeKey,
    src: VertexKey,
    dst: VertexKey,
    label: LabelKey,
) -> Vec<u8> {
    let mut buf = key_buf(EDGE_TAG, 5);
    put(&mut buf, graph.0);
    put(&mut buf, edge.0);
    put(&mut buf, src.0);
    put(&mut buf, dst.0);
    put(&mut buf, label.0);
    buf
}

/// Prefix addressing one edge record by its key alone
pub fn encode_edge_key_prefix(graph: GraphKey, edge: EdgeKey) -> Vec<u8> {
    let mut buf = key_buf(EDGE_TAG, 2);
    put(&mut buf, graph.0);
    put(&mut buf, edge.0);
    buf
}

pub fn decode_edge_key(bytes: &[u8]) -> KeyResult<EdgeEntry> {
    check(bytes, "edge", EDGE_TAG, 5)?;
    Ok(EdgeEntry {
        graph: GraphKey(field(bytes, 0)),
        edge: EdgeKey(field(bytes, 1)),
        src: VertexKey(field(bytes, 2)),
        dst: VertexKey(field(bytes, 3)),
        label: LabelKey(field(bytes, 4)),
    })
}

pub fn edge_prefix(graph: GraphKey) -> Vec<u8> {
    table_prefix(EDGE_TAG, graph)
}

impl EdgeEntry {
    pub fn encode(&self) -> Vec<u8> {
        encode_edge_key(self.graph, self.edge, self.src, self.dst, self.label)
    }

    /// Both adjacency rows derived from this edge
    pub fn adjacency_rows(&self) -> [AdjacencyEntry; 2] {
        [
            AdjacencyEntry {
                side: IndexSide::Source,
                graph: self.graph,
                anchor: self.src,
                other: self.dst,
                edge: self.edge,
                label: self.label,
            },
            AdjacencyEntry {
                side: IndexSide::Destination,
                graph: self.graph,
                anchor: self.dst,
                other: self.src,
                edge: self.edge,
                label: self.label,
            },
        ]
    }
}

// ---------------------------------------------------------------------------
// Adjacency index
// ---------------------------------------------------------------------------

pub fn encode_adjacency_key(
    side: IndexSide,
    graph: GraphKey,
    anchor: VertexKey,
    other: VertexKey,
    edge: EdgeKey,
    label: LabelKey,
) -> Vec<u8> {
    let mut buf = key_buf(side.tag(), 5);
    put(&mut buf, graph.0);
    put(&mut buf, anchor.0);
    put(&mut buf, label.0);
    put(&mut buf, other.0);
    put(&mut buf, edge.0);
    buf
}

/// Prefix over every row anchored on one vertex
pub fn encode_adjacency_prefix(side: IndexSide, graph: GraphKey, anchor: VertexKey) -> Vec<u8> {
    let mut buf = key_buf(side.tag(), 4);
    put(&mut buf, graph.0);
    put(&mut buf, anchor.0);
    buf
}

/// Prefix over rows anchored on one vertex carrying one label
pub fn encode_adjacency_label_prefix(
    side: IndexSide,
    graph: GraphKey,
    anchor: VertexKey,
    label: LabelKey,
) -> Vec<u8> {
    let mut buf = encode_adjacency_prefix(side, graph, anchor);
    put(&mut buf, label.0);
    buf
}

pub fn decode_adjacency_key(side: IndexSide, bytes: &[u8]) -> KeyResult<AdjacencyEntry> {
    check(bytes, side.table(), side.tag(), 5)?;
    Ok(AdjacencyEntry {
        side,
        graph: GraphKey(field(bytes, 0)),
        anchor: VertexKey(field(bytes, 1)),
        label: LabelKey(field(bytes, 2)),
        other: VertexKey(field(bytes, 3)),
        edge: EdgeKey(field(bytes, 4)),
    })
}

impl AdjacencyEntry {
    pub fn encode(&self) -> Vec<u8> {
        encode_adjacency_key(
            self.side,
            self.graph,
            self.anchor,
            self.other,
            self.edge,
            self.label,
        )
    }
}

// ---------------------------------------------------------------------------
// Label indexes
// ---------------------------------------------------------------------------

pub fn encode_vertex_label_key(graph: GraphKey, label: LabelKey, vertex: VertexKey) -> Vec<u8> {
    let mut buf = encode_vertex_label_prefix(graph, label);
    put(&mut buf, vertex.0);
    buf
}

pub fn encode_vertex_label_prefix(graph: GraphKey, label: LabelKey) -> Vec<u8> {
    let mut buf = key_buf(VERTEX_LABEL_TAG, 3);
    put(&mut buf, graph.0);
    put(&mut buf, label.0);
    buf
}

pub fn decode_vertex_label_key(bytes: &[u8]) -> KeyResult<(GraphKey, LabelKey, VertexKey)> {
    check(bytes, "vertex label index", VERTEX_LABEL_TAG, 3)?;
    Ok((
        GraphKey(field(bytes, 0)),
        LabelKey(field(bytes, 1)),
        VertexKey(field(bytes, 2)),
    ))
}

pub fn encode_edge_label_key(graph: GraphKey, label: LabelKey, edge: EdgeKey) -> Vec<u8> {
    let mut buf = encode_edge_label_prefix(graph, label);
    put(&mut buf, edge.0);
    buf
}

pub fn encode_edge_label_prefix(graph: GraphKey, label: LabelKey) -> Vec<u8> {
    let mut buf = key_buf(EDGE_LABEL_TAG, 3);
    put(&mut buf, graph.0);
    put(&mut buf, label.0);
    buf
}

pub fn decode_edge_label_key(bytes: &[u8]) -> KeyResult<(GraphKey, LabelKey, EdgeKey)> {
    check(bytes, "edge label index", EDGE_LABEL_TAG, 3)?;
    Ok((
        GraphKey(field(bytes, 0)),
        LabelKey(field(bytes, 1)),
        EdgeKey(field(bytes, 2)),
    ))
}

// ---------------------------------------------------------------------------
// Identifier maps and counters
// ---------------------------------------------------------------------------

pub fn encode_id_key(table: IdTable, graph: GraphKey, id: &str) -> Vec<u8> {
    let mut buf = table_prefix(table.forward_tag(), graph);
    buf.extend_from_slice(id.as_bytes());
    buf
}

pub fn encode_reverse_id_key(table: IdTable, graph: GraphKey, key: u64) -> Vec<u8> {
    let mut buf = table_prefix(table.reverse_tag(), graph);
    put(&mut buf, key);
    buf
}

/// Prefix over every forward id mapping of one table
pub fn id_table_prefix(table: IdTable, graph: GraphKey) -> Vec<u8> {
    table_prefix(table.forward_tag(), graph)
}

/// Recover the string id from a forward id-map key
pub fn decode_id_key(table: IdTable, bytes: &[u8]) -> KeyResult<(GraphKey, String)> {
    let name = table.name();
    if bytes.len() < 1 + KEY_WIDTH {
        return Err(KeyError::WrongLength {
            table: name,
            expected: 1 + KEY_WIDTH,
            found: bytes.len(),
        });
    }
    if bytes[0] != table.forward_tag() {
        return Err(KeyError::WrongTag {
            table: name,
            expected: table.forward_tag(),
            found: bytes[0],
        });
    }
    let id = std::str::from_utf8(&bytes[1 + KEY_WIDTH..])
        .map_err(|_| KeyError::InvalidUtf8 { table: name })?;
    Ok((GraphKey(field(bytes, 0)), id.to_string()))
}

pub fn encode_counter_key(kind: CounterKind, graph: GraphKey) -> Vec<u8> {
    let mut buf = Vec::with_capacity(2 + KEY_WIDTH);
    buf.push(COUNTER_TAG);
    buf.push(kind.byte());
    put(&mut buf, graph.0);
    buf
}

/// Counter handing out graph keys themselves
pub fn graph_counter_key() -> Vec<u8> {
    vec![COUNTER_TAG, b'g']
}

pub fn encode_graph_name_key(name: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1 + name.len());
    buf.push(GRAPH_NAME_TAG);
    buf.extend_from_slice(name.as_bytes());
    buf
}

pub fn graph_name_prefix() -> Vec<u8> {
    vec![GRAPH_NAME_TAG]
}

pub fn decode_graph_name_key(bytes: &[u8]) -> KeyResult<String> {
    match bytes.first() {
        Some(&GRAPH_NAME_TAG) => std::str::from_utf8(&bytes[1..])
            .map(str::to_string)
            .map_err(|_| KeyError::InvalidUtf8 { table: "graph name" }),
        Some(&found) => Err(KeyError::WrongTag {
            table: "graph name",
            expected: GRAPH_NAME_TAG,
            found,
        }),
        None => Err(KeyError::WrongLength {
            table: "graph name",
            expected: 1,
            found: 0,
        }),
    }
}

pub fn encode_graph_reverse_key(graph: GraphKey) -> Vec<u8> {
    table_prefix(GRAPH_REV_TAG, graph)
}

/// Every prefix that holds rows belonging to `graph`
pub fn graph_prefixes(graph: GraphKey) -> Vec<Vec<u8>> {
    let mut prefixes: Vec<Vec<u8>> = [
        VERTEX_TAG,
        EDGE_TAG,
        SOURCE_ADJ_TAG,
        DEST_ADJ_TAG,
        VERTEX_LABEL_TAG,
        EDGE_LABEL_TAG,
        VERTEX_ID_TAG,
        VERTEX_REV_TAG,
        EDGE_ID_TAG,
        EDGE_REV_TAG,
        LABEL_ID_TAG,
        LABEL_REV_TAG,
    ]
    .iter()
    .map(|tag| table_prefix(*tag, graph))
    .collect();
    for kind in [CounterKind::Vertex, CounterKind::Edge, CounterKind::Label] {
        prefixes.push(encode_counter_key(kind, graph));
    }
    prefixes
}

/// Encode a `u64` value for counters and reverse-mapped keys
pub fn encode_u64(value: u64) -> Vec<u8> {
    value.to_be_bytes().to_vec()
}

pub fn decode_u64(table: &'static str, bytes: &[u8]) -> KeyResult<u64> {
    let raw: [u8; KEY_WIDTH] = bytes.try_into().map_err(|_| KeyError::WrongLength {
        table,
        expected: KEY_WIDTH,
        found: bytes.len(),
    })?;
    Ok(u64::from_be_bytes(raw))
}

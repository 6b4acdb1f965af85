//! Client-facing query results

use crate::graph::{Edge, Element, Vertex};
use indexmap::IndexMap;
use serde::Serialize;

/// One aggregation bucket
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregationResult {
    pub name: String,
    pub key: serde_json::Value,
    pub value: f64,
}

/// A single item of a pipeline's output
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum QueryResult {
    Vertex(Vertex),
    Edge(Edge),
    Count(u64),
    /// Marked elements in selection order
    Selections(IndexMap<String, Element>),
    Render(serde_json::Value),
    Aggregation(AggregationResult),
}

impl QueryResult {
    pub fn as_vertex(&self) -> Option<&Vertex> {
        match self {
            QueryResult::Vertex(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_edge(&self) -> Option<&Edge> {
        match self {
            QueryResult::Edge(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_count(&self) -> Option<u64> {
        match self {
            QueryResult::Count(n) => Some(*n),
            _ => None,
        }
    }
}

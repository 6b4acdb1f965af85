//! Edge implementation for property graph

use super::property::{PropertyMap, PropertyValue};
use serde::{Deserialize, Serialize};

/// A directed edge in the property graph
///
/// Multiple edges between the same pair of vertices are allowed; each has
/// its own id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Unique identifier within its graph
    pub id: String,

    /// Relationship label (e.g., "knows")
    pub label: String,

    /// Source vertex id (edge goes FROM this vertex)
    pub from: String,

    /// Destination vertex id
    pub to: String,

    /// Properties associated with this edge
    #[serde(default)]
    pub data: PropertyMap,
}

impl Edge {
    /// Create a new directed edge
    pub fn new(
        id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Edge {
            id: id.into(),
            label: label.into(),
            from: from.into(),
            to: to.into(),
            data: PropertyMap::new(),
        }
    }

    /// Builder-style property setter
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn get_property(&self, key: &str) -> Option<&PropertyValue> {
        self.data.get(key)
    }

    /// Check if this edge connects two vertices in its direction
    pub fn connects(&self, from: &str, to: &str) -> bool {
        self.from == from && self.to == to
    }

    /// Check if this is a self-loop
    pub fn is_self_loop(&self) -> bool {
        self.from == self.to
    }
}

/// Either kind of graph element, used by bulk loads and by travelers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Element {
    Vertex(super::Vertex),
    Edge(Edge),
}

impl Element {
    pub fn id(&self) -> &str {
        match self {
            Element::Vertex(v) => &v.id,
            Element::Edge(e) => &e.id,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Element::Vertex(v) => &v.label,
            Element::Edge(e) => &e.label,
        }
    }

    pub fn data(&self) -> &PropertyMap {
        match self {
            Element::Vertex(v) => &v.data,
            Element::Edge(e) => &e.data,
        }
    }

    pub fn is_vertex(&self) -> bool {
        matches!(self, Element::Vertex(_))
    }
}

impl From<super::Vertex> for Element {
    fn from(v: super::Vertex) -> Self {
        Element::Vertex(v)
    }
}

impl From<Edge> for Element {
    fn from(e: Edge) -> Self {
        Element::Edge(e)
    }
}

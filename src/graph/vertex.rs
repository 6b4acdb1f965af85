//! Vertex implementation for property graph

use super::property::{PropertyMap, PropertyValue};
use serde::{Deserialize, Serialize};

/// A vertex in the property graph
///
/// Vertices have a user-visible string id, exactly one label and a
/// property payload. Mutation is full replace only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    /// Unique identifier within its graph
    pub id: String,

    /// Label (e.g., "Person")
    pub label: String,

    /// Properties associated with this vertex
    #[serde(default)]
    pub data: PropertyMap,
}

impl Vertex {
    /// Create a new vertex without properties
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Vertex {
            id: id.into(),
            label: label.into(),
            data: PropertyMap::new(),
        }
    }

    /// Create a new vertex with properties
    pub fn new_with_data(id: impl Into<String>, label: impl Into<String>, data: PropertyMap) -> Self {
        Vertex {
            id: id.into(),
            label: label.into(),
            data,
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_builder() {
        let v = Vertex::new("1", "Person").with_property("name", "Alex");
        assert_eq!(v.id, "1");
        assert_eq!(v.label, "Person");
        assert_eq!(v.get_property("name"), Some(&PropertyValue::from("Alex")));
        assert!(v.get_property("age").is_none());
    }
}

//! Property graph data model
//!
//! - Vertices and edges keyed by user-visible string ids
//! - Property payloads shared by both element kinds
//! - Surrogate key newtypes used by the storage layer

pub mod edge;
pub mod property;
pub mod types;
pub mod vertex;

// Re-export main types
pub use edge::{Edge, Element};
pub use property::{PropertyMap, PropertyValue};
pub use types::{Direction, EdgeKey, GraphKey, LabelKey, VertexKey};
pub use vertex::Vertex;

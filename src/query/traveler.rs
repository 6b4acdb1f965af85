//! Travelers and marks
//!
//! A `Traveler` is the unit flowing between stages. Its marks map sits
//! behind an `Arc` and is never mutated in place: `add_mark` builds a new
//! map holding the same element handles plus the new entry. Forked
//! travelers may therefore share a map freely.
//!
//! The path walked so far is a persistent list: every move to a new element
//! pushes one link in front of the shared tail.

use crate::graph::{Edge, Element, PropertyMap, Vertex};
use indexmap::IndexMap;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Element handle carried by a traveler
#[derive(Debug, Clone, PartialEq)]
pub struct ElementRef {
    pub element: Element,
    /// Whether `element` carries its payload or only id and label
    pub loaded: bool,
}

impl ElementRef {
    pub fn vertex(vertex: Vertex, loaded: bool) -> Self {
        Self {
            element: Element::Vertex(vertex),
            loaded,
        }
    }

    pub fn edge(edge: Edge, loaded: bool) -> Self {
        Self {
            element: Element::Edge(edge),
            loaded,
        }
    }

    pub fn id(&self) -> &str {
        self.element.id()
    }

    pub fn label(&self) -> &str {
        self.element.label()
    }

    pub fn data(&self) -> &PropertyMap {
        self.element.data()
    }

    pub fn is_vertex(&self) -> bool {
        self.element.is_vertex()
    }

    /// Loaded copy with `data` as its payload
    pub fn with_data(&self, data: PropertyMap) -> ElementRef {
        let mut element = self.element.clone();
        match &mut element {
            Element::Vertex(v) => v.data = data,
            Element::Edge(e) => e.data = data,
        }
        ElementRef { element, loaded: true }
    }
}

/// One aggregation bucket
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationBucket {
    pub name: String,
    pub key: serde_json::Value,
    pub value: f64,
}

/// Terminal payload filled in by the stage that produces it
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Payload {
    #[default]
    Empty,
    Count(u64),
    GroupCount(BTreeMap<String, u64>),
    Row(IndexMap<String, Arc<ElementRef>>),
    Value(serde_json::Value),
    Aggregation(AggregationBucket),
}

#[derive(Debug, PartialEq)]
struct PathLink {
    element: Arc<ElementRef>,
    parent: Option<Arc<PathLink>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Traveler {
    current: Option<Arc<ElementRef>>,
    marks: Arc<BTreeMap<String, Arc<ElementRef>>>,
    payload: Payload,
    path: Option<Arc<PathLink>>,
}

impl Traveler {
    /// Empty seed traveler
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&ElementRef> {
        self.current.as_deref()
    }

    pub fn current_handle(&self) -> Option<&Arc<ElementRef>> {
        self.current.as_ref()
    }

    /// Same marks, new current element
    pub fn with_current(&self, element: ElementRef) -> Traveler {
        self.with_current_handle(Arc::new(element))
    }

    pub fn with_current_handle(&self, element: Arc<ElementRef>) -> Traveler {
        let path = Some(Arc::new(PathLink {
            element: Arc::clone(&element),
            parent: self.path.clone(),
        }));
        Traveler {
            current: Some(element),
            marks: Arc::clone(&self.marks),
            payload: Payload::Empty,
            path,
        }
    }

    /// Swap in a rewritten copy of the current element without taking a
    /// step; the path is unchanged
    pub fn replace_current(&self, element: ElementRef) -> Traveler {
        Traveler {
            current: Some(Arc::new(element)),
            marks: Arc::clone(&self.marks),
            payload: Payload::Empty,
            path: self.path.clone(),
        }
    }

    /// Same marks and path, no current element. Produced when an optional
    /// step finds nothing.
    pub fn without_current(&self) -> Traveler {
        Traveler {
            current: None,
            marks: Arc::clone(&self.marks),
            payload: Payload::Empty,
            path: self.path.clone(),
        }
    }

    /// Every element visited, oldest first
    pub fn path(&self) -> Vec<Arc<ElementRef>> {
        let mut out = Vec::new();
        let mut link = self.path.as_deref();
        while let Some(current) = link {
            out.push(Arc::clone(&current.element));
            link = current.parent.as_deref();
        }
        out.reverse();
        out
    }

    /// Copy of this traveler whose marks also record the current element
    /// under `name`. The receiver's own marks map is left untouched.
    pub fn add_mark(&self, name: &str) -> Traveler {
        let mut marks: BTreeMap<String, Arc<ElementRef>> = (*self.marks).clone();
        if let Some(current) = &self.current {
            marks.insert(name.to_string(), Arc::clone(current));
        }
        Traveler {
            current: self.current.clone(),
            marks: Arc::new(marks),
            payload: self.payload.clone(),
            path: self.path.clone(),
        }
    }

    pub fn get_mark(&self, name: &str) -> Option<&Arc<ElementRef>> {
        self.marks.get(name)
    }

    pub fn has_mark(&self, name: &str) -> bool {
        self.marks.contains_key(name)
    }

    pub fn mark_names(&self) -> impl Iterator<Item = &str> {
        self.marks.keys().map(String::as_str)
    }

    /// True when both travelers share one marks map allocation
    pub fn shares_marks_with(&self, other: &Traveler) -> bool {
        Arc::ptr_eq(&self.marks, &other.marks)
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Same marks and element, new payload
    pub fn with_payload(&self, payload: Payload) -> Traveler {
        Traveler {
            current: self.current.clone(),
            marks: Arc::clone(&self.marks),
            payload,
            path: self.path.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(id: &str) -> ElementRef {
        ElementRef::vertex(Vertex::new(id, "Person"), false)
    }

    #[test]
    fn test_seed_is_empty() {
        let t = Traveler::new();
        assert!(t.current().is_none());
        assert_eq!(t.mark_names().count(), 0);
        assert_eq!(t.payload(), &Payload::Empty);
    }

    #[test]
    fn test_forked_marks_are_isolated() {
        let base = Traveler::new().with_current(person("1")).add_mark("a");

        let left = base.with_current(person("2")).add_mark("b1");
        let right = base.with_current(person("3")).add_mark("b2");

        assert_eq!(left.get_mark("a").unwrap().id(), "1");
        assert_eq!(right.get_mark("a").unwrap().id(), "1");
        assert!(left.has_mark("b1") && !left.has_mark("b2"));
        assert!(right.has_mark("b2") && !right.has_mark("b1"));
        assert!(!base.has_mark("b1") && !base.has_mark("b2"));
        assert_eq!(base.mark_names().collect::<Vec<_>>(), vec!["a"]);

        // the "a" entry is the same shared element handle in every fork
        assert!(Arc::ptr_eq(base.get_mark("a").unwrap(), left.get_mark("a").unwrap()));
    }

    #[test]
    fn test_marking_copies_map() {
        let base = Traveler::new().with_current(person("1"));
        let moved = base.with_current(person("2"));
        assert!(base.shares_marks_with(&moved));

        let marked = moved.add_mark("x");
        assert!(!marked.shares_marks_with(&moved));
        assert!(!moved.has_mark("x"));
    }

    #[test]
    fn test_payload_keeps_marks() {
        let t = Traveler::new().with_current(person("1")).add_mark("a");
        let counted = t.with_payload(Payload::Count(3));
        assert_eq!(counted.payload(), &Payload::Count(3));
        assert!(counted.has_mark("a"));
        assert_eq!(counted.current().unwrap().id(), "1");
    }

    #[test]
    fn test_path_is_shared_between_forks() {
        let base = Traveler::new().with_current(person("1")).with_current(person("2"));
        let left = base.with_current(person("3"));
        let right = base.without_current().add_mark("gone");

        let ids = |t: &Traveler| t.path().iter().map(|el| el.id().to_string()).collect::<Vec<_>>();
        assert_eq!(ids(&left), vec!["1", "2", "3"]);
        assert_eq!(ids(&right), vec!["1", "2"]);
        assert!(right.current().is_none());
        // nothing was current when the mark was taken
        assert!(!right.has_mark("gone"));

        let rewritten = left.replace_current(person("3"));
        assert_eq!(ids(&rewritten), vec!["1", "2", "3"]);
    }
}

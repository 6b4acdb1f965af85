//! Field paths
//!
//! - `name`, `$.name.inner`: payload field of the current element
//! - `$mark`, `$mark.name`: payload (or field) of a marked element
//! - `_gid`, `_label`, `_from`, `_to`: element metadata, also usable after
//!   a prefix (`$._label`, `$mark._gid`)
//! - `$`: the whole payload of the current element

use super::traveler::{ElementRef, Traveler};
use crate::graph::{Element, PropertyValue};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    Gid,
    Label,
    From,
    To,
    /// Payload path; empty means the whole payload
    Data(Vec<String>),
}

impl Field {
    fn parse(rest: &str) -> Field {
        match rest {
            "" => Field::Data(Vec::new()),
            "_gid" => Field::Gid,
            "_label" => Field::Label,
            "_from" => Field::From,
            "_to" => Field::To,
            other => Field::Data(other.split('.').map(str::to_string).collect()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    /// `None` addresses the current element
    pub mark: Option<String>,
    pub field: Field,
}

impl FieldPath {
    pub fn parse(path: &str) -> FieldPath {
        if let Some(rest) = path.strip_prefix("$.") {
            return FieldPath { mark: None, field: Field::parse(rest) };
        }
        if path == "$" {
            return FieldPath { mark: None, field: Field::Data(Vec::new()) };
        }
        if let Some(rest) = path.strip_prefix('$') {
            let (mark, field) = match rest.split_once('.') {
                Some((mark, field)) => (mark, field),
                None => (rest, ""),
            };
            return FieldPath {
                mark: Some(mark.to_string()),
                field: Field::parse(field),
            };
        }
        FieldPath { mark: None, field: Field::parse(path) }
    }

    /// Whether resolving this path reads element payloads
    pub fn needs_data(&self) -> bool {
        matches!(self.field, Field::Data(_))
    }

    pub fn element<'a>(&self, traveler: &'a Traveler) -> Option<&'a ElementRef> {
        match &self.mark {
            Some(name) => traveler.get_mark(name).map(|el| el.as_ref()),
            None => traveler.current(),
        }
    }

    pub fn resolve(&self, traveler: &Traveler) -> Option<PropertyValue> {
        let element = self.element(traveler)?;
        match &self.field {
            Field::Gid => Some(PropertyValue::from(element.id())),
            Field::Label => Some(PropertyValue::from(element.label())),
            Field::From => match &element.element {
                Element::Edge(e) => Some(PropertyValue::from(e.from.as_str())),
                Element::Vertex(_) => None,
            },
            Field::To => match &element.element {
                Element::Edge(e) => Some(PropertyValue::from(e.to.as_str())),
                Element::Vertex(_) => None,
            },
            Field::Data(parts) => {
                let data = element.data();
                match parts.split_first() {
                    None => Some(PropertyValue::Map(data.clone())),
                    Some((head, rest)) => {
                        let rest: Vec<&str> = rest.iter().map(String::as_str).collect();
                        data.get(head)?.get_path(&rest).cloned()
                    }
                }
            }
        }
    }
}

/// Substitute every `$`-prefixed string of a JSON template
pub fn render(template: &serde_json::Value, traveler: &Traveler) -> serde_json::Value {
    match template {
        serde_json::Value::String(s) if s.starts_with('$') => FieldPath::parse(s)
            .resolve(traveler)
            .map(|v| v.to_json())
            .unwrap_or(serde_json::Value::Null),
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(|v| render(v, traveler)).collect())
        }
        serde_json::Value::Object(fields) => serde_json::Value::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), render(v, traveler)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Every path referenced by a render template
pub fn template_paths(template: &serde_json::Value) -> Vec<FieldPath> {
    let mut out = Vec::new();
    collect_paths(template, &mut out);
    out
}

fn collect_paths(template: &serde_json::Value, out: &mut Vec<FieldPath>) {
    match template {
        serde_json::Value::String(s) if s.starts_with('$') => out.push(FieldPath::parse(s)),
        serde_json::Value::Array(items) => items.iter().for_each(|v| collect_paths(v, out)),
        serde_json::Value::Object(fields) => fields.values().for_each(|v| collect_paths(v, out)),
        _ => {}
    }
}

//! Load-data analysis
//!
//! Every statement that moves the traveler to a new element (`V`, `E`,
//! `out`, `inE`, ...) is a *step*. A step only has to read element payloads
//! when something later in the statement list looks at them: a `has` on a
//! payload field, `values`, `render`, an aggregation, a selection of a mark
//! taken at that step, or the final result itself.

use super::path::{template_paths, FieldPath};
use super::statement::Statement;
use std::collections::{HashMap, HashSet};

#[derive(Default)]
struct Inspector {
    /// Step that produced the current element; `None` for resumed input
    current: Option<usize>,
    marks: HashMap<String, Option<usize>>,
    required: HashSet<usize>,
}

impl Inspector {
    fn require(&mut self, step: Option<usize>) {
        if let Some(step) = step {
            self.required.insert(step);
        }
    }

    fn mark_step(&self, name: &str) -> Option<usize> {
        self.marks.get(name).copied().flatten()
    }

    fn require_path(&mut self, path: &FieldPath) {
        if !path.needs_data() {
            return;
        }
        let step = match &path.mark {
            Some(name) => self.mark_step(name),
            None => self.current,
        };
        self.require(step);
    }
}

/// Per-statement flag: whether the element produced by that statement must
/// carry its payload. `element_output` is set when the pipeline's results
/// are the elements themselves. `statements` must already be flattened.
pub fn load_flags(statements: &[Statement], element_output: bool) -> Vec<bool> {
    let mut inspector = Inspector::default();

    for (index, statement) in statements.iter().enumerate() {
        match statement {
            Statement::SelectVertices(_)
            | Statement::SelectEdges(_)
            | Statement::In(_)
            | Statement::Out(_)
            | Statement::Both(_)
            | Statement::InEdge(_)
            | Statement::OutEdge(_)
            | Statement::BothEdge(_)
            | Statement::InNull(_)
            | Statement::OutNull(_)
            | Statement::InEdgeNull(_)
            | Statement::OutEdgeNull(_) => inspector.current = Some(index),
            Statement::Has(expression) => {
                for key in expression.keys() {
                    inspector.require_path(&FieldPath::parse(key));
                }
            }
            Statement::HasKey(_) => inspector.require(inspector.current),
            Statement::HasLabel(_)
            | Statement::HasId(_)
            | Statement::Limit(_)
            | Statement::Skip(_)
            | Statement::Range { .. } => {}
            Statement::Distinct(fields) => {
                for field in fields {
                    inspector.require_path(&FieldPath::parse(field));
                }
            }
            Statement::Mark(name) => {
                inspector.marks.insert(name.clone(), inspector.current);
            }
            Statement::Select(names) => {
                if let [name] = names.as_slice() {
                    inspector.current = inspector.mark_step(name);
                } else {
                    for name in names {
                        let step = inspector.mark_step(name);
                        inspector.require(step);
                    }
                }
            }
            Statement::Count | Statement::Path => inspector.current = None,
            // the rewritten copy carries its payload from here on
            Statement::Fields(keys) => {
                if !keys.is_empty() {
                    inspector.require(inspector.current);
                    inspector.current = None;
                }
            }
            Statement::Unwind(_) => {
                inspector.require(inspector.current);
                inspector.current = None;
            }
            // `flatten` splices these away before compilation
            Statement::Match(_) => {}
            Statement::GroupCount(key) => {
                if let Some(key) = key {
                    inspector.require_path(&FieldPath::parse(key));
                }
                inspector.current = None;
            }
            Statement::Values(keys) => {
                if keys.is_empty() {
                    inspector.require(inspector.current);
                }
                for key in keys {
                    inspector.require_path(&FieldPath::parse(key));
                }
                inspector.current = None;
            }
            Statement::Aggregate(aggregations) => {
                for aggregation in aggregations {
                    inspector.require_path(&FieldPath::parse(&aggregation.field));
                }
                inspector.current = None;
            }
            Statement::Render(template) => {
                for path in template_paths(template) {
                    inspector.require_path(&path);
                }
                inspector.current = None;
            }
        }
    }

    if element_output {
        inspector.require(inspector.current);
    }

    (0..statements.len())
        .map(|index| inspector.required.contains(&index))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::statement::{HasExpression, Query};
    use serde_json::json;

    fn flags(query: Query, element_output: bool) -> Vec<bool> {
        load_flags(query.statements(), element_output)
    }

    #[test]
    fn test_pure_traversal_loads_only_the_result() {
        let q = Query::v(&["1"]).out(&["knows"]).out(&[]);
        assert_eq!(flags(q, true), vec![false, false, true]);

        let q = Query::v(&[]).has_label(&["Person"]).count();
        assert_eq!(flags(q, false), vec![false, false, false]);
    }

    #[test]
    fn test_has_on_payload_loads_current_step() {
        let q = Query::v(&[]).has(HasExpression::eq("name", "Alex")).out(&[]).count();
        assert_eq!(flags(q, false), vec![true, false, false, false]);

        let q = Query::v(&[]).has(HasExpression::eq("_label", "Person")).count();
        assert_eq!(flags(q, false), vec![false, false, false]);
    }

    #[test]
    fn test_mark_references_reach_back() {
        let q = Query::v(&[])
            .mark("a")
            .out(&[])
            .has(HasExpression::eq("$a.name", "Alex"))
            .count();
        assert_eq!(flags(q, false), vec![true, false, false, false, false]);

        let q = Query::v(&[]).mark("a").out(&[]).mark("b").select(&["a", "b"]);
        assert_eq!(flags(q, false), vec![true, false, true, false, false]);

        let q = Query::v(&[]).mark("a").out(&[]).select(&["a"]);
        assert_eq!(flags(q, true), vec![true, false, false, false]);
    }

    #[test]
    fn test_render_and_values() {
        let q = Query::v(&[]).mark("a").out_e(&[]).render(json!({"who": "$a.name", "l": "$._label"}));
        assert_eq!(flags(q, false), vec![true, false, false, false]);

        let q = Query::e(&[]).values(&["weight"]);
        assert_eq!(flags(q, false), vec![true, false]);
    }

    #[test]
    fn test_projections_load_their_input() {
        let q = Query::v(&["1"]).out(&[]).fields(&["name"]).out(&[]).count();
        assert_eq!(flags(q, false), vec![false, true, false, false, false]);

        // the unwound copy is already loaded when it is the result
        let q = Query::v(&[]).unwind("tags");
        assert_eq!(flags(q, true), vec![true, false]);

        let q = Query::v(&[]).out_null(&[]).path();
        assert_eq!(flags(q, false), vec![false, false, false]);
    }
}

//! Graph statements
//!
//! A query is an ordered list of `Statement`s. The set of statements is
//! closed; the compiler matches on it exhaustively. Statements round-trip
//! through JSON so front-ends can hand over a serialized list.

use super::{ExecutionError, ExecutionResult};
use crate::graph::PropertyValue;
use serde::{Deserialize, Serialize};

/// Comparison applied by a `Has` condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    /// Strictly between `[lo, hi]`
    Inside,
    /// Strictly outside `[lo, hi]`
    Outside,
    /// `lo <= value < hi`
    Between,
    /// Value is one of a list
    Within,
    /// Value is none of a list
    Without,
    /// Array or string field contains the value
    Contains,
    /// String field matches a regular expression
    Regex,
}

/// A single field test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub key: String,
    pub predicate: Predicate,
    pub value: PropertyValue,
}

/// Boolean expression over field tests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HasExpression {
    And(Vec<HasExpression>),
    Or(Vec<HasExpression>),
    Not(Box<HasExpression>),
    Condition(Condition),
}

impl HasExpression {
    pub fn condition(key: impl Into<String>, predicate: Predicate, value: impl Into<PropertyValue>) -> Self {
        HasExpression::Condition(Condition {
            key: key.into(),
            predicate,
            value: value.into(),
        })
    }

    pub fn eq(key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        Self::condition(key, Predicate::Eq, value)
    }

    pub fn neq(key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        Self::condition(key, Predicate::Neq, value)
    }

    pub fn gt(key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        Self::condition(key, Predicate::Gt, value)
    }

    pub fn gte(key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        Self::condition(key, Predicate::Gte, value)
    }

    pub fn lt(key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        Self::condition(key, Predicate::Lt, value)
    }

    pub fn lte(key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        Self::condition(key, Predicate::Lte, value)
    }

    pub fn between(key: impl Into<String>, lo: impl Into<PropertyValue>, hi: impl Into<PropertyValue>) -> Self {
        Self::condition(key, Predicate::Between, vec![lo.into(), hi.into()])
    }

    pub fn within<V: Into<PropertyValue>>(key: impl Into<String>, values: Vec<V>) -> Self {
        let values: Vec<PropertyValue> = values.into_iter().map(Into::into).collect();
        Self::condition(key, Predicate::Within, values)
    }

    pub fn contains(key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        Self::condition(key, Predicate::Contains, value)
    }

    pub fn and(parts: Vec<HasExpression>) -> Self {
        HasExpression::And(parts)
    }

    pub fn or(parts: Vec<HasExpression>) -> Self {
        HasExpression::Or(parts)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(inner: HasExpression) -> Self {
        HasExpression::Not(Box::new(inner))
    }

    /// Every field key tested anywhere in the expression
    pub fn keys(&self) -> Vec<&str> {
        let mut keys = Vec::new();
        self.collect_keys(&mut keys);
        keys
    }

    fn collect_keys<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            HasExpression::And(parts) | HasExpression::Or(parts) => {
                for part in parts {
                    part.collect_keys(out);
                }
            }
            HasExpression::Not(inner) => inner.collect_keys(out),
            HasExpression::Condition(cond) => out.push(&cond.key),
        }
    }
}

/// Bucketing applied by an `Aggregate` statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationKind {
    /// Count per distinct value, largest first
    Term { size: Option<usize> },
    /// Count per fixed-width numeric bucket
    Histogram { interval: f64 },
    /// Interpolated percentiles of a numeric field
    Percentile { percents: Vec<f64> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
    pub name: String,
    pub field: String,
    pub kind: AggregationKind,
}

impl Aggregation {
    pub fn term(name: impl Into<String>, field: impl Into<String>, size: Option<usize>) -> Self {
        Self {
            name: name.into(),
            field: field.into(),
            kind: AggregationKind::Term { size },
        }
    }

    pub fn histogram(name: impl Into<String>, field: impl Into<String>, interval: f64) -> Self {
        Self {
            name: name.into(),
            field: field.into(),
            kind: AggregationKind::Histogram { interval },
        }
    }

    pub fn percentile(name: impl Into<String>, field: impl Into<String>, percents: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            field: field.into(),
            kind: AggregationKind::Percentile { percents },
        }
    }
}

/// One step of a traversal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Statement {
    /// `V(ids)`; empty ids select every vertex
    SelectVertices(Vec<String>),
    /// `E(ids)`; empty ids select every edge
    SelectEdges(Vec<String>),
    Has(HasExpression),
    HasLabel(Vec<String>),
    HasId(Vec<String>),
    HasKey(Vec<String>),
    In(Vec<String>),
    Out(Vec<String>),
    Both(Vec<String>),
    InEdge(Vec<String>),
    OutEdge(Vec<String>),
    BothEdge(Vec<String>),
    /// Like `in`, but a vertex with no match moves on with no current
    /// element instead of being dropped
    InNull(Vec<String>),
    OutNull(Vec<String>),
    InEdgeNull(Vec<String>),
    OutEdgeNull(Vec<String>),
    /// Project the current element's payload; `-key` drops a field
    Fields(Vec<String>),
    /// One traveler per item of an array field
    Unwind(String),
    /// Elements visited so far
    Path,
    /// Sub-queries run one after another on the same travelers
    Match(Vec<Vec<Statement>>),
    Limit(u64),
    Skip(u64),
    Range { start: u64, stop: u64 },
    Count,
    GroupCount(Option<String>),
    Distinct(Vec<String>),
    Mark(String),
    Select(Vec<String>),
    Values(Vec<String>),
    Aggregate(Vec<Aggregation>),
    Render(serde_json::Value),
}

impl Statement {
    /// Traversal-language name used in error messages
    pub fn name(&self) -> &'static str {
        match self {
            Statement::SelectVertices(_) => "V",
            Statement::SelectEdges(_) => "E",
            Statement::Has(_) => "has",
            Statement::HasLabel(_) => "hasLabel",
            Statement::HasId(_) => "hasId",
            Statement::HasKey(_) => "hasKey",
            Statement::In(_) => "in",
            Statement::Out(_) => "out",
            Statement::Both(_) => "both",
            Statement::InEdge(_) => "inE",
            Statement::OutEdge(_) => "outE",
            Statement::BothEdge(_) => "bothE",
            Statement::InNull(_) => "inNull",
            Statement::OutNull(_) => "outNull",
            Statement::InEdgeNull(_) => "inENull",
            Statement::OutEdgeNull(_) => "outENull",
            Statement::Fields(_) => "fields",
            Statement::Unwind(_) => "unwind",
            Statement::Path => "path",
            Statement::Match(_) => "match",
            Statement::Limit(_) => "limit",
            Statement::Skip(_) => "skip",
            Statement::Range { .. } => "range",
            Statement::Count => "count",
            Statement::GroupCount(_) => "groupCount",
            Statement::Distinct(_) => "distinct",
            Statement::Mark(_) => "as",
            Statement::Select(_) => "select",
            Statement::Values(_) => "values",
            Statement::Aggregate(_) => "aggregate",
            Statement::Render(_) => "render",
        }
    }
}

/// Splice every `match` in place, recursively
pub fn flatten(statements: &[Statement]) -> Vec<Statement> {
    let mut out = Vec::with_capacity(statements.len());
    for statement in statements {
        match statement {
            Statement::Match(queries) => {
                for query in queries {
                    out.extend(flatten(query));
                }
            }
            other => out.push(other.clone()),
        }
    }
    out
}

/// Parse a JSON array of statements
pub fn parse_statements(json: &str) -> ExecutionResult<Vec<Statement>> {
    serde_json::from_str(json).map_err(|e| {
        let message = e.to_string();
        if message.contains("unknown variant") {
            ExecutionError::InvalidQuery(format!("unknown statement: {}", message))
        } else {
            ExecutionError::InvalidQuery(format!("malformed statement list: {}", message))
        }
    })
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Fluent builder for statement lists
///
/// ```
/// use trellis::query::Query;
/// let q = Query::v(&["1"]).out(&["knows"]).count();
/// assert_eq!(q.statements().len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    statements: Vec<Statement>,
}

impl Query {
    pub fn v(ids: &[&str]) -> Self {
        Self {
            statements: vec![Statement::SelectVertices(strings(ids))],
        }
    }

    pub fn e(ids: &[&str]) -> Self {
        Self {
            statements: vec![Statement::SelectEdges(strings(ids))],
        }
    }

    /// Start from an arbitrary statement list
    pub fn from_statements(statements: Vec<Statement>) -> Self {
        Self { statements }
    }

    fn push(mut self, statement: Statement) -> Self {
        self.statements.push(statement);
        self
    }

    pub fn has(self, expression: HasExpression) -> Self {
        self.push(Statement::Has(expression))
    }

    pub fn has_label(self, labels: &[&str]) -> Self {
        self.push(Statement::HasLabel(strings(labels)))
    }

    pub fn has_id(self, ids: &[&str]) -> Self {
        self.push(Statement::HasId(strings(ids)))
    }

    pub fn has_key(self, keys: &[&str]) -> Self {
        self.push(Statement::HasKey(strings(keys)))
    }

    pub fn in_(self, labels: &[&str]) -> Self {
        self.push(Statement::In(strings(labels)))
    }

    pub fn out(self, labels: &[&str]) -> Self {
        self.push(Statement::Out(strings(labels)))
    }

    pub fn both(self, labels: &[&str]) -> Self {
        self.push(Statement::Both(strings(labels)))
    }

    pub fn in_e(self, labels: &[&str]) -> Self {
        self.push(Statement::InEdge(strings(labels)))
    }

    pub fn out_e(self, labels: &[&str]) -> Self {
        self.push(Statement::OutEdge(strings(labels)))
    }

    pub fn both_e(self, labels: &[&str]) -> Self {
        self.push(Statement::BothEdge(strings(labels)))
    }

    pub fn in_null(self, labels: &[&str]) -> Self {
        self.push(Statement::InNull(strings(labels)))
    }

    pub fn out_null(self, labels: &[&str]) -> Self {
        self.push(Statement::OutNull(strings(labels)))
    }

    pub fn in_e_null(self, labels: &[&str]) -> Self {
        self.push(Statement::InEdgeNull(strings(labels)))
    }

    pub fn out_e_null(self, labels: &[&str]) -> Self {
        self.push(Statement::OutEdgeNull(strings(labels)))
    }

    pub fn fields(self, keys: &[&str]) -> Self {
        self.push(Statement::Fields(strings(keys)))
    }

    pub fn unwind(self, field: &str) -> Self {
        self.push(Statement::Unwind(field.to_string()))
    }

    pub fn path(self) -> Self {
        self.push(Statement::Path)
    }

    /// Append each sub-query's statements in turn
    pub fn match_(self, queries: Vec<Query>) -> Self {
        self.push(Statement::Match(queries.into_iter().map(Query::into_statements).collect()))
    }

    pub fn limit(self, n: u64) -> Self {
        self.push(Statement::Limit(n))
    }

    pub fn skip(self, n: u64) -> Self {
        self.push(Statement::Skip(n))
    }

    pub fn range(self, start: u64, stop: u64) -> Self {
        self.push(Statement::Range { start, stop })
    }

    pub fn count(self) -> Self {
        self.push(Statement::Count)
    }

    pub fn group_count(self, key: Option<&str>) -> Self {
        self.push(Statement::GroupCount(key.map(str::to_string)))
    }

    pub fn distinct(self, fields: &[&str]) -> Self {
        self.push(Statement::Distinct(strings(fields)))
    }

    pub fn mark(self, name: &str) -> Self {
        self.push(Statement::Mark(name.to_string()))
    }

    pub fn select(self, names: &[&str]) -> Self {
        self.push(Statement::Select(strings(names)))
    }

    pub fn values(self, keys: &[&str]) -> Self {
        self.push(Statement::Values(strings(keys)))
    }

    pub fn aggregate(self, aggregations: Vec<Aggregation>) -> Self {
        self.push(Statement::Aggregate(aggregations))
    }

    pub fn render(self, template: serde_json::Value) -> Self {
        self.push(Statement::Render(template))
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    pub fn into_statements(self) -> Vec<Statement> {
        self.statements
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let q = Query::v(&[]).has_label(&["Person"]).mark("a").out(&["knows"]).select(&["a"]);
        assert_eq!(
            q.statements(),
            &[
                Statement::SelectVertices(vec![]),
                Statement::HasLabel(vec!["Person".to_string()]),
                Statement::Mark("a".to_string()),
                Statement::Out(vec!["knows".to_string()]),
                Statement::Select(vec!["a".to_string()]),
            ]
        );
    }

    #[test]
    fn test_expression_keys() {
        let expr = HasExpression::and(vec![
            HasExpression::eq("name", "Alex"),
            HasExpression::not(HasExpression::gt("$a.age", 30i64)),
        ]);
        assert_eq!(expr.keys(), vec!["name", "$a.age"]);
    }

    #[test]
    fn test_json_statements() {
        let parsed = parse_statements(r#"[{"select_vertices": ["1"]}, {"out": ["knows"]}, "count"]"#).unwrap();
        assert_eq!(
            parsed,
            vec![
                Statement::SelectVertices(vec!["1".to_string()]),
                Statement::Out(vec!["knows".to_string()]),
                Statement::Count,
            ]
        );
    }

    #[test]
    fn test_unknown_statement() {
        let err = parse_statements(r#"[{"teleport": []}]"#).unwrap_err();
        match err {
            ExecutionError::InvalidQuery(msg) => assert!(msg.starts_with("unknown statement")),
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(parse_statements("not json").is_err());
    }

    #[test]
    fn test_flatten_match() {
        let q = Query::v(&[]).match_(vec![
            Query::default().out(&["knows"]),
            Query::default().match_(vec![Query::default().has_label(&["Robot"])]).count(),
        ]);
        assert_eq!(q.statements().len(), 2);
        assert_eq!(
            flatten(q.statements()),
            vec![
                Statement::SelectVertices(vec![]),
                Statement::Out(vec!["knows".to_string()]),
                Statement::HasLabel(vec!["Robot".to_string()]),
                Statement::Count,
            ]
        );

        let parsed = parse_statements(r#"[{"match": [[{"out_null": []}], ["path"]]}, {"unwind": "tags"}]"#).unwrap();
        assert_eq!(
            flatten(&parsed),
            vec![Statement::OutNull(vec![]), Statement::Path, Statement::Unwind("tags".to_string())]
        );
    }
}

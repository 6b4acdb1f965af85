//! Statement compiler
//!
//! Compilation is a single left-to-right pass over the statement list that
//! tracks the shape of what flows between stages (`DataType`). Each statement
//! is checked against the shape it receives, then a small rewrite pass swaps
//! `V().hasLabel(..)` / `V().hasId(..)` heads for direct index lookups, and
//! finally every step is turned into a boxed `Stage`.

use super::aggregate::AggregateStage;
use super::inspect::load_flags;
use super::path::{Field, FieldPath};
use super::predicate::HasFilter;
use super::stages::{
    Count, Distinct, Fields, GroupCount, HasId, HasKey, HasLabel, HasStage, IncidentEdges,
    LabelScan, LookupEdges, LookupVertices, Marker, Neighbors, PathStage, Range, Render,
    SelectMany, SelectOne, Stage, Unwind, Values,
};
use super::statement::{flatten, AggregationKind, Statement};
use super::{ExecutionError, ExecutionResult};
use crate::config::DatabaseConfig;
use crate::graph::Direction;
use crate::storage::GraphInterface;
use indexmap::IndexSet;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Shape of the travelers flowing out of a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    NoData,
    VertexData,
    EdgeData,
    CountData,
    GroupCountData,
    RowData,
    ValueData,
    AggregationData,
}

impl DataType {
    pub fn is_element(&self) -> bool {
        matches!(self, DataType::VertexData | DataType::EdgeData)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::NoData => "no data",
            DataType::VertexData => "vertex data",
            DataType::EdgeData => "edge data",
            DataType::CountData => "count data",
            DataType::GroupCountData => "group count data",
            DataType::RowData => "row data",
            DataType::ValueData => "value data",
            DataType::AggregationData => "aggregation data",
        };
        write!(f, "{}", name)
    }
}

/// Static description of one compiled stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageDescriptor {
    pub name: String,
    /// Elements produced by this stage carry their payload
    pub load_data: bool,
    pub input_type: DataType,
    pub output_type: DataType,
}

pub struct CompiledStage {
    pub stage: Box<dyn Stage>,
    pub descriptor: StageDescriptor,
}

impl fmt::Debug for CompiledStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledStage")
            .field("stage", &self.stage)
            .field("descriptor", &self.descriptor)
            .finish()
    }
}

/// A compiled, not yet started pipeline
pub struct Pipeline {
    graph: Arc<dyn GraphInterface>,
    stages: Vec<CompiledStage>,
    data_type: DataType,
    mark_types: BTreeMap<String, DataType>,
    queue_capacity: usize,
    batch_size: usize,
}

impl Pipeline {
    pub fn graph(&self) -> &Arc<dyn GraphInterface> {
        &self.graph
    }

    pub fn stages(&self) -> &[CompiledStage] {
        &self.stages
    }

    pub fn descriptors(&self) -> Vec<&StageDescriptor> {
        self.stages.iter().map(|s| &s.descriptor).collect()
    }

    /// Shape of the final stage's output
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Shape recorded for every mark set by the pipeline
    pub fn mark_types(&self) -> &BTreeMap<String, DataType> {
        &self.mark_types
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("graph", &self.graph.name())
            .field("stages", &self.descriptors())
            .field("data_type", &self.data_type)
            .finish()
    }
}

/// One planned step before it becomes a `Stage`
#[derive(Debug)]
enum Plan<'s> {
    Statement(&'s Statement),
    /// `V()` or `E()` followed by `hasLabel`, answered from the label index
    LabelScan { labels: &'s [String], edges: bool },
    /// `V()` or `E()` followed by `hasId`
    IdLookup { ids: &'s [String], edges: bool },
}

struct Planned<'s> {
    plan: Plan<'s>,
    name: String,
    load_data: bool,
    input_type: DataType,
    output_type: DataType,
}

/// `[A-Za-z_][A-Za-z0-9_]*`
fn is_mark_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Type-state checker
struct Checker {
    state: DataType,
    marks: BTreeMap<String, DataType>,
}

impl Checker {
    fn require_element(&self, statement: &Statement) -> ExecutionResult<()> {
        if self.state.is_element() {
            Ok(())
        } else {
            Err(ExecutionError::invalid(
                statement,
                format!("requires vertex or edge input, found {}", self.state),
            ))
        }
    }

    fn require_vertex(&self, statement: &Statement) -> ExecutionResult<()> {
        if self.state == DataType::VertexData {
            Ok(())
        } else {
            Err(ExecutionError::invalid(
                statement,
                format!("requires vertex input, found {}", self.state),
            ))
        }
    }

    fn require_any(&self, statement: &Statement, allowed: &[DataType]) -> ExecutionResult<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(ExecutionError::invalid(
                statement,
                format!("cannot follow {}", self.state),
            ))
        }
    }

    /// Key naming a payload field of the current element
    fn check_payload_key(&self, statement: &Statement, key: &str) -> ExecutionResult<()> {
        match FieldPath::parse(key) {
            FieldPath { mark: None, field: Field::Data(parts) } if !parts.is_empty() => Ok(()),
            _ => Err(ExecutionError::invalid(
                statement,
                format!("'{}' is not a payload field of the current element", key),
            )),
        }
    }

    fn check_path(&self, statement: &Statement, path: &str) -> ExecutionResult<()> {
        match FieldPath::parse(path).mark {
            Some(name) if !self.marks.contains_key(&name) => Err(ExecutionError::invalid(
                statement,
                format!("unknown mark '{}'", name),
            )),
            _ => Ok(()),
        }
    }

    /// Validate one statement and return the resulting shape
    fn step(&mut self, statement: &Statement) -> ExecutionResult<DataType> {
        use DataType::*;

        let next = match statement {
            Statement::SelectVertices(_) | Statement::SelectEdges(_) => {
                return Err(ExecutionError::invalid(
                    statement,
                    "only allowed as the first statement",
                ));
            }
            Statement::Has(expression) => {
                self.require_element(statement)?;
                for key in expression.keys() {
                    self.check_path(statement, key)?;
                }
                HasFilter::new(expression).map_err(|e| ExecutionError::invalid(statement, e))?;
                self.state
            }
            Statement::HasLabel(_) | Statement::HasId(_) | Statement::HasKey(_) => {
                self.require_element(statement)?;
                self.state
            }
            Statement::In(_) | Statement::Out(_) | Statement::Both(_) => {
                self.require_vertex(statement)?;
                VertexData
            }
            Statement::InEdge(_) | Statement::OutEdge(_) | Statement::BothEdge(_) => {
                self.require_vertex(statement)?;
                EdgeData
            }
            Statement::InNull(_) | Statement::OutNull(_) => {
                self.require_vertex(statement)?;
                VertexData
            }
            Statement::InEdgeNull(_) | Statement::OutEdgeNull(_) => {
                self.require_vertex(statement)?;
                EdgeData
            }
            Statement::Fields(keys) => {
                self.require_element(statement)?;
                for key in keys {
                    self.check_payload_key(statement, key.strip_prefix('-').unwrap_or(key))?;
                }
                self.state
            }
            Statement::Unwind(field) => {
                self.require_element(statement)?;
                self.check_payload_key(statement, field)?;
                self.state
            }
            Statement::Path => {
                self.require_element(statement)?;
                ValueData
            }
            Statement::Match(queries) => {
                for query in queries {
                    for inner in query {
                        self.step(inner)?;
                    }
                }
                self.state
            }
            Statement::Limit(_) | Statement::Skip(_) => {
                self.require_any(statement, &[VertexData, EdgeData, RowData, ValueData])?;
                self.state
            }
            Statement::Range { start, stop } => {
                self.require_any(statement, &[VertexData, EdgeData, RowData, ValueData])?;
                if start > stop {
                    return Err(ExecutionError::invalid(
                        statement,
                        format!("start {} is past stop {}", start, stop),
                    ));
                }
                self.state
            }
            Statement::Count => {
                self.require_any(statement, &[VertexData, EdgeData, RowData, ValueData])?;
                CountData
            }
            Statement::GroupCount(key) => {
                self.require_element(statement)?;
                if let Some(key) = key {
                    self.check_path(statement, key)?;
                }
                GroupCountData
            }
            Statement::Distinct(fields) => {
                self.require_any(statement, &[VertexData, EdgeData, RowData, ValueData])?;
                for field in fields {
                    self.check_path(statement, field)?;
                }
                self.state
            }
            Statement::Mark(name) => {
                if self.state == NoData || name.is_empty() {
                    return Err(ExecutionError::invalid(statement, "requires a name and an element"));
                }
                self.require_element(statement)?;
                if !is_mark_name(name) {
                    return Err(ExecutionError::invalid(
                        statement,
                        format!("invalid mark name '{}'", name),
                    ));
                }
                self.marks.insert(name.clone(), self.state);
                self.state
            }
            Statement::Select(names) => {
                self.require_any(statement, &[VertexData, EdgeData, RowData])?;
                let mut types = Vec::with_capacity(names.len());
                for name in names {
                    match self.marks.get(name) {
                        Some(data_type) => types.push(*data_type),
                        None => {
                            return Err(ExecutionError::invalid(
                                statement,
                                format!("unknown mark '{}'", name),
                            ))
                        }
                    }
                }
                match types.as_slice() {
                    [] => return Err(ExecutionError::invalid(statement, "requires at least one mark")),
                    [single] => *single,
                    _ => RowData,
                }
            }
            Statement::Values(_) => {
                self.require_element(statement)?;
                ValueData
            }
            Statement::Aggregate(aggregations) => {
                self.require_element(statement)?;
                if aggregations.is_empty() {
                    return Err(ExecutionError::invalid(statement, "requires at least one aggregation"));
                }
                for aggregation in aggregations {
                    self.check_path(statement, &aggregation.field)?;
                    match &aggregation.kind {
                        AggregationKind::Histogram { interval } if interval.is_nan() || *interval <= 0.0 => {
                            return Err(ExecutionError::invalid(
                                statement,
                                format!("histogram '{}' needs a positive interval", aggregation.name),
                            ));
                        }
                        AggregationKind::Percentile { percents }
                            if percents.iter().any(|p| !(0.0..=100.0).contains(p)) =>
                        {
                            return Err(ExecutionError::invalid(
                                statement,
                                format!("percentile '{}' outside 0..=100", aggregation.name),
                            ));
                        }
                        _ => {}
                    }
                }
                AggregationData
            }
            Statement::Render(_) => {
                self.require_any(statement, &[VertexData, EdgeData, RowData])?;
                ValueData
            }
        };
        self.state = next;
        Ok(next)
    }
}

/// Compiles statement lists against one graph
pub struct Compiler {
    graph: Arc<dyn GraphInterface>,
    queue_capacity: usize,
    batch_size: usize,
    optimize: bool,
}

impl Compiler {
    pub fn new(graph: Arc<dyn GraphInterface>) -> Self {
        let defaults = DatabaseConfig::default();
        Self {
            graph,
            queue_capacity: defaults.queue_capacity,
            batch_size: defaults.lookup_batch_size,
            optimize: true,
        }
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Keep the plain scan-then-filter form for every statement
    pub fn without_optimizations(mut self) -> Self {
        self.optimize = false;
        self
    }

    /// Compile a full query; it must start with `V()` or `E()`
    pub fn compile(&self, statements: &[Statement]) -> ExecutionResult<Pipeline> {
        let flattened = flatten(statements);
        let statements = flattened.as_slice();
        let start = match statements.first() {
            Some(Statement::SelectVertices(_)) => DataType::VertexData,
            Some(Statement::SelectEdges(_)) => DataType::EdgeData,
            _ => {
                return Err(ExecutionError::InvalidQuery(
                    "must start with V() or E()".to_string(),
                ))
            }
        };
        let mut checker = Checker {
            state: start,
            marks: BTreeMap::new(),
        };
        let mut types = vec![(DataType::NoData, start)];
        for statement in &statements[1..] {
            let input = checker.state;
            let output = checker.step(statement)?;
            types.push((input, output));
        }
        self.assemble(statements, types, checker)
    }

    /// Compile a continuation fed by travelers of shape `input_type` whose
    /// marks have the given shapes
    pub fn compile_resumed(
        &self,
        statements: &[Statement],
        input_type: DataType,
        mark_types: BTreeMap<String, DataType>,
    ) -> ExecutionResult<Pipeline> {
        let flattened = flatten(statements);
        let statements = flattened.as_slice();
        let mut checker = Checker {
            state: input_type,
            marks: mark_types,
        };
        let mut types = Vec::with_capacity(statements.len());
        for statement in statements {
            let input = checker.state;
            let output = checker.step(statement)?;
            types.push((input, output));
        }
        self.assemble(statements, types, checker)
    }

    fn assemble(
        &self,
        statements: &[Statement],
        types: Vec<(DataType, DataType)>,
        checker: Checker,
    ) -> ExecutionResult<Pipeline> {
        let data_type = checker.state;
        let flags = load_flags(statements, data_type.is_element());
        let planned = self.plan(statements, &types, &flags);

        let mut stages = Vec::with_capacity(planned.len());
        for step in planned {
            let descriptor = StageDescriptor {
                name: step.name,
                load_data: step.load_data,
                input_type: step.input_type,
                output_type: step.output_type,
            };
            stages.push(CompiledStage {
                stage: build_stage(step.plan)?,
                descriptor,
            });
        }
        debug!(
            "Compiled {} statements into {} stages for graph '{}'",
            statements.len(),
            stages.len(),
            self.graph.name()
        );

        Ok(Pipeline {
            graph: Arc::clone(&self.graph),
            stages,
            data_type,
            mark_types: checker.marks,
            queue_capacity: self.queue_capacity,
            batch_size: self.batch_size,
        })
    }

    fn plan<'s>(
        &self,
        statements: &'s [Statement],
        types: &[(DataType, DataType)],
        flags: &[bool],
    ) -> Vec<Planned<'s>> {
        let mut planned = Vec::with_capacity(statements.len());
        let mut index = 0;

        if self.optimize && statements.len() >= 2 {
            let head = match (&statements[0], &statements[1]) {
                (Statement::SelectVertices(ids), Statement::HasLabel(labels))
                    if ids.is_empty() && self.graph.capabilities().label_index =>
                {
                    Some(Plan::LabelScan { labels, edges: false })
                }
                (Statement::SelectEdges(ids), Statement::HasLabel(labels))
                    if ids.is_empty() && self.graph.capabilities().label_index =>
                {
                    Some(Plan::LabelScan { labels, edges: true })
                }
                (Statement::SelectVertices(ids), Statement::HasId(wanted)) if ids.is_empty() => {
                    Some(Plan::IdLookup { ids: wanted, edges: false })
                }
                (Statement::SelectEdges(ids), Statement::HasId(wanted)) if ids.is_empty() => {
                    Some(Plan::IdLookup { ids: wanted, edges: true })
                }
                _ => None,
            };
            if let Some(plan) = head {
                planned.push(Planned {
                    name: format!("{}+{}", statements[0].name(), statements[1].name()),
                    plan,
                    load_data: flags[0],
                    input_type: types[0].0,
                    output_type: types[1].1,
                });
                index = 2;
            }
        }

        for (offset, statement) in statements[index..].iter().enumerate() {
            let at = index + offset;
            planned.push(Planned {
                plan: Plan::Statement(statement),
                name: statement.name().to_string(),
                load_data: flags[at],
                input_type: types[at].0,
                output_type: types[at].1,
            });
        }
        planned
    }
}

fn build_stage(plan: Plan<'_>) -> ExecutionResult<Box<dyn Stage>> {
    let statement = match plan {
        Plan::LabelScan { labels, edges } => {
            // each label scanned once, or its rows would be emitted twice
            let labels: IndexSet<&String> = labels.iter().collect();
            return Ok(Box::new(LabelScan {
                labels: labels.into_iter().cloned().collect(),
                edges,
            }))
        }
        Plan::IdLookup { ids, edges: false } => {
            return Ok(Box::new(LookupVertices {
                ids: ids.to_vec(),
                all: false,
            }))
        }
        Plan::IdLookup { ids, edges: true } => {
            return Ok(Box::new(LookupEdges {
                ids: ids.to_vec(),
                all: false,
            }))
        }
        Plan::Statement(statement) => statement,
    };

    let stage: Box<dyn Stage> = match statement {
        Statement::SelectVertices(ids) => Box::new(LookupVertices {
            ids: ids.clone(),
            all: ids.is_empty(),
        }),
        Statement::SelectEdges(ids) => Box::new(LookupEdges {
            ids: ids.clone(),
            all: ids.is_empty(),
        }),
        Statement::Has(expression) => Box::new(HasStage {
            filter: HasFilter::new(expression).map_err(|e| ExecutionError::invalid(statement, e))?,
        }),
        Statement::HasLabel(labels) => Box::new(HasLabel::new(labels)),
        Statement::HasId(ids) => Box::new(HasId::new(ids)),
        Statement::HasKey(keys) => Box::new(HasKey { keys: keys.clone() }),
        Statement::In(labels) => Box::new(Neighbors::new(Direction::In, labels)),
        Statement::Out(labels) => Box::new(Neighbors::new(Direction::Out, labels)),
        Statement::Both(labels) => Box::new(Neighbors::new(Direction::Both, labels)),
        Statement::InEdge(labels) => Box::new(IncidentEdges::new(Direction::In, labels)),
        Statement::OutEdge(labels) => Box::new(IncidentEdges::new(Direction::Out, labels)),
        Statement::BothEdge(labels) => Box::new(IncidentEdges::new(Direction::Both, labels)),
        Statement::InNull(labels) => Box::new(Neighbors::new(Direction::In, labels).keeping_unmatched()),
        Statement::OutNull(labels) => Box::new(Neighbors::new(Direction::Out, labels).keeping_unmatched()),
        Statement::InEdgeNull(labels) => {
            Box::new(IncidentEdges::new(Direction::In, labels).keeping_unmatched())
        }
        Statement::OutEdgeNull(labels) => {
            Box::new(IncidentEdges::new(Direction::Out, labels).keeping_unmatched())
        }
        Statement::Fields(keys) => Box::new(Fields::new(keys)),
        Statement::Unwind(field) => Box::new(Unwind::new(field)),
        Statement::Path => Box::new(PathStage),
        Statement::Match(_) => {
            return Err(ExecutionError::invalid(statement, "sub-queries are spliced in before planning"))
        }
        Statement::Limit(n) => Box::new(Range {
            start: 0,
            stop: Some(*n),
        }),
        Statement::Skip(n) => Box::new(Range {
            start: *n,
            stop: None,
        }),
        Statement::Range { start, stop } => Box::new(Range {
            start: *start,
            stop: Some(*stop),
        }),
        Statement::Count => Box::new(Count),
        Statement::GroupCount(key) => Box::new(GroupCount {
            key: key.as_deref().map(FieldPath::parse),
        }),
        Statement::Distinct(fields) => Box::new(Distinct {
            fields: fields.iter().map(|f| FieldPath::parse(f)).collect(),
        }),
        Statement::Mark(name) => Box::new(Marker { name: name.clone() }),
        Statement::Select(names) => match names.as_slice() {
            [name] => Box::new(SelectOne { name: name.clone() }),
            _ => Box::new(SelectMany {
                names: names.clone(),
            }),
        },
        Statement::Values(keys) => Box::new(Values {
            keys: keys.iter().map(|k| FieldPath::parse(k)).collect(),
        }),
        Statement::Aggregate(aggregations) => Box::new(AggregateStage::new(aggregations)),
        Statement::Render(template) => Box::new(Render {
            template: template.clone(),
        }),
    };
    Ok(stage)
}

/// Compile `statements` against `graph` with the queue and batch sizes of
/// `config`
pub fn compile(
    graph: Arc<dyn GraphInterface>,
    statements: &[Statement],
    config: &DatabaseConfig,
) -> ExecutionResult<Pipeline> {
    Compiler::new(graph)
        .with_queue_capacity(config.queue_capacity)
        .with_batch_size(config.lookup_batch_size)
        .compile(statements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::statement::{Aggregation, HasExpression, Predicate, Query};
    use crate::storage::{KvGraph, MemoryKv};
    use crate::graph::GraphKey;

    fn graph() -> Arc<dyn GraphInterface> {
        Arc::new(KvGraph::new("test", GraphKey(1), Arc::new(MemoryKv::new()), 100))
    }

    fn compile_query(query: Query) -> ExecutionResult<Pipeline> {
        Compiler::new(graph()).compile(query.statements())
    }

    fn invalid(query: Query) -> String {
        match compile_query(query) {
            Err(ExecutionError::InvalidQuery(message)) => message,
            other => panic!("expected InvalidQuery, got {:?}", other.map(|p| p.data_type())),
        }
    }

    #[test]
    fn test_must_start_with_lookup() {
        assert!(invalid(Query::default().count()).contains("must start with V() or E()"));
        assert!(invalid(Query::default()).contains("must start with V() or E()"));
        let twice = Query::from_statements(vec![
            Statement::SelectVertices(vec![]),
            Statement::Out(vec![]),
            Statement::SelectVertices(vec![]),
        ]);
        assert!(invalid(twice).contains("only allowed as the first statement"));
    }

    #[test]
    fn test_type_state_rules() {
        assert_eq!(compile_query(Query::v(&[]).out(&[])).unwrap().data_type(), DataType::VertexData);
        assert!(invalid(Query::v(&[]).count().out(&[])).starts_with("out:"));
        assert!(invalid(Query::e(&[]).out(&[])).contains("requires vertex input"));
        assert_eq!(compile_query(Query::v(&[]).out_e(&[])).unwrap().data_type(), DataType::EdgeData);
        assert!(invalid(Query::v(&[]).out_e(&[]).in_e(&[])).starts_with("inE:"));
        assert!(invalid(Query::v(&[]).group_count(None).has_label(&["x"])).starts_with("hasLabel:"));
        assert!(invalid(Query::v(&[]).values(&["name"]).out(&[])).starts_with("out:"));
        assert!(invalid(Query::v(&[]).range(5, 2)).starts_with("range:"));
    }

    #[test]
    fn test_marks_and_selects() {
        assert!(invalid(Query::v(&[]).mark("")).starts_with("as:"));
        assert!(invalid(Query::v(&[]).mark("1abc")).contains("invalid mark name"));
        assert!(invalid(Query::v(&[]).count().mark("a")).starts_with("as:"));
        assert!(invalid(Query::v(&[]).select(&["a"])).contains("unknown mark 'a'"));
        assert!(invalid(Query::v(&[]).has(HasExpression::eq("$a.name", "x"))).contains("unknown mark"));
        assert!(invalid(Query::v(&[]).has(HasExpression::condition("name", Predicate::Regex, "(")))
            .starts_with("has:"));

        let single = compile_query(Query::v(&[]).out_e(&[]).mark("e").out(&[]).select(&["e"])).err();
        assert!(single.is_some(), "out after outE must fail");

        let p = compile_query(Query::v(&[]).out_e(&[]).mark("e").select(&["e"])).unwrap();
        assert_eq!(p.data_type(), DataType::EdgeData);
        assert_eq!(p.mark_types().get("e"), Some(&DataType::EdgeData));

        let p = compile_query(Query::v(&[]).mark("a").out(&[]).mark("b").select(&["a", "b"])).unwrap();
        assert_eq!(p.data_type(), DataType::RowData);
    }

    #[test]
    fn test_terminal_types() {
        assert_eq!(compile_query(Query::v(&[]).count()).unwrap().data_type(), DataType::CountData);
        assert_eq!(
            compile_query(Query::v(&[]).group_count(Some("name"))).unwrap().data_type(),
            DataType::GroupCountData
        );
        assert_eq!(
            compile_query(Query::v(&[]).aggregate(vec![Aggregation::term("t", "name", None)]))
                .unwrap()
                .data_type(),
            DataType::AggregationData
        );
        assert!(invalid(Query::v(&[]).aggregate(vec![Aggregation::histogram("h", "age", 0.0)])).contains("positive"));
        assert!(invalid(Query::v(&[]).aggregate(vec![])).starts_with("aggregate:"));
    }

    #[test]
    fn test_label_scan_rewrite() {
        let p = compile_query(Query::v(&[]).has_label(&["Person"]).count()).unwrap();
        let names: Vec<_> = p.descriptors().iter().map(|d| d.name.clone()).collect();
        assert_eq!(names, vec!["V+hasLabel", "count"]);
        assert_eq!(p.descriptors()[0].output_type, DataType::VertexData);

        let p = Compiler::new(graph())
            .without_optimizations()
            .compile(Query::v(&[]).has_label(&["Person"]).count().statements())
            .unwrap();
        let names: Vec<_> = p.descriptors().iter().map(|d| d.name.clone()).collect();
        assert_eq!(names, vec!["V", "hasLabel", "count"]);

        let p = compile_query(Query::e(&[]).has_id(&["e1"])).unwrap();
        assert_eq!(p.descriptors()[0].name, "E+hasId");
        assert!(p.descriptors()[0].load_data);

        // explicit ids are not rewritten
        let p = compile_query(Query::v(&["1"]).has_label(&["Person"])).unwrap();
        assert_eq!(p.stages().len(), 2);
    }

    #[test]
    fn test_resumed_compile() {
        let mut marks = BTreeMap::new();
        marks.insert("a".to_string(), DataType::VertexData);
        let compiler = Compiler::new(graph());
        let p = compiler
            .compile_resumed(Query::default().out(&[]).select(&["a"]).statements(), DataType::VertexData, marks.clone())
            .unwrap();
        assert_eq!(p.data_type(), DataType::VertexData);
        assert!(compiler
            .compile_resumed(Query::default().out(&[]).statements(), DataType::EdgeData, marks)
            .is_err());
    }

    #[test]
    fn test_optional_steps_and_projections() {
        assert_eq!(compile_query(Query::v(&[]).out_null(&[])).unwrap().data_type(), DataType::VertexData);
        assert_eq!(compile_query(Query::v(&[]).in_e_null(&[])).unwrap().data_type(), DataType::EdgeData);
        assert!(invalid(Query::e(&[]).out_null(&[])).starts_with("outNull:"));

        let p = compile_query(Query::v(&[]).fields(&["name", "-address.zip"]).unwind("tags")).unwrap();
        assert_eq!(p.data_type(), DataType::VertexData);
        assert!(invalid(Query::v(&[]).mark("a").fields(&["$a.name"])).starts_with("fields:"));
        assert!(invalid(Query::v(&[]).unwind("_label")).starts_with("unwind:"));
        assert!(invalid(Query::v(&[]).count().fields(&["name"])).starts_with("fields:"));

        assert_eq!(compile_query(Query::v(&[]).out_e(&[]).path()).unwrap().data_type(), DataType::ValueData);
        assert!(invalid(Query::v(&[]).count().path()).starts_with("path:"));
    }

    #[test]
    fn test_match_is_spliced() {
        let p = compile_query(Query::v(&[]).match_(vec![
            Query::default().has_label(&["Person"]),
            Query::default().out(&["knows"]).mark("b"),
        ]))
        .unwrap();
        let names: Vec<_> = p.descriptors().iter().map(|d| d.name.clone()).collect();
        assert_eq!(names, vec!["V+hasLabel", "out", "as"]);
        assert_eq!(p.mark_types().get("b"), Some(&DataType::VertexData));

        assert!(invalid(Query::v(&[]).match_(vec![Query::default().count().out(&[])])).starts_with("out:"));
    }

    #[test]
    fn test_repeated_labels_scanned_once() {
        let p = compile_query(Query::v(&[]).has_label(&["Leaf", "Leaf", "Hub"])).unwrap();
        let stage = format!("{:?}", p.stages()[0].stage);
        assert_eq!(stage.matches("Leaf").count(), 1, "{}", stage);
    }
}

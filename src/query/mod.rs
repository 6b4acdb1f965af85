//! Query engine
//!
//! Statement lists are compiled into a chain of stages and executed as a
//! pipeline of blocking workers connected by bounded queues:
//!
//! ```text
//!   Vec<Statement> --compile--> Pipeline --run/resume--> stream of QueryResult
//! ```
//!
//! - `statement`: the closed statement set and the `Query` builder
//! - `compiler`: type-state validation, label-index rewrites, stage wiring
//! - `inspect`: decides which stages must load element payloads
//! - `stages`/`aggregate`: the stage implementations
//! - `runtime`: queues, workers, cancellation and the result stream

pub mod aggregate;
pub mod compiler;
pub mod inspect;
pub mod path;
pub mod predicate;
pub mod result;
pub mod runtime;
pub mod stages;
pub mod statement;
pub mod traveler;

pub use compiler::{compile, CompiledStage, Compiler, DataType, Pipeline, StageDescriptor};
pub use result::{AggregationResult, QueryResult};
pub use runtime::{resume, run, PipelineState, ResourceManager, RunningPipeline};
pub use statement::{
    flatten, parse_statements, Aggregation, AggregationKind, Condition, HasExpression, Predicate,
    Query, Statement,
};
pub use traveler::{ElementRef, Payload, Traveler};

use crate::storage::StorageError;
use thiserror::Error;

/// Query compilation and execution errors
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// Rejected at compile time; never retried
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Pipeline cancelled")]
    Cancelled,

    /// Some stages stopped early; the rows already delivered are partial
    #[error("Incomplete result: {}", .failures.join("; "))]
    Incomplete { failures: Vec<String> },

    /// A data-integrity failure stopped every stage
    #[error("Pipeline aborted: {0}")]
    Aborted(String),

    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl ExecutionError {
    pub fn is_fatal(&self) -> bool {
        match self {
            ExecutionError::Storage(e) => e.is_fatal(),
            ExecutionError::Aborted(_) => true,
            _ => false,
        }
    }

    pub(crate) fn invalid(statement: &Statement, reason: impl std::fmt::Display) -> Self {
        ExecutionError::InvalidQuery(format!("{}: {}", statement.name(), reason))
    }
}

impl From<std::io::Error> for ExecutionError {
    fn from(err: std::io::Error) -> Self {
        ExecutionError::Runtime(err.to_string())
    }
}

/// Query result type
pub type ExecutionResult<T> = Result<T, ExecutionError>;

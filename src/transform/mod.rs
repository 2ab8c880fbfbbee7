//! Response transformation subsystem.
//!
//! # Data Flow
//! ```text
//! jq_query (string)
//!     → TransformEngine::compile   (before any network call)
//!     → Program
//! decoded backend response (serde_json::Value)
//!     → TransformEngine::run(Program, value)
//!     → Vec<Value>
//!     → collapse() → Value
//! ```
//!
//! # Design Decisions
//! - The query language sits behind `compile`/`run` so it can be swapped
//!   without touching the request pipeline
//! - Collapsing is applied uniformly, whatever the engine

pub mod jq;

use serde_json::Value;

pub use jq::{JqEngine, JqProgram};

/// A query that could not be compiled.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid jq query: {message}")]
pub struct CompileError {
    pub message: String,
}

/// A compiled query that failed while running.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("jq query execution failed: {message}")]
pub struct RuntimeError {
    pub message: String,
}

/// A query language engine.
pub trait TransformEngine: Send + Sync + 'static {
    /// Compiled form of a query. Held across the upstream call, then moved
    /// to the blocking pool to run.
    type Program: Send + Sync + 'static;

    /// Compile `query`, reporting syntax and resolution errors.
    fn compile(&self, query: &str) -> Result<Self::Program, CompileError>;

    /// Run a compiled program, returning every produced value in order.
    fn run(&self, program: &Self::Program, input: Value) -> Result<Vec<Value>, RuntimeError>;

    /// Run a program and collapse its output to a single value.
    fn apply(&self, program: &Self::Program, input: Value) -> Result<Value, RuntimeError> {
        self.run(program, input).map(collapse)
    }
}

/// Reduce a result sequence to one value.
///
/// Zero results become `null`, a single result is returned unwrapped and two
/// or more become an array in production order.
pub fn collapse(mut results: Vec<Value>) -> Value {
    match results.len() {
        0 => Value::Null,
        1 => results.remove(0),
        _ => Value::Array(results),
    }
}

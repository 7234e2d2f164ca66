//! Executor boundary
//!
//! The executor owns the live execution context and all language semantics.
//! The cache engine only asks it to run a step, to serialize the context, and
//! to replace the context from a snapshot.

pub mod calc;
pub mod value;

pub use calc::CalcExecutor;
pub use value::{Parameters, Value};

use thiserror::Error;

use crate::step::{Step, StepValue};

#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The step's own computation failed
    #[error("{0}")]
    Runtime(String),

    /// The context could not be captured to bytes
    #[error("context is not serializable: {0}")]
    Serialize(String),

    /// A snapshot could not be loaded back into the context
    #[error("invalid snapshot: {0}")]
    Restore(String),
}

/// A single-occupancy step runner holding one live context
pub trait Executor {
    /// Run a step against the live context, mutating it
    fn run(&mut self, step: &Step) -> Result<StepValue, ExecutorError>;

    /// Serialize the whole live context
    fn snapshot(&self) -> Result<Vec<u8>, ExecutorError>;

    /// Replace the live context with a previously taken snapshot
    fn restore(&mut self, bytes: &[u8]) -> Result<(), ExecutorError>;
}

//! `engine` crate: workflow graph model, guard evaluation, edge
//! selection, and the execution engine that drives a single run.

pub mod error;
pub mod executor;
pub mod graph;
pub mod guard;
pub mod models;
pub mod navigator;
pub mod trace;
pub mod traits;

pub use error::{EngineError, GraphError, ResolveError};
pub use executor::{EngineConfig, Executor};
pub use graph::validate_graph;
pub use models::{Edge, Node, NodeKind, NodeRole, Workflow, WorkflowStatus};
pub use trace::{RunReport, RunStatus, Step, StepOutcome};
pub use traits::WorkflowRepository;

#[cfg(test)]
mod executor_tests;

//! Engine-level error types.

use capabilities::CapabilityError;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// GraphError
// ---------------------------------------------------------------------------

/// Structural defects in a workflow graph.  Checked once when a graph is
/// first resolved, before any run starts.
#[derive(Debug, Error, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphError {
    #[error("workflow has no start node")]
    MissingStart,

    #[error("workflow has more than one start node ('{first}' and '{second}')")]
    MultipleStarts { first: String, second: String },

    #[error("workflow has no end node")]
    MissingEnd,

    #[error("edge '{edge_id}' references unknown node '{node_id}'")]
    DanglingEdge { edge_id: String, node_id: String },

    #[error("node '{0}' has role '{1}' but carries a capability")]
    CapabilityOnPassthrough(String, String),
}

// ---------------------------------------------------------------------------
// ResolveError
// ---------------------------------------------------------------------------

/// Failures looking a workflow up through the repository.
#[derive(Debug, Error, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveError {
    /// No published version of the workflow exists.
    #[error("no published version of workflow {0}")]
    NotFound(Uuid),

    /// A stored definition failed to deserialize into a graph.
    #[error("stored definition of workflow {workflow_id} is invalid: {detail}")]
    Invalid { workflow_id: Uuid, detail: String },
}

// ---------------------------------------------------------------------------
// EngineError
// ---------------------------------------------------------------------------

/// Errors produced by the execution engine.
///
/// Structural and resolution errors are fatal before a run begins; the
/// remaining variants abort a running execution and travel inside the
/// run report together with the trace collected so far.
#[derive(Debug, Error, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Node work failed: remote call, transform, or sub-workflow
    /// resolution.
    #[error("node '{node_id}': {source}")]
    Capability {
        node_id: String,
        source: CapabilityError,
    },

    /// A node was revisited more often than the configured maximum.
    #[error("cycle detected: node '{node_id}' visited {visits} times (max {max_visits})")]
    CycleDetected {
        node_id: String,
        visits: u32,
        max_visits: u32,
    },

    /// Traversal stopped at a non-end node with no matching outgoing
    /// edge.
    #[error("dead end: node '{node_id}' has no matching outgoing edge and is not an end node")]
    DeadEnd { node_id: String },

    /// Nested sub-workflow runs exceeded the configured depth.
    #[error("sub-workflow recursion exceeded the maximum depth of {max_depth}")]
    RecursionLimit { max_depth: u32 },

    /// The run's cancellation token fired.
    #[error("run cancelled")]
    Cancelled,
}

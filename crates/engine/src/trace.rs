//! Trace and result model: the structured record of one execution.
//!
//! The engine appends one [`Step`] per node it works through and hands
//! the finished [`RunReport`] back to the caller, who may persist it as
//! an audit trail or throw it away; the engine itself never stores it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::{
    models::{NodeKind, NodeRole},
    EngineError,
};

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// How a single step ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Success,
    Failure { message: String },
}

/// One node's worth of work.
#[derive(Debug, Clone, Serialize)]
pub struct Step {
    pub node_id: String,
    pub role: NodeRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<NodeKind>,
    pub input: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: StepOutcome,
    /// Guard expressions that failed to evaluate while selecting the
    /// edge out of this node.  Non-fatal; recorded for debugging.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub guard_failures: Vec<String>,
    /// For sub-workflow nodes: the child run's full report.  Child
    /// steps are nested here, never flattened into the parent trace.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_run: Option<Box<RunReport>>,
}

// ---------------------------------------------------------------------------
// RunReport
// ---------------------------------------------------------------------------

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
}

/// The full record of one execution.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub workflow_id: Uuid,
    pub workflow_version: u32,
    pub status: RunStatus,
    pub steps: Vec<Step>,
    /// Present only when the run completed: the end node's output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_payload: Option<Value>,
    /// Present only when the run failed: the error that stopped it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<EngineError>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

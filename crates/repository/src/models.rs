//! Storage model for versioned workflows.
//!
//! A record's `definition` holds only the graph body (the node map and
//! edge list); identity, version, and status live on the record itself
//! and are authoritative.

use chrono::{DateTime, Utc};
use engine::WorkflowStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// One stored version of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRecord {
    pub id: Uuid,
    pub name: String,
    pub version: u32,
    pub status: WorkflowStatus,
    /// Graph body: `{ "nodes": { ... }, "edges": [ ... ] }`.
    pub definition: Value,
    pub created_at: DateTime<Utc>,
}

impl WorkflowRecord {
    pub fn is_published(&self) -> bool {
        self.status == WorkflowStatus::Published
    }
}

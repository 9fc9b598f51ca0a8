//! Core domain models for the workflow engine.
//!
//! These types are the source of truth for what a workflow looks like
//! in memory.  The persisted representation is exactly their JSON form:
//! a node-id → node-record map plus an ordered list of edge records.

use std::collections::BTreeMap;

use capabilities::CapabilityDescriptor;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// Publication status of a workflow version.  Only published versions
/// are eligible for execution and sub-workflow resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    #[default]
    Draft,
    Published,
}

/// An immutable workflow graph snapshot, identified by (id, version).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Uuid,
    pub name: String,
    #[serde(default = "first_version")]
    pub version: u32,
    #[serde(default)]
    pub status: WorkflowStatus,
    /// Node records keyed by their id (unique within the workflow).
    pub nodes: BTreeMap<String, Node>,
    pub edges: Vec<Edge>,
}

fn first_version() -> u32 {
    1
}

impl Workflow {
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Outgoing edges of `node_id`, sorted by ordinal position.
    pub fn outgoing(&self, node_id: &str) -> Vec<&Edge> {
        let mut edges: Vec<&Edge> = self
            .edges
            .iter()
            .filter(|edge| edge.source == node_id)
            .collect();
        edges.sort_by_key(|edge| edge.ordinal);
        edges
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// Structural role of a node within its workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    Start,
    End,
    Task,
}

/// The kind of work a task node performs.  Derived from the capability
/// descriptor rather than stored, so role × kind dispatch is a single
/// exhaustive match per step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    RemoteCall,
    LocalTransform,
    SubWorkflow,
    /// A routing-only node: no capability, payload passes through.
    Branch,
}

/// A single node record.  The id is the key it is stored under in
/// [`Workflow::nodes`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub role: NodeRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<CapabilityDescriptor>,
    /// Editor-facing metadata (position, label, colours).  Ignored by
    /// the engine.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub display: Value,
}

impl Node {
    /// Task-kind of this node; `None` unless the role is `task`.
    pub fn kind(&self) -> Option<NodeKind> {
        match self.role {
            NodeRole::Start | NodeRole::End => None,
            NodeRole::Task => Some(match self.capability {
                Some(CapabilityDescriptor::Remote { .. }) => NodeKind::RemoteCall,
                Some(CapabilityDescriptor::Transform { .. }) => NodeKind::LocalTransform,
                Some(CapabilityDescriptor::Subworkflow { .. }) => NodeKind::SubWorkflow,
                None => NodeKind::Branch,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Edge
// ---------------------------------------------------------------------------

/// Directed edge between two nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    /// Boolean guard expression; absent means unconditional.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard: Option<String>,
    /// Position among the source node's outgoing edges; the navigator
    /// scans edges in this order, so ordinal encodes branch priority.
    #[serde(default)]
    pub ordinal: u32,
}

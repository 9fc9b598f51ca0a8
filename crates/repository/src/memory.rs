//! In-memory workflow store.
//!
//! Backs the CLI and tests.  Records are grouped per workflow id and
//! ordered by version; all mutation goes through a single `RwLock`, so
//! concurrent runs resolving workflows only contend on reads.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;
use engine::{
    error::ResolveError, Edge, Node, Workflow, WorkflowRepository, WorkflowStatus,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::{error::RepositoryError, models::WorkflowRecord};

/// The graph body stored in a record's `definition` field.
#[derive(Debug, Deserialize)]
struct StoredGraph {
    nodes: BTreeMap<String, Node>,
    #[serde(default)]
    edges: Vec<Edge>,
}

#[derive(Default)]
pub struct InMemoryRepository {
    records: RwLock<HashMap<Uuid, Vec<WorkflowRecord>>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    // Poisoning only happens if a writer panicked; the map itself is
    // still coherent, so recover the guard instead of propagating.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<Uuid, Vec<WorkflowRecord>>> {
        self.records.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Uuid, Vec<WorkflowRecord>>> {
        self.records.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Create a brand-new workflow with a version-1 draft.
    pub fn create_draft(&self, name: &str, definition: Value) -> WorkflowRecord {
        let record = WorkflowRecord {
            id: Uuid::new_v4(),
            name: name.to_string(),
            version: 1,
            status: WorkflowStatus::Draft,
            definition,
            created_at: Utc::now(),
        };
        self.write().insert(record.id, vec![record.clone()]);
        record
    }

    /// Append the next version of an existing workflow as a draft.
    pub fn save_draft(
        &self,
        workflow_id: Uuid,
        definition: Value,
    ) -> Result<WorkflowRecord, RepositoryError> {
        let mut records = self.write();
        let versions = records
            .get_mut(&workflow_id)
            .ok_or(RepositoryError::NotFound(workflow_id))?;
        // Versions are append-only, so the last record has the highest
        // version number.
        let last = versions
            .last()
            .ok_or(RepositoryError::NotFound(workflow_id))?;
        let record = WorkflowRecord {
            id: workflow_id,
            name: last.name.clone(),
            version: last.version + 1,
            status: WorkflowStatus::Draft,
            definition,
            created_at: Utc::now(),
        };
        versions.push(record.clone());
        Ok(record)
    }

    /// Freeze a draft version, making it eligible for execution and
    /// sub-workflow resolution.
    pub fn publish(
        &self,
        workflow_id: Uuid,
        version: u32,
    ) -> Result<WorkflowRecord, RepositoryError> {
        let mut records = self.write();
        let versions = records
            .get_mut(&workflow_id)
            .ok_or(RepositoryError::NotFound(workflow_id))?;
        let record = versions
            .iter_mut()
            .find(|r| r.version == version)
            .ok_or(RepositoryError::VersionNotFound {
                workflow_id,
                version,
            })?;
        record.status = WorkflowStatus::Published;
        info!("published workflow {workflow_id} v{version}");
        Ok(record.clone())
    }

    /// The highest published version of a workflow, if any.
    pub fn latest_published(
        &self,
        workflow_id: Uuid,
    ) -> Result<WorkflowRecord, RepositoryError> {
        let records = self.read();
        let versions = records
            .get(&workflow_id)
            .ok_or(RepositoryError::NotFound(workflow_id))?;
        versions
            .iter()
            .rev()
            .find(|r| r.is_published())
            .cloned()
            .ok_or(RepositoryError::NotPublished { workflow_id })
    }

    /// Store a fully-formed workflow snapshot as a published record,
    /// keeping its id and version.  Used when loading graph files from
    /// disk rather than authoring through the draft lifecycle.
    pub fn insert_published(
        &self,
        workflow: &Workflow,
    ) -> Result<WorkflowRecord, serde_json::Error> {
        let definition = serde_json::json!({
            "nodes": serde_json::to_value(&workflow.nodes)?,
            "edges": serde_json::to_value(&workflow.edges)?,
        });
        let record = WorkflowRecord {
            id: workflow.id,
            name: workflow.name.clone(),
            version: workflow.version,
            status: WorkflowStatus::Published,
            definition,
            created_at: Utc::now(),
        };
        let mut records = self.write();
        let versions = records.entry(workflow.id).or_default();
        versions.push(record.clone());
        versions.sort_by_key(|r| r.version);
        Ok(record)
    }
}

#[async_trait]
impl WorkflowRepository for InMemoryRepository {
    async fn resolve_published(&self, workflow_id: Uuid) -> Result<Workflow, ResolveError> {
        let record = self
            .latest_published(workflow_id)
            .map_err(|_| ResolveError::NotFound(workflow_id))?;
        let graph: StoredGraph =
            serde_json::from_value(record.definition).map_err(|err| ResolveError::Invalid {
                workflow_id,
                detail: err.to_string(),
            })?;
        Ok(Workflow {
            id: record.id,
            name: record.name,
            version: record.version,
            status: WorkflowStatus::Published,
            nodes: graph.nodes,
            edges: graph.edges,
        })
    }
}

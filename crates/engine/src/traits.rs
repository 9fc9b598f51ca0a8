//! The `WorkflowRepository` trait: how the engine resolves workflows.
//!
//! Resolution strategy (in-memory, file-backed, database-backed) is the
//! implementer's concern; the engine only needs published graph
//! snapshots.  Implementations must be safe for concurrent reads, since
//! independent runs (including nested sub-workflow runs) resolve
//! through the same repository.

use async_trait::async_trait;
use uuid::Uuid;

use crate::{error::ResolveError, Workflow};

#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    /// Resolve a workflow id to its latest *published* version.  Draft
    /// versions are never eligible.
    async fn resolve_published(&self, workflow_id: Uuid) -> Result<Workflow, ResolveError>;
}

//! Repository error types.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("workflow {0} does not exist")]
    NotFound(Uuid),

    #[error("workflow {workflow_id} has no version {version}")]
    VersionNotFound { workflow_id: Uuid, version: u32 },

    #[error("workflow {workflow_id} has no published version")]
    NotPublished { workflow_id: Uuid },
}

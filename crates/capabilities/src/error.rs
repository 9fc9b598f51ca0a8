//! Capability-level error type.

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Errors produced while performing one unit of node work.
///
/// The engine treats every variant the same way: the run transitions to
/// `Failed` and the error is surfaced with the trace collected so far.
#[derive(Debug, Error, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityError {
    /// A remote call failed: non-2xx status, transport failure, or an
    /// unparsable response body.  `status` is absent for transport-level
    /// failures; `detail` carries the upstream status line and body.
    #[error("capability invocation failed: {detail}")]
    Invocation {
        status: Option<u16>,
        detail: String,
    },

    /// A remote call exceeded the configured timeout.
    #[error("capability timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// A local-transform descriptor named a transform that is not
    /// registered.
    #[error("unknown transform '{0}'")]
    UnknownTransform(String),

    /// A sub-workflow descriptor referenced a workflow with no published
    /// version.
    #[error("no published version of workflow {workflow_id}")]
    Resolution { workflow_id: Uuid },
}

impl CapabilityError {
    /// Upstream HTTP status, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Invocation { status, .. } => *status,
            _ => None,
        }
    }
}

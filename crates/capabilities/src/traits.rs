//! The `CapabilityInvoker` trait: the contract for performing node work.

use async_trait::async_trait;
use serde_json::Value;

use crate::{CapabilityDescriptor, CapabilityError};

/// Performs one unit of work: given a capability descriptor and an input
/// payload, produce an output payload or fail.
///
/// Implementations handle the remote-call and local-transform kinds.
/// Sub-workflow descriptors are dispatched by the execution engine
/// itself (the engine is the thing a sub-workflow invokes), so an
/// invoker handed one should fail rather than guess.
#[async_trait]
pub trait CapabilityInvoker: Send + Sync {
    async fn invoke(
        &self,
        descriptor: &CapabilityDescriptor,
        payload: Value,
    ) -> Result<Value, CapabilityError>;
}

//! The default invoker: HTTP remote calls plus the built-in transforms.

use async_trait::async_trait;
use serde_json::Value;

use crate::{
    CapabilityDescriptor, CapabilityError, CapabilityInvoker, HttpInvoker, RemoteConfig,
    TransformRegistry,
};

/// Production invoker: dispatches remote calls through [`HttpInvoker`]
/// and local transforms through a [`TransformRegistry`].
pub struct DefaultInvoker {
    http: HttpInvoker,
    transforms: TransformRegistry,
}

impl DefaultInvoker {
    pub fn new(config: RemoteConfig) -> Self {
        Self {
            http: HttpInvoker::new(config),
            transforms: TransformRegistry::builtin(),
        }
    }

    /// Swap in a custom transform registry.
    pub fn with_transforms(mut self, transforms: TransformRegistry) -> Self {
        self.transforms = transforms;
        self
    }
}

impl Default for DefaultInvoker {
    fn default() -> Self {
        Self::new(RemoteConfig::default())
    }
}

#[async_trait]
impl CapabilityInvoker for DefaultInvoker {
    async fn invoke(
        &self,
        descriptor: &CapabilityDescriptor,
        payload: Value,
    ) -> Result<Value, CapabilityError> {
        match descriptor {
            CapabilityDescriptor::Remote { address, verb } => {
                self.http.call(address, *verb, &payload).await
            }
            CapabilityDescriptor::Transform { name, parameters } => {
                self.transforms.apply(name, parameters, payload)
            }
            // The engine resolves sub-workflows before calling the
            // invoker; reaching this arm means a dispatch bug upstream.
            CapabilityDescriptor::Subworkflow { workflow_id } => {
                Err(CapabilityError::Invocation {
                    status: None,
                    detail: format!(
                        "sub-workflow {workflow_id} must be dispatched by the engine"
                    ),
                })
            }
        }
    }
}

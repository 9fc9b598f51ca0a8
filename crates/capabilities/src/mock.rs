//! `MockInvoker`, a scripted test double for `CapabilityInvoker`.
//!
//! Rules are keyed by the descriptor's natural name (remote address,
//! transform name, or sub-workflow id), so a single mock can stand in
//! for every capability a test workflow touches.  Every call is
//! recorded for assertions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::{CapabilityDescriptor, CapabilityError, CapabilityInvoker};

/// What the mock does when a rule matches.
#[derive(Debug, Clone)]
pub enum MockOutcome {
    /// Return this JSON value as the output payload.
    Return(Value),
    /// Fail with this capability error.
    Fail(CapabilityError),
}

/// A mock invoker that records every call and answers from a rule table.
///
/// Descriptors without a matching rule echo the input payload back, so
/// pass-through pipelines need no setup at all.
#[derive(Default)]
pub struct MockInvoker {
    rules: HashMap<String, MockOutcome>,
    calls: Arc<Mutex<Vec<(String, Value)>>>,
}

impl MockInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    fn recorded(&self) -> std::sync::MutexGuard<'_, Vec<(String, Value)>> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Succeed with `value` whenever `key` is invoked.
    pub fn returning(mut self, key: impl Into<String>, value: Value) -> Self {
        self.rules.insert(key.into(), MockOutcome::Return(value));
        self
    }

    /// Fail with `error` whenever `key` is invoked.
    pub fn failing(mut self, key: impl Into<String>, error: CapabilityError) -> Self {
        self.rules.insert(key.into(), MockOutcome::Fail(error));
        self
    }

    /// Total number of invocations seen.
    pub fn call_count(&self) -> usize {
        self.recorded().len()
    }

    /// Number of invocations whose descriptor matched `key`.
    pub fn calls_for(&self, key: &str) -> usize {
        self.recorded().iter().filter(|(k, _)| k == key).count()
    }

    /// Input payloads seen for `key`, in call order.
    pub fn inputs_for(&self, key: &str) -> Vec<Value> {
        self.recorded()
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, payload)| payload.clone())
            .collect()
    }
}

/// The rule key of a descriptor.
fn key_of(descriptor: &CapabilityDescriptor) -> String {
    match descriptor {
        CapabilityDescriptor::Remote { address, .. } => address.clone(),
        CapabilityDescriptor::Transform { name, .. } => name.clone(),
        CapabilityDescriptor::Subworkflow { workflow_id } => workflow_id.to_string(),
    }
}

#[async_trait]
impl CapabilityInvoker for MockInvoker {
    async fn invoke(
        &self,
        descriptor: &CapabilityDescriptor,
        payload: Value,
    ) -> Result<Value, CapabilityError> {
        let key = key_of(descriptor);
        self.recorded().push((key.clone(), payload.clone()));

        match self.rules.get(&key) {
            Some(MockOutcome::Return(value)) => Ok(value.clone()),
            Some(MockOutcome::Fail(error)) => Err(error.clone()),
            None => Ok(payload),
        }
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::HttpVerb;
    use serde_json::json;

    #[tokio::test]
    async fn scripted_rule_wins_over_echo() {
        let mock = MockInvoker::new().returning("diagnose", json!({ "reason": "db" }));
        let descriptor = CapabilityDescriptor::Transform {
            name: "diagnose".into(),
            parameters: Value::Null,
        };

        let out = mock.invoke(&descriptor, json!({ "in": 1 })).await.unwrap();
        assert_eq!(out, json!({ "reason": "db" }));
        assert_eq!(mock.calls_for("diagnose"), 1);
        assert_eq!(mock.inputs_for("diagnose"), vec![json!({ "in": 1 })]);
    }

    #[tokio::test]
    async fn unscripted_descriptor_echoes_payload() {
        let mock = MockInvoker::new();
        let descriptor = CapabilityDescriptor::Remote {
            address: "http://example.test/x".into(),
            verb: HttpVerb::Post,
        };

        let out = mock.invoke(&descriptor, json!({ "echo": true })).await.unwrap();
        assert_eq!(out, json!({ "echo": true }));
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn scripted_failure_is_returned() {
        let mock = MockInvoker::new().failing(
            "http://example.test/boom",
            CapabilityError::Invocation {
                status: Some(500),
                detail: "status 500: upstream exploded".into(),
            },
        );
        let descriptor = CapabilityDescriptor::Remote {
            address: "http://example.test/boom".into(),
            verb: HttpVerb::Get,
        };

        let err = mock.invoke(&descriptor, json!({})).await.unwrap_err();
        assert_eq!(err.status(), Some(500));
    }
}

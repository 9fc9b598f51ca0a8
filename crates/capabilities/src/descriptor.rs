//! Capability descriptors: the tagged union a task node carries.
//!
//! A descriptor is opaque to the graph model; it is interpreted only at
//! execution time.  The three kinds map onto the three ways a node can
//! do work: call out over HTTP, transform the payload locally, or hand
//! the payload to another workflow.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// HttpVerb
// ---------------------------------------------------------------------------

/// HTTP method used by a remote-call capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpVerb {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpVerb {
    /// Query-style verbs serialize the payload as query parameters;
    /// everything else sends it as a JSON body.
    pub fn sends_query(self) -> bool {
        matches!(self, Self::Get | Self::Delete)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

// ---------------------------------------------------------------------------
// CapabilityDescriptor
// ---------------------------------------------------------------------------

/// What a task node does when it is reached.
///
/// Owned by the node; immutable once the graph snapshot is taken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CapabilityDescriptor {
    /// Perform an HTTP request against `address` using `verb`.
    Remote { address: String, verb: HttpVerb },

    /// Apply a statically registered payload transformation.
    Transform {
        name: String,
        #[serde(default)]
        parameters: Value,
    },

    /// Run another workflow (latest published version) with the current
    /// payload as its input.
    Subworkflow { workflow_id: Uuid },
}

impl CapabilityDescriptor {
    /// Short label used in logs and step records.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Remote { .. } => "remote_call",
            Self::Transform { .. } => "local_transform",
            Self::Subworkflow { .. } => "sub_workflow",
        }
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn remote_descriptor_round_trips() {
        let raw = json!({
            "type": "remote",
            "address": "http://127.0.0.1:8000/fault-diagnosis",
            "verb": "POST"
        });
        let descriptor: CapabilityDescriptor = serde_json::from_value(raw).unwrap();
        assert!(matches!(
            descriptor,
            CapabilityDescriptor::Remote { ref address, verb: HttpVerb::Post }
                if address == "http://127.0.0.1:8000/fault-diagnosis"
        ));
    }

    #[test]
    fn transform_parameters_default_to_null() {
        let raw = json!({ "type": "transform", "name": "project" });
        let descriptor: CapabilityDescriptor = serde_json::from_value(raw).unwrap();
        assert!(matches!(
            descriptor,
            CapabilityDescriptor::Transform { ref name, ref parameters }
                if name == "project" && parameters.is_null()
        ));
    }

    #[test]
    fn query_style_verbs() {
        assert!(HttpVerb::Get.sends_query());
        assert!(HttpVerb::Delete.sends_query());
        assert!(!HttpVerb::Post.sends_query());
        assert!(!HttpVerb::Put.sends_query());
    }
}

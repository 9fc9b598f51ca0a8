//! Local payload transformations.
//!
//! Transforms are pure functions over the payload, registered under a
//! fixed name at construction time.  A workflow definition can only
//! reference names that exist in the registry; there is no dynamic
//! code loading on this path.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::CapabilityError;

/// Signature of a registered transform: `(parameters, payload) -> payload`.
pub type TransformFn = fn(&Value, Value) -> Result<Value, CapabilityError>;

// ---------------------------------------------------------------------------
// TransformRegistry
// ---------------------------------------------------------------------------

/// Maps transform names to their implementations.
pub struct TransformRegistry {
    entries: HashMap<String, TransformFn>,
}

impl TransformRegistry {
    /// Registry with the built-in transforms (`project`, `remap`).
    pub fn builtin() -> Self {
        let mut registry = Self {
            entries: HashMap::new(),
        };
        registry.register("project", project);
        registry.register("remap", remap);
        registry
    }

    /// Empty registry, for callers that want full control over the set.
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, transform: TransformFn) {
        self.entries.insert(name.into(), transform);
    }

    /// Apply the named transform.
    ///
    /// # Errors
    /// [`CapabilityError::UnknownTransform`] if `name` is not registered;
    /// otherwise whatever the transform itself returns.
    pub fn apply(
        &self,
        name: &str,
        parameters: &Value,
        payload: Value,
    ) -> Result<Value, CapabilityError> {
        let transform = self
            .entries
            .get(name)
            .ok_or_else(|| CapabilityError::UnknownTransform(name.to_string()))?;
        transform(parameters, payload)
    }
}

impl Default for TransformRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

// ---------------------------------------------------------------------------
// Built-in transforms
// ---------------------------------------------------------------------------

/// `project`: keep only the named top-level fields.
///
/// Parameters: `{ "fields": ["a", "b", …] }`.  Fields absent from the
/// payload are simply omitted from the output.
fn project(parameters: &Value, payload: Value) -> Result<Value, CapabilityError> {
    let fields = parameters
        .get("fields")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("project", "expected a 'fields' array"))?;

    let source = match payload {
        Value::Object(map) => map,
        other => {
            return Err(malformed(
                "project",
                &format!("payload must be an object, got {}", json_type(&other)),
            ))
        }
    };

    let mut out = Map::new();
    for field in fields {
        let key = field
            .as_str()
            .ok_or_else(|| malformed("project", "'fields' entries must be strings"))?;
        if let Some(value) = source.get(key) {
            out.insert(key.to_string(), value.clone());
        }
    }

    Ok(Value::Object(out))
}

/// `remap`: build a new payload from dotted-path lookups into the input.
///
/// Parameters: `{ "mapping": { "out_key": "dotted.path", … } }`.  A path
/// that resolves to nothing maps to JSON `null` rather than failing, so
/// downstream guards can test for the absence explicitly.
fn remap(parameters: &Value, payload: Value) -> Result<Value, CapabilityError> {
    let mapping = parameters
        .get("mapping")
        .and_then(Value::as_object)
        .ok_or_else(|| malformed("remap", "expected a 'mapping' object"))?;

    let mut out = Map::new();
    for (out_key, path) in mapping {
        let path = path
            .as_str()
            .ok_or_else(|| malformed("remap", "'mapping' values must be path strings"))?;
        let value = lookup_path(&payload, path).cloned().unwrap_or(Value::Null);
        out.insert(out_key.clone(), value);
    }

    Ok(Value::Object(out))
}

/// Resolve a dotted path (`"a.b.c"`) against a JSON value.
pub fn lookup_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn malformed(transform: &str, detail: &str) -> CapabilityError {
    CapabilityError::Invocation {
        status: None,
        detail: format!("transform '{transform}': {detail}"),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

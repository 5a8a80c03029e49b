//! Typed access to tool call arguments.

use crate::error::MeshError;

/// Wrapper around structured tool call arguments providing typed extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolArguments {
    value: serde_json::Value,
}

impl ToolArguments {
    pub fn new(value: serde_json::Value) -> Self {
        Self { value }
    }

    /// Arguments with no fields.
    pub fn empty() -> Self {
        Self::new(serde_json::Value::Object(serde_json::Map::new()))
    }

    /// Build from tag-style `(name, text)` pairs; later duplicates win.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let map = pairs
            .into_iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
            .collect::<serde_json::Map<_, _>>();
        Self::new(serde_json::Value::Object(map))
    }

    /// Parse raw JSON argument text. Blank text means no arguments.
    pub fn parse(raw: &str) -> Result<Self, MeshError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(Self::empty());
        }
        serde_json::from_str(trimmed)
            .map(Self::new)
            .map_err(|e| MeshError::InvalidArgument(format!("arguments are not valid JSON: {e}")))
    }

    /// Get the raw JSON value.
    pub fn raw(&self) -> &serde_json::Value {
        &self.value
    }

    /// Number of top-level fields.
    pub fn len(&self) -> usize {
        self.value.as_object().map_or(0, |obj| obj.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get a string argument by key.
    pub fn get_str(&self, key: &str) -> Result<&str, MeshError> {
        self.value
            .get(key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| MeshError::InvalidArgument(format!("Missing string argument: {key}")))
    }

    /// Get an optional string argument.
    pub fn get_str_opt(&self, key: &str) -> Option<&str> {
        self.value.get(key).and_then(|v| v.as_str())
    }

    /// Get an integer argument.
    pub fn get_i64(&self, key: &str) -> Result<i64, MeshError> {
        self.value
            .get(key)
            .and_then(|v| v.as_i64())
            .ok_or_else(|| MeshError::InvalidArgument(format!("Missing integer argument: {key}")))
    }

    /// Deserialize the entire arguments into a typed struct.
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T, MeshError> {
        serde_json::from_value(self.value.clone()).map_err(|e| {
            MeshError::InvalidArgument(format!("Failed to deserialize arguments: {e}"))
        })
    }
}

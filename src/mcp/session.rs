//! Session abstraction over an MCP server connection.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::MeshError;

/// Schema for a tool exposed by an MCP server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpToolSchema {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: serde_json::Value,
}

/// Result of an MCP tool call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct McpCallResult {
    pub structured_content: Option<serde_json::Value>,
    pub text_content: Option<String>,
    pub content: Vec<serde_json::Value>,
}

impl McpCallResult {
    pub fn into_value_or_text(self) -> serde_json::Value {
        if let Some(structured) = self.structured_content {
            return structured;
        }
        if let Some(text) = self.text_content {
            return serde_json::Value::String(text);
        }
        serde_json::Value::Array(self.content)
    }
}

/// One live connection to an MCP server.
#[async_trait]
pub trait McpSession: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<McpToolSchema>, MeshError>;

    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<McpCallResult, MeshError>;

    fn is_closed(&self) -> bool;
}

/// Opens new sessions to one server.
#[async_trait]
pub trait McpConnector: Send + Sync {
    /// Label used in logs and errors.
    fn server_name(&self) -> &str;

    async fn connect(&self) -> Result<Arc<dyn McpSession>, MeshError>;
}

/// Normalize tool arguments into the JSON object MCP expects.
///
/// Strings are parsed as JSON; null and blank strings mean no arguments.
pub fn coerce_tool_arguments(
    value: serde_json::Value,
) -> Result<Option<serde_json::Map<String, serde_json::Value>>, MeshError> {
    match value {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Object(map) => Ok(Some(map)),
        serde_json::Value::String(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            let parsed: serde_json::Value = serde_json::from_str(trimmed).map_err(|e| {
                MeshError::InvalidArgument(format!("MCP tool arguments must be valid JSON: {e}"))
            })?;
            coerce_tool_arguments(parsed)
        }
        other => Err(MeshError::InvalidArgument(format!(
            "MCP tool arguments must be a JSON object; got {other}"
        ))),
    }
}

//! Dynamic tool provider: tools discovered at runtime (e.g., MCP).

use std::sync::Arc;

use async_trait::async_trait;

use super::tool::{CallingConvention, Tool, ToolContext, ToolInput};
use super::types::ToolParameters;
use crate::error::MeshError;

/// A tool discovered at runtime (e.g., from an MCP server).
#[derive(Debug, Clone)]
pub struct DynamicTool {
    pub name: String,
    pub description: String,
    pub parameters: ToolParameters,
}

/// Trait for providers that can discover and execute tools at runtime.
#[async_trait]
pub trait DynamicToolProvider: Send + Sync {
    /// Label used in logs.
    fn provider_name(&self) -> &str;

    /// List available tools.
    async fn list_tools(&self) -> Result<Vec<DynamicTool>, MeshError>;

    /// Execute a tool by name.
    async fn execute_tool(
        &self,
        name: &str,
        input: ToolInput,
        ctx: &ToolContext,
    ) -> Result<serde_json::Value, MeshError>;
}

/// Adapter that exposes a [`DynamicTool`] through the core [`Tool`] trait.
pub struct DynamicToolAdapter {
    provider: Arc<dyn DynamicToolProvider>,
    name: String,
    description: String,
    parameters: ToolParameters,
}

impl DynamicToolAdapter {
    /// Create a new adapter for a discovered tool.
    pub fn new(provider: Arc<dyn DynamicToolProvider>, tool: DynamicTool) -> Self {
        Self {
            provider,
            name: tool.name,
            description: tool.description,
            parameters: tool.parameters,
        }
    }
}

#[async_trait]
impl Tool for DynamicToolAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> &ToolParameters {
        &self.parameters
    }

    fn convention(&self) -> CallingConvention {
        CallingConvention::StructuredArgs
    }

    async fn execute(
        &self,
        input: ToolInput,
        ctx: &ToolContext,
    ) -> Result<serde_json::Value, MeshError> {
        self.provider.execute_tool(&self.name, input, ctx).await
    }
}

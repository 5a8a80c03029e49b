//! Exposes an MCP server's tools through [`DynamicToolProvider`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::pool::McpSessionPool;
use super::session::{coerce_tool_arguments, McpConnector};
use crate::error::MeshError;
use crate::tools::{
    DynamicTool, DynamicToolProvider, ToolAccess, ToolContext, ToolInput, ToolParameters,
    ToolRegistry,
};

/// Tool provider backed by one pooled MCP server.
pub struct McpToolProvider {
    pool: McpSessionPool,
}

impl McpToolProvider {
    pub fn new(connector: Arc<dyn McpConnector>, max_idle: Duration) -> Self {
        Self {
            pool: McpSessionPool::new(connector, max_idle),
        }
    }

    pub fn pool(&self) -> &McpSessionPool {
        &self.pool
    }

    /// Retire the pooled session every `every` once it has sat idle. The
    /// task ends when the provider is dropped.
    pub fn spawn_idle_sweep(self: &Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        let provider = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(provider) = provider.upgrade() else {
                    break;
                };
                provider.pool.retire_idle().await;
            }
        })
    }

    /// List the server's tools once and register them all.
    pub async fn register_with(
        self: Arc<Self>,
        registry: &ToolRegistry,
        access: ToolAccess,
    ) -> Result<usize, MeshError> {
        registry.register_provider(self, access).await
    }
}

#[async_trait]
impl DynamicToolProvider for McpToolProvider {
    fn provider_name(&self) -> &str {
        self.pool.server_name()
    }

    async fn list_tools(&self) -> Result<Vec<DynamicTool>, MeshError> {
        let session = self.pool.session().await?;
        let tools = session.list_tools().await?;
        Ok(tools
            .into_iter()
            .map(|schema| DynamicTool {
                description: schema.description.unwrap_or_default(),
                name: schema.name,
                parameters: ToolParameters::from_schema(schema.input_schema),
            })
            .collect())
    }

    async fn execute_tool(
        &self,
        name: &str,
        input: ToolInput,
        ctx: &ToolContext,
    ) -> Result<serde_json::Value, MeshError> {
        let arguments = match input {
            ToolInput::Structured(args) => coerce_tool_arguments(args.raw().clone())?,
            ToolInput::Positional(text) | ToolInput::RawBlock(text) => {
                coerce_tool_arguments(serde_json::Value::String(text))?
            }
        };
        tracing::debug!(
            server = self.pool.server_name(),
            tool = name,
            agent = %ctx.agent_name,
            "calling MCP tool"
        );
        let session = self.pool.session().await?;
        let result = session.call_tool(name, arguments).await?;
        Ok(result.into_value_or_text())
    }
}

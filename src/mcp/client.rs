//! rmcp-backed sessions to MCP servers started as child processes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rmcp::{
    model::{CallToolRequestParams, CallToolResult, Content, ResourceContents},
    service::{ClientInitializeError, RoleClient, RunningService, ServiceError, ServiceExt},
    transport::TokioChildProcess,
};
use tokio::process::Command;

use super::bridge::McpToolProvider;
use super::session::{McpCallResult, McpConnector, McpSession, McpToolSchema};
use crate::config::McpServerSpec;
use crate::error::MeshError;

/// Spawns the configured command and speaks MCP over its stdio.
pub struct ChildProcessConnector {
    name: String,
    command: String,
    args: Vec<String>,
}

impl ChildProcessConnector {
    pub fn new(name: impl Into<String>, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args,
        }
    }
}

#[async_trait]
impl McpConnector for ChildProcessConnector {
    fn server_name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> Result<Arc<dyn McpSession>, MeshError> {
        let mut command = Command::new(&self.command);
        command.args(&self.args);
        let transport = TokioChildProcess::new(command)?;
        let service = ().serve(transport).await.map_err(map_client_initialize_error)?;
        Ok(Arc::new(RmcpSession { service }))
    }
}

/// Build a pooled tool provider for a configured server.
pub fn provider_from_spec(spec: &McpServerSpec) -> McpToolProvider {
    let connector = ChildProcessConnector::new(&spec.name, &spec.command, spec.args.clone());
    McpToolProvider::new(Arc::new(connector), Duration::from_secs(spec.max_idle_secs))
}

struct RmcpSession {
    service: RunningService<RoleClient, ()>,
}

#[async_trait]
impl McpSession for RmcpSession {
    async fn list_tools(&self) -> Result<Vec<McpToolSchema>, MeshError> {
        let tools = match self.service.list_all_tools().await {
            Ok(tools) => tools,
            Err(ServiceError::UnexpectedResponse) => {
                self.service
                    .list_tools(None)
                    .await
                    .map_err(|e| map_service_error("list_tools", e))?
                    .tools
            }
            Err(e) => return Err(map_service_error("list_tools", e)),
        };
        Ok(tools.into_iter().map(map_tool_schema).collect())
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<McpCallResult, MeshError> {
        let result = self
            .service
            .call_tool(CallToolRequestParams {
                meta: None,
                name: name.to_owned().into(),
                arguments,
                task: None,
            })
            .await
            .map_err(|e| map_service_error("call_tool", e))?;
        map_call_result(name, result)
    }

    fn is_closed(&self) -> bool {
        self.service.is_closed()
    }
}

fn map_tool_schema(tool: rmcp::model::Tool) -> McpToolSchema {
    McpToolSchema {
        name: tool.name.to_string(),
        description: tool.description.map(|d| d.to_string()),
        input_schema: serde_json::Value::Object((*tool.input_schema).clone()),
    }
}

fn extract_text_content(content: &[Content]) -> Option<String> {
    let lines: Vec<String> = content
        .iter()
        .filter_map(|item| {
            if let Some(text) = item.as_text() {
                return Some(text.text.clone());
            }
            match &item.as_resource()?.resource {
                ResourceContents::TextResourceContents { text, .. } => Some(text.clone()),
                _ => None,
            }
        })
        .collect();
    (!lines.is_empty()).then(|| lines.join("\n"))
}

fn map_call_result(name: &str, result: CallToolResult) -> Result<McpCallResult, MeshError> {
    let text_content = extract_text_content(&result.content);
    if result.is_error.unwrap_or(false) {
        let message = result
            .structured_content
            .as_ref()
            .map(|v| v.to_string())
            .or(text_content)
            .unwrap_or_else(|| "MCP tool returned an error result".into());
        return Err(MeshError::ToolExecution {
            tool_name: name.to_string(),
            message,
        });
    }
    Ok(McpCallResult {
        content: result
            .content
            .iter()
            .filter_map(|item| serde_json::to_value(item).ok())
            .collect(),
        structured_content: result.structured_content,
        text_content,
    })
}

fn mcp_provider_error(message: String) -> MeshError {
    MeshError::Provider {
        provider: "mcp".into(),
        message,
    }
}

fn map_client_initialize_error(error: ClientInitializeError) -> MeshError {
    match error {
        ClientInitializeError::ConnectionClosed(context) => {
            MeshError::Stream(format!("MCP initialize connection closed: {context}"))
        }
        ClientInitializeError::JsonRpcError(error) => mcp_provider_error(format!(
            "MCP initialize JSON-RPC error {}: {}",
            error.code.0, error.message
        )),
        other => mcp_provider_error(format!("MCP initialize error: {other}")),
    }
}

fn map_service_error(context: &str, error: ServiceError) -> MeshError {
    match error {
        ServiceError::McpError(error) => mcp_provider_error(format!(
            "{context}: MCP error {}: {}",
            error.code.0, error.message
        )),
        ServiceError::TransportClosed => {
            MeshError::Stream(format!("{context}: MCP transport closed"))
        }
        ServiceError::UnexpectedResponse => {
            mcp_provider_error(format!("{context}: unexpected MCP response"))
        }
        ServiceError::Cancelled { reason } => {
            let suffix = reason.map(|r| format!(" ({r})")).unwrap_or_default();
            MeshError::Stream(format!("{context}: MCP request cancelled{suffix}"))
        }
        ServiceError::Timeout { timeout } => MeshError::Stream(format!(
            "{context}: MCP request timed out after {}ms",
            timeout.as_millis()
        )),
        other => mcp_provider_error(format!("{context}: MCP service error: {other}")),
    }
}

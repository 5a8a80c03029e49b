//! Chat transport contract and the OpenAI-compatible implementation.

pub mod http;
pub mod openai;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::MeshError;
use crate::types::{ModelMessage, StreamEvent, ToolCallRecord, Usage};

pub use openai::OpenAiChatTransport;

/// A request sent to a chat-completion endpoint.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ModelMessage>,
    pub stream: bool,
    pub tools: Vec<ToolSchema>,
    pub tool_choice: Option<ToolChoice>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ModelMessage>, stream: bool) -> Self {
        Self {
            model: model.into(),
            messages,
            stream,
            tools: Vec::new(),
            tool_choice: None,
        }
    }

    /// Attach native tool schemas; a non-empty list also sets `tool_choice: auto`.
    pub fn with_tools(mut self, tools: Vec<ToolSchema>) -> Self {
        self.tool_choice = (!tools.is_empty()).then_some(ToolChoice::Auto);
        self.tools = tools;
        self
    }
}

/// Tool definition sent to the provider API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Tool choice policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    Auto,
    None,
    Required,
}

/// A complete (non-streamed) response.
#[derive(Debug, Clone, Default)]
pub struct ChatResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCallRecord>,
    pub usage: Option<Usage>,
}

/// Stream of incremental response events.
pub type ChatEventStream = BoxStream<'static, Result<StreamEvent, MeshError>>;

/// Transport to a model endpoint.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Endpoint URL this transport posts to.
    fn endpoint(&self) -> &str;

    /// Send a request and wait for the whole response.
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, MeshError>;

    /// Send a request and receive incremental events.
    async fn stream(&self, request: &ChatRequest) -> Result<ChatEventStream, MeshError>;
}

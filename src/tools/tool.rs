//! Tool trait and closure-based tool wrapper.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::arguments::ToolArguments;
use super::types::ToolParameters;
use crate::error::MeshError;

/// How tag-extracted parameters are handed to a tool.
///
/// Native structured calls always arrive as [`ToolInput::Structured`],
/// whatever the declared convention.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CallingConvention {
    /// Child elements become named string arguments.
    #[default]
    StructuredArgs,
    /// The single child value (or the block's inner text) as one string.
    SinglePositional,
    /// The complete `<name>...</name>` block, untouched.
    RawBlock,
}

/// Arguments as delivered to [`Tool::execute`].
#[derive(Debug, Clone, PartialEq)]
pub enum ToolInput {
    Structured(ToolArguments),
    Positional(String),
    RawBlock(String),
}

impl ToolInput {
    /// Structured arguments, if this input carries them.
    pub fn arguments(&self) -> Option<&ToolArguments> {
        match self {
            Self::Structured(args) => Some(args),
            _ => None,
        }
    }

    /// Named string field from structured input.
    pub fn get_str(&self, key: &str) -> Result<&str, MeshError> {
        match self {
            Self::Structured(args) => args.get_str(key),
            _ => Err(MeshError::InvalidArgument(format!(
                "Missing string argument: {key}"
            ))),
        }
    }

    /// Text payload: the positional value, the raw block, or for structured
    /// input the lone field's string value.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Positional(text) | Self::RawBlock(text) => Some(text),
            Self::Structured(args) => match args.raw().as_object() {
                Some(obj) if obj.len() == 1 => obj.values().next().and_then(|v| v.as_str()),
                _ => None,
            },
        }
    }
}

/// Context available during tool execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolContext {
    /// UUID of the agent that issued the call.
    pub agent_uuid: String,
    /// Name of the agent that issued the call.
    pub agent_name: String,
    /// Provider-assigned call id on the native path.
    pub tool_call_id: Option<String>,
}

/// Core tool trait. Implement to create custom tools.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (must match what the model calls).
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// JSON Schema parameters.
    fn parameters(&self) -> &ToolParameters;

    /// Shape expected from tag-style invocations.
    fn convention(&self) -> CallingConvention {
        CallingConvention::StructuredArgs
    }

    /// Execute the tool.
    async fn execute(&self, input: ToolInput, ctx: &ToolContext)
        -> Result<serde_json::Value, MeshError>;
}

type ToolHandler = dyn Fn(
        ToolInput,
        ToolContext,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, MeshError>> + Send>>
    + Send
    + Sync;

/// Closure-based tool for quick tool creation.
pub struct FnTool {
    name: String,
    description: String,
    parameters: ToolParameters,
    convention: CallingConvention,
    handler: Arc<ToolHandler>,
}

impl FnTool {
    /// Create a tool from a closure.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ToolParameters,
        handler: F,
    ) -> Self
    where
        F: Fn(ToolInput, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value, MeshError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            convention: CallingConvention::default(),
            handler: Arc::new(move |input, ctx| Box::pin(handler(input, ctx))),
        }
    }

    pub fn with_convention(mut self, convention: CallingConvention) -> Self {
        self.convention = convention;
        self
    }
}

#[async_trait]
impl Tool for FnTool {
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
        self.convention
    }

    async fn execute(
        &self,
        input: ToolInput,
        ctx: &ToolContext,
    ) -> Result<serde_json::Value, MeshError> {
        (self.handler)(input, ctx.clone()).await
    }
}

impl std::fmt::Debug for FnTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTool")
            .field("name", &self.name)
            .field("convention", &self.convention)
            .finish()
    }
}

/// Render a tool's return value as message text.
pub fn render_result(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

//! Tool dispatch: resolve a parsed call, adapt its parameters, execute.
//!
//! Resolution order is fixed: agent built-ins through [`AgentCapabilities`],
//! then the permissioned registry. Anything else is a not-found result that
//! lists what the agent can actually call. No failure here escapes as `Err`;
//! every outcome becomes result content for the conversation.

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::error::MeshError;
use crate::parser::{ParsedCall, RawParams, TaggedParams};
use crate::tools::{
    render_result, Builtin, CallingConvention, Tool, ToolArguments, ToolContext, ToolInput,
    ToolRegistry,
};

/// Built-in behaviour every agent provides.
#[async_trait]
pub trait AgentCapabilities: Send + Sync {
    /// Run `message` through the peer's conversation loop and return its answer.
    async fn delegate(&self, agent_id: &str, message: &str) -> Result<String, MeshError>;

    /// Human-readable listing of every agent in the directory.
    fn list_peers(&self) -> String;

    /// Acknowledge task completion.
    fn mark_complete(&self, report: &str) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStatus {
    Success,
    /// The tool ran (or its input was rejected) and reported an error.
    Failed,
    /// Nothing callable under that name for this agent.
    NotFound,
}

/// Normalized outcome of one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchResult {
    pub call_id: Option<String>,
    pub name: String,
    pub content: String,
    pub status: DispatchStatus,
}

impl DispatchResult {
    fn new(call: &ParsedCall, content: String, status: DispatchStatus) -> Self {
        Self {
            call_id: call.id.clone(),
            name: call.name.clone(),
            content,
            status,
        }
    }

    pub fn is_error(&self) -> bool {
        self.status != DispatchStatus::Success
    }

    /// Text appended to the conversation for a tag-style call.
    pub fn system_text(&self) -> String {
        match self.status {
            DispatchStatus::NotFound => self.content.clone(),
            _ => format!("{} results: {}", self.name, self.content),
        }
    }
}

/// Dispatches calls on behalf of one agent.
pub struct Dispatcher<'a> {
    registry: &'a ToolRegistry,
    context: ToolContext,
}

impl<'a> Dispatcher<'a> {
    pub fn new(registry: &'a ToolRegistry, agent_uuid: &str, agent_name: &str) -> Self {
        Self {
            registry,
            context: ToolContext {
                agent_uuid: agent_uuid.to_string(),
                agent_name: agent_name.to_string(),
                tool_call_id: None,
            },
        }
    }

    /// Names this agent can call: permitted registry tools, then built-ins.
    pub fn visible_tools(&self) -> Vec<String> {
        self.registry
            .list_permitted(&self.context.agent_uuid)
            .iter()
            .map(|d| d.name().to_string())
            .chain(Builtin::all().map(|b| b.name().to_string()))
            .collect()
    }

    pub async fn dispatch(
        &self,
        call: &ParsedCall,
        capabilities: &dyn AgentCapabilities,
    ) -> DispatchResult {
        if let Some(builtin) = Builtin::from_name(&call.name) {
            return self.dispatch_builtin(builtin, call, capabilities).await;
        }

        let tool = if self.registry.is_permitted(&self.context.agent_uuid, &call.name) {
            self.registry.lookup(&call.name).ok().map(|d| d.tool)
        } else {
            None
        };
        let Some(tool) = tool else {
            let available = self.visible_tools();
            warn!(agent = %self.context.agent_name, tool = %call.name, "tool not found");
            let content = format!(
                "Tool error: cannot find tool '{}'. You can use: {}",
                call.name,
                available.join(", ")
            );
            return DispatchResult::new(call, content, DispatchStatus::NotFound);
        };

        let input = match adapt_input(tool.as_ref(), &call.params) {
            Ok(input) => input,
            Err(e) => {
                warn!(tool = %call.name, error = %e, "rejected tool arguments");
                return DispatchResult::new(call, e.to_string(), DispatchStatus::Failed);
            }
        };

        info!(agent = %self.context.agent_name, tool = %call.name, call_id = ?call.id, "dispatching tool");
        let ctx = ToolContext {
            tool_call_id: call.id.clone(),
            ..self.context.clone()
        };
        match tool.execute(input, &ctx).await {
            Ok(value) => DispatchResult::new(call, render_result(&value), DispatchStatus::Success),
            Err(e) => {
                error!(tool = %call.name, error = %e, "tool execution failed");
                let content = format!("error executing tool {}: {e}", call.name);
                DispatchResult::new(call, content, DispatchStatus::Failed)
            }
        }
    }

    async fn dispatch_builtin(
        &self,
        builtin: Builtin,
        call: &ParsedCall,
        capabilities: &dyn AgentCapabilities,
    ) -> DispatchResult {
        debug!(agent = %self.context.agent_name, builtin = %builtin, "dispatching built-in");
        let fields = match builtin_fields(&call.params) {
            Ok(fields) => fields,
            Err(e) => return DispatchResult::new(call, e.to_string(), DispatchStatus::Failed),
        };
        match builtin {
            Builtin::ListAgents => {
                DispatchResult::new(call, capabilities.list_peers(), DispatchStatus::Success)
            }
            Builtin::AttemptCompletion => {
                let report = fields.get_str_opt("report_content").unwrap_or_default();
                DispatchResult::new(call, capabilities.mark_complete(report), DispatchStatus::Success)
            }
            Builtin::AskForHelp => {
                let (agent_id, message) = match (fields.get_str("agent_id"), fields.get_str("message")) {
                    (Ok(agent_id), Ok(message)) => (agent_id.trim(), message.trim()),
                    (Err(_), _) => {
                        let content = "<ask_for_help> is missing the agent_id field".to_string();
                        return DispatchResult::new(call, content, DispatchStatus::Failed);
                    }
                    (_, Err(_)) => {
                        let content = "<ask_for_help> is missing the message field".to_string();
                        return DispatchResult::new(call, content, DispatchStatus::Failed);
                    }
                };
                match capabilities.delegate(agent_id, message).await {
                    Ok(answer) => DispatchResult::new(call, answer, DispatchStatus::Success),
                    Err(e) => {
                        warn!(target_agent = agent_id, error = %e, "delegation failed");
                        DispatchResult::new(call, e.to_string(), DispatchStatus::Failed)
                    }
                }
            }
        }
    }
}

/// Built-ins read named fields from either path.
fn builtin_fields(params: &RawParams) -> Result<ToolArguments, MeshError> {
    match params {
        RawParams::Arguments(raw) => ToolArguments::parse(raw),
        RawParams::Tagged(tagged) => Ok(tagged_pairs(tagged)),
    }
}

fn tagged_pairs(tagged: &TaggedParams) -> ToolArguments {
    ToolArguments::from_pairs(tagged.fields.iter().map(|(k, v)| (k.as_str(), v.as_str())))
}

/// Shape raw parameters into what `tool` declared it accepts.
fn adapt_input(tool: &dyn Tool, params: &RawParams) -> Result<ToolInput, MeshError> {
    match params {
        RawParams::Arguments(raw) => {
            let args = ToolArguments::parse(raw)?;
            tool.parameters().validate(args.raw()).map_err(|message| {
                MeshError::InvalidArgument(format!("{}: {message}", tool.name()))
            })?;
            Ok(ToolInput::Structured(args))
        }
        RawParams::Tagged(tagged) => Ok(match tool.convention() {
            CallingConvention::StructuredArgs => {
                let required = tool.parameters().required();
                if tagged.fields.is_empty() && !tagged.text.is_empty() && required.len() == 1 {
                    ToolInput::Structured(ToolArguments::from_pairs([(required[0], tagged.text.as_str())]))
                } else {
                    ToolInput::Structured(tagged_pairs(tagged))
                }
            }
            CallingConvention::SinglePositional => match tagged.fields.as_slice() {
                [(_, value)] => ToolInput::Positional(value.clone()),
                [] => ToolInput::Positional(tagged.text.clone()),
                _ => ToolInput::RawBlock(tagged.block.clone()),
            },
            CallingConvention::RawBlock => ToolInput::RawBlock(tagged.block.clone()),
        }),
    }
}

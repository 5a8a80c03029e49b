//! Agent: identity, conversation state and the tool-calling loop.

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::StreamExt;
use tracing::{debug, info, warn};

use super::conversation::Conversation;
use super::directory::DirectoryLink;
use super::events::{noop_sink, AgentEvent, EventSink};
use crate::config::{AgentSettings, LoopLimits};
use crate::dispatch::{AgentCapabilities, DispatchResult, Dispatcher};
use crate::error::MeshError;
use crate::parser::{completion_report, extract_tagged_calls, NativeCallAccumulator, ParsedCall, RawParams};
use crate::provider::{ChatRequest, ChatTransport, OpenAiChatTransport};
use crate::tools::{Builtin, ToolRegistry};
use crate::types::{ModelMessage, StreamEvent, ToolCallRecord, Usage};

const PROBE_MESSAGE: &str = "hello";

/// How a user turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The model answered without requesting tools.
    Answer(String),
    /// The model signalled task completion.
    Completed { report: String },
}

impl TurnOutcome {
    pub fn text(&self) -> &str {
        match self {
            Self::Answer(text) => text,
            Self::Completed { report } => report,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Self::Answer(text) => text,
            Self::Completed { report } => report,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// One received model response.
struct ModelReply {
    text: String,
    native_calls: Vec<ParsedCall>,
    usage: Option<Usage>,
}

/// Builds and connects an [`Agent`].
pub struct AgentBuilder {
    settings: AgentSettings,
    transport: Option<Arc<dyn ChatTransport>>,
    registry: Option<Arc<ToolRegistry>>,
    sink: EventSink,
    limits: LoopLimits,
}

impl AgentBuilder {
    /// Use a specific transport instead of the OpenAI-compatible default.
    pub fn with_transport(mut self, transport: Arc<dyn ChatTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_registry(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_sink(mut self, sink: EventSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_limits(mut self, limits: LoopLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Compose the system prompt and run the connectivity probe.
    ///
    /// Fails with [`MeshError::Connectivity`] when the probe round-trip does
    /// not succeed; no agent is produced in that case.
    pub async fn connect(self) -> Result<Agent, MeshError> {
        let Self {
            settings,
            transport,
            registry,
            sink,
            limits,
        } = self;
        let registry = registry.unwrap_or_default();
        let transport = transport.unwrap_or_else(|| {
            Arc::new(OpenAiChatTransport::new(&settings.endpoint, &settings.api_key))
        });
        let prompt = compose_system_prompt(&settings, &registry);
        debug!(agent = %settings.name, prompt = %prompt, "composed system prompt");

        let mut agent = Agent {
            conversation: Conversation::new(prompt),
            settings,
            transport,
            registry,
            directory: DirectoryLink::default(),
            sink,
            limits,
            usage: Usage::default(),
        };
        agent.check_connectivity().await?;
        agent
            .registry
            .register_agent_alias(&agent.settings.uuid, &agent.settings.name);
        Ok(agent)
    }
}

/// Base prompt, then every callable tool, then the agent's own uuid.
fn compose_system_prompt(settings: &AgentSettings, registry: &ToolRegistry) -> String {
    let mut prompt = settings.prompt.clone();
    prompt.push_str("\n\nYou can use the following tools:\n");
    for (name, description) in registry.descriptions_for_agent(&settings.uuid, &settings.name) {
        prompt.push_str(&format!("- {name}: {description}\n"));
    }
    for builtin in Builtin::all() {
        prompt.push_str(&format!("- {}: {}\n", builtin.name(), builtin.prompt_description()));
    }
    prompt.push_str(&format!("Your uuid is {}.", settings.uuid));
    prompt
}

/// A model-backed agent with its own conversation.
pub struct Agent {
    settings: AgentSettings,
    transport: Arc<dyn ChatTransport>,
    registry: Arc<ToolRegistry>,
    directory: DirectoryLink,
    sink: EventSink,
    limits: LoopLimits,
    conversation: Conversation,
    usage: Usage,
}

impl Agent {
    pub fn builder(settings: AgentSettings) -> AgentBuilder {
        AgentBuilder {
            settings,
            transport: None,
            registry: None,
            sink: noop_sink(),
            limits: LoopLimits::default(),
        }
    }

    pub fn uuid(&self) -> &str {
        &self.settings.uuid
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Token usage accumulated over every request this agent made.
    pub fn usage(&self) -> Usage {
        self.usage
    }

    /// Forget the conversation, keeping the system prompt.
    pub fn reset_conversation(&mut self) {
        self.conversation.reset();
    }

    pub(crate) fn attach_directory(&mut self, link: DirectoryLink) {
        self.directory = link;
    }

    fn emit(&self, event: AgentEvent) {
        (self.sink)(event);
    }

    async fn check_connectivity(&mut self) -> Result<(), MeshError> {
        self.conversation.push(ModelMessage::user(PROBE_MESSAGE));
        let request = ChatRequest::new(
            &self.settings.model,
            self.conversation.messages().to_vec(),
            false,
        );
        let probe = self.transport.complete(&request).await;
        self.conversation.reset();
        match probe {
            Ok(_) => {
                info!(agent = %self.settings.name, endpoint = self.transport.endpoint(), "connectivity check passed");
                Ok(())
            }
            Err(e) => Err(MeshError::Connectivity {
                agent: self.settings.name.clone(),
                reason: e.to_string(),
            }),
        }
    }

    /// Run one user turn to completion.
    pub async fn converse(&mut self, message: impl Into<String>) -> Result<TurnOutcome, MeshError> {
        let chain = vec![self.settings.uuid.clone()];
        self.run_turn(ModelMessage::user(message), chain).await
    }

    /// Run one user turn with attached images (URLs or base64 PNG data).
    pub async fn converse_with_images(
        &mut self,
        message: impl Into<String>,
        images: &[String],
    ) -> Result<TurnOutcome, MeshError> {
        let chain = vec![self.settings.uuid.clone()];
        self.run_turn(ModelMessage::user_with_images(message, images), chain)
            .await
    }

    /// The conversation loop. `chain` holds the uuids of every agent waiting
    /// on this turn, this one last.
    pub(crate) fn run_turn(
        &mut self,
        input: ModelMessage,
        chain: Vec<String>,
    ) -> BoxFuture<'_, Result<TurnOutcome, MeshError>> {
        Box::pin(async move {
            self.conversation.push(input);
            let limit = self.limits.max_iterations;

            for iteration in 1..=limit {
                let request = self.build_request();
                debug!(
                    agent = %self.settings.name,
                    iteration,
                    messages = request.messages.len(),
                    tools = request.tools.len(),
                    "sending request"
                );
                let reply = self.receive(&request).await?;
                self.emit(AgentEvent::ResponseFinished {
                    agent: self.settings.name.clone(),
                });
                if let Some(usage) = reply.usage {
                    self.usage.merge(&usage);
                    self.emit(AgentEvent::Usage {
                        agent: self.settings.name.clone(),
                        usage,
                    });
                }

                let native = !reply.native_calls.is_empty();
                let parsed: Vec<Result<ParsedCall, MeshError>> = if native {
                    reply.native_calls.into_iter().map(Ok).collect()
                } else {
                    extract_tagged_calls(&reply.text)
                };
                let calls: Vec<ParsedCall> =
                    parsed.iter().filter_map(|r| r.as_ref().ok().cloned()).collect();

                let completion = completion_report(&reply.text, &calls);
                if completion.is_none() && parsed.is_empty() {
                    self.conversation.push(ModelMessage::assistant(reply.text.clone()));
                    return Ok(TurnOutcome::Answer(reply.text));
                }
                // Calls after the completion call are never run.
                let cutoff = parsed
                    .iter()
                    .position(|entry| matches!(entry, Ok(call) if is_completion(call)))
                    .unwrap_or(parsed.len());

                if native {
                    let records = calls.iter().map(call_record).collect();
                    self.conversation
                        .push(ModelMessage::assistant_tool_calls(reply.text, records));
                    for (index, call) in calls.iter().enumerate() {
                        let id = call.id.clone().unwrap_or_default();
                        let content = match index.cmp(&cutoff) {
                            Ordering::Less => self.dispatch_one(call, &chain).await.content,
                            Ordering::Equal => "Task marked complete.".to_string(),
                            Ordering::Greater => {
                                "Not executed: the task was marked complete.".to_string()
                            }
                        };
                        self.conversation
                            .push(ModelMessage::tool_result(id, call.name.clone(), content));
                    }
                } else {
                    self.conversation.push(ModelMessage::assistant(reply.text));
                    for entry in parsed.into_iter().take(cutoff) {
                        let text = match entry {
                            Ok(call) => self.dispatch_one(&call, &chain).await.system_text(),
                            Err(e) => {
                                warn!(agent = %self.settings.name, error = %e, "skipping malformed tool block");
                                format!("Tool error: {e}")
                            }
                        };
                        self.conversation.push(ModelMessage::system(text));
                    }
                }

                if let Some(report) = completion {
                    info!(agent = %self.settings.name, iteration, ran = cutoff, "task marked complete");
                    self.emit(AgentEvent::Completed {
                        agent: self.settings.name.clone(),
                        report: report.clone(),
                    });
                    return Ok(TurnOutcome::Completed { report });
                }
            }

            Err(MeshError::IterationLimit {
                agent: self.settings.name.clone(),
                limit,
            })
        })
    }

    fn build_request(&self) -> ChatRequest {
        let request = ChatRequest::new(
            &self.settings.model,
            self.conversation.messages().to_vec(),
            self.settings.stream,
        );
        if !self.settings.native_tools {
            return request;
        }
        let mut tools = self.registry.schemas_for(&self.settings.uuid);
        tools.extend(Builtin::all().map(Builtin::schema));
        request.with_tools(tools)
    }

    async fn receive(&self, request: &ChatRequest) -> Result<ModelReply, MeshError> {
        let mut calls = NativeCallAccumulator::new();
        if !request.stream {
            let response = self.transport.complete(request).await?;
            if !response.text.is_empty() {
                self.emit(AgentEvent::TextDelta {
                    agent: self.settings.name.clone(),
                    text: response.text.clone(),
                });
            }
            for record in response.tool_calls {
                calls.push_complete(record);
            }
            return Ok(ModelReply {
                text: response.text,
                native_calls: calls.finish(),
                usage: response.usage,
            });
        }

        let mut stream = self.transport.stream(request).await?;
        let mut text = String::new();
        let mut usage = None;
        while let Some(event) = stream.next().await {
            match event? {
                StreamEvent::TextDelta { text: delta } => {
                    text.push_str(&delta);
                    self.emit(AgentEvent::TextDelta {
                        agent: self.settings.name.clone(),
                        text: delta,
                    });
                }
                StreamEvent::ToolCallDelta(fragment) => calls.push(fragment),
                StreamEvent::Usage(u) => usage = Some(u),
                StreamEvent::Done => break,
            }
        }
        Ok(ModelReply {
            text,
            native_calls: calls.finish(),
            usage,
        })
    }

    async fn dispatch_one(&self, call: &ParsedCall, chain: &[String]) -> DispatchResult {
        self.emit(AgentEvent::ToolInvoked {
            agent: self.settings.name.clone(),
            tool: call.name.clone(),
            params: call.params_preview(),
        });
        let capabilities = TurnCapabilities {
            directory: &self.directory,
            caller: &self.settings.name,
            chain,
            max_depth: self.limits.max_delegation_depth,
            sink: &self.sink,
        };
        let dispatcher = Dispatcher::new(&self.registry, &self.settings.uuid, &self.settings.name);
        let result = dispatcher.dispatch(call, &capabilities).await;
        self.emit(AgentEvent::ToolFinished {
            agent: self.settings.name.clone(),
            tool: call.name.clone(),
            is_error: result.is_error(),
        });
        result
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("settings", &self.settings)
            .field("messages", &self.conversation.len())
            .field("usage", &self.usage)
            .finish()
    }
}

fn is_completion(call: &ParsedCall) -> bool {
    Builtin::from_name(&call.name) == Some(Builtin::AttemptCompletion)
}

fn call_record(call: &ParsedCall) -> ToolCallRecord {
    let arguments = match &call.params {
        RawParams::Arguments(raw) => raw.clone(),
        RawParams::Tagged(tagged) => tagged.block.clone(),
    };
    ToolCallRecord {
        id: call.id.clone().unwrap_or_default(),
        name: call.name.clone(),
        arguments,
    }
}

/// Built-ins as seen from one turn of one agent.
struct TurnCapabilities<'a> {
    directory: &'a DirectoryLink,
    caller: &'a str,
    chain: &'a [String],
    max_depth: usize,
    sink: &'a EventSink,
}

#[async_trait]
impl AgentCapabilities for TurnCapabilities<'_> {
    async fn delegate(&self, agent_id: &str, message: &str) -> Result<String, MeshError> {
        let directory = self
            .directory
            .upgrade()
            .ok_or_else(|| MeshError::InvalidState("agent is not part of a directory".into()))?;
        let peer = directory.resolve(agent_id)?;

        if self.chain.iter().any(|uuid| uuid == peer.uuid()) {
            return Err(MeshError::DelegationRefused {
                target: agent_id.to_string(),
                reason: format!("{} is already waiting on this request", peer.name()),
            });
        }
        if self.chain.len() > self.max_depth {
            return Err(MeshError::DelegationRefused {
                target: agent_id.to_string(),
                reason: format!("delegation depth limit of {} reached", self.max_depth),
            });
        }

        // Never wait on a running peer; it may be waiting on us from another task.
        let Some(mut agent) = peer.try_lock() else {
            warn!(from = self.caller, to = peer.name(), "delegation target busy");
            return Err(MeshError::DelegationRefused {
                target: agent_id.to_string(),
                reason: format!("{} is busy with another request", peer.name()),
            });
        };

        info!(from = self.caller, to = peer.name(), depth = self.chain.len(), "delegating");
        (self.sink)(AgentEvent::Delegated {
            from: self.caller.to_string(),
            to: peer.name().to_string(),
        });

        let mut chain = self.chain.to_vec();
        chain.push(peer.uuid().to_string());
        let outcome = agent.run_turn(ModelMessage::user(message), chain).await?;
        Ok(outcome.into_text())
    }

    fn list_peers(&self) -> String {
        let peers = self
            .directory
            .upgrade()
            .map(|directory| directory.peers())
            .unwrap_or_default();
        let mut listing = String::from("Available agents:");
        for (name, uuid) in peers {
            listing.push_str(&format!("\n- {name} (UUID: {uuid})"));
        }
        listing
    }

    fn mark_complete(&self, report: &str) -> String {
        if report.is_empty() {
            "Task marked complete.".to_string()
        } else {
            format!("Task marked complete: {report}")
        }
    }
}

//! Shared test helpers and a scripted chat transport.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use dumplings::agent::{collecting_sink, Agent, AgentEvent};
use dumplings::config::{AgentSettings, LoopLimits};
use dumplings::error::MeshError;
use dumplings::provider::{ChatEventStream, ChatRequest, ChatResponse, ChatTransport};
use dumplings::tools::{FnTool, ToolAccess, ToolParameters, ToolRegistry};
use dumplings::types::{StreamEvent, ToolCallFragment, ToolCallRecord, Usage};

/// One scripted model response.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    /// Native tool calls with optional accompanying text.
    Calls(String, Vec<ToolCallRecord>),
    /// Raw stream events, delivered as-is on the streaming path.
    Events(Vec<StreamEvent>),
}

impl Reply {
    pub fn text(text: &str) -> Self {
        Self::Text(text.to_string())
    }

    pub fn call(id: &str, name: &str, arguments: &str) -> Self {
        Self::Calls(
            String::new(),
            vec![ToolCallRecord {
                id: id.to_string(),
                name: name.to_string(),
                arguments: arguments.to_string(),
            }],
        )
    }

    fn into_response(self) -> ChatResponse {
        let usage = Some(sample_usage());
        match self {
            Reply::Text(text) => ChatResponse {
                text,
                tool_calls: Vec::new(),
                usage,
            },
            Reply::Calls(text, tool_calls) => ChatResponse {
                text,
                tool_calls,
                usage,
            },
            Reply::Events(events) => {
                let mut response = ChatResponse::default();
                for event in events {
                    if let StreamEvent::TextDelta { text } = event {
                        response.text.push_str(&text);
                    }
                }
                response
            }
        }
    }

    fn into_events(self) -> Vec<StreamEvent> {
        match self {
            Reply::Events(events) => events,
            Reply::Text(text) => vec![
                StreamEvent::TextDelta { text },
                StreamEvent::Usage(sample_usage()),
                StreamEvent::Done,
            ],
            Reply::Calls(text, calls) => {
                let mut events = Vec::new();
                if !text.is_empty() {
                    events.push(StreamEvent::TextDelta { text });
                }
                for (index, call) in calls.into_iter().enumerate() {
                    events.push(StreamEvent::ToolCallDelta(ToolCallFragment {
                        index,
                        id: Some(call.id),
                        name: Some(call.name),
                        arguments: Some(call.arguments),
                    }));
                }
                events.push(StreamEvent::Done);
                events
            }
        }
    }
}

pub fn sample_usage() -> Usage {
    Usage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    }
}

/// Replays scripted replies in order and records every request.
///
/// The first request an agent sends is its connectivity probe; a probe reply
/// is queued ahead of the script so tests only describe the turn itself.
pub struct MockTransport {
    replies: Mutex<VecDeque<Reply>>,
    fallback: Option<Reply>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockTransport {
    pub fn scripted(replies: Vec<Reply>) -> Arc<Self> {
        let mut queue = VecDeque::from(replies);
        queue.push_front(Reply::text("hello"));
        Arc::new(Self {
            replies: Mutex::new(queue),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Answer every turn request with the same reply.
    pub fn looping(reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::from([Reply::text("hello")])),
            fallback: Some(reply),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Every request after the probe.
    pub fn turn_requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().iter().skip(1).cloned().collect()
    }

    fn next_reply(&self, request: &ChatRequest) -> Result<Reply, MeshError> {
        self.requests.lock().unwrap().push(request.clone());
        let scripted = self.replies.lock().unwrap().pop_front();
        scripted
            .or_else(|| self.fallback.clone())
            .ok_or_else(|| MeshError::api(500, "script exhausted"))
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    fn endpoint(&self) -> &str {
        "mock://scripted"
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, MeshError> {
        Ok(self.next_reply(request)?.into_response())
    }

    async fn stream(&self, request: &ChatRequest) -> Result<ChatEventStream, MeshError> {
        let events = self.next_reply(request)?.into_events();
        Ok(Box::pin(futures::stream::iter(events.into_iter().map(Ok))))
    }
}

pub fn settings(name: &str) -> AgentSettings {
    AgentSettings::builder()
        .name(name)
        .prompt(format!("You are {name}."))
        .endpoint("mock://scripted")
        .model("test-model")
        .stream(false)
        .build()
}

/// Registry with `get_time` (always "11:03") callable by `time_agent` only.
pub fn time_registry() -> Arc<ToolRegistry> {
    let registry = Arc::new(ToolRegistry::new());
    registry
        .register(
            Arc::new(FnTool::new(
                "get_time",
                "Get the current time",
                ToolParameters::empty(),
                |_input, _ctx| async { Ok(serde_json::json!("11:03")) },
            )),
            ToolAccess::only(["time_agent"]),
        )
        .unwrap();
    registry
}

pub type EventLog = Arc<Mutex<Vec<AgentEvent>>>;

pub async fn connect(
    settings: AgentSettings,
    registry: &Arc<ToolRegistry>,
    transport: &Arc<MockTransport>,
    limits: LoopLimits,
) -> (Agent, EventLog) {
    let (sink, events) = collecting_sink();
    let agent = Agent::builder(settings)
        .with_registry(Arc::clone(registry))
        .with_transport(transport.clone())
        .with_sink(sink)
        .with_limits(limits)
        .connect()
        .await
        .expect("agent should connect");
    (agent, events)
}

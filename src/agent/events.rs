//! Live output of agent activity.

use std::io::Write;
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::types::Usage;

/// Observable agent activity, delivered as it happens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Streamed (or whole) response text.
    TextDelta { agent: String, text: String },
    ToolInvoked {
        agent: String,
        tool: String,
        params: String,
    },
    ToolFinished {
        agent: String,
        tool: String,
        is_error: bool,
    },
    /// One model response has been fully received.
    ResponseFinished { agent: String },
    Usage { agent: String, usage: Usage },
    Completed { agent: String, report: String },
    Delegated { from: String, to: String },
}

/// Callback receiving agent events.
pub type EventSink = Arc<dyn Fn(AgentEvent) + Send + Sync>;

/// Sink that discards everything.
pub fn noop_sink() -> EventSink {
    Arc::new(|_| {})
}

/// Sink that records every event, for inspection after a turn.
pub fn collecting_sink() -> (EventSink, Arc<Mutex<Vec<AgentEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let captured = Arc::clone(&events);
    let sink: EventSink = Arc::new(move |event| {
        captured
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    });
    (sink, events)
}

/// Console sink: text as it streams, tool notices and usage lines.
pub fn stdout_sink() -> EventSink {
    Arc::new(|event| {
        let mut out = std::io::stdout().lock();
        let _ = match event {
            AgentEvent::TextDelta { text, .. } => write!(out, "{text}"),
            AgentEvent::ToolInvoked { tool, params, .. } => {
                writeln!(out, "\nCalling tool: {tool} with {params}")
            }
            AgentEvent::ToolFinished { tool, is_error: true, .. } => {
                writeln!(out, "Tool {tool} reported an error")
            }
            AgentEvent::ToolFinished { .. } => Ok(()),
            AgentEvent::ResponseFinished { .. } => writeln!(out),
            AgentEvent::Usage { usage, .. } => writeln!(out, "Usage for this request: {usage}."),
            AgentEvent::Completed { agent, .. } => {
                writeln!(out, "\n[system] {agent} marked the task complete.")
            }
            AgentEvent::Delegated { from, to } => writeln!(out, "\n[{from} -> {to}]"),
        };
        let _ = out.flush();
    })
}

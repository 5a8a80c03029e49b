//! Names and schemas of the agent built-in tools.
//!
//! Built-ins are not registry entries: every agent answers them through
//! [`AgentCapabilities`](crate::agent::AgentCapabilities). Their names are
//! reserved so a registry tool can never shadow one.

use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

use super::types::ToolParameters;
use crate::provider::ToolSchema;

/// Hard-stop marker whose literal presence in output ends the turn.
pub const COMPLETION_MARKER: &str = "<attempt_completion>";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum Builtin {
    /// Delegate a request to a peer agent.
    AskForHelp,
    /// List every agent in the directory.
    ListAgents,
    /// Mark the task complete.
    AttemptCompletion,
}

impl Builtin {
    /// Resolve a tool name to a built-in, if it is one.
    pub fn from_name(name: &str) -> Option<Self> {
        name.parse().ok()
    }

    pub fn is_reserved(name: &str) -> bool {
        Self::from_name(name).is_some()
    }

    pub fn all() -> impl Iterator<Item = Self> {
        Self::iter()
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::AskForHelp => "ask_for_help",
            Self::ListAgents => "list_agents",
            Self::AttemptCompletion => "attempt_completion",
        }
    }

    /// One-line description used in the system prompt listing.
    pub fn prompt_description(self) -> &'static str {
        match self {
            Self::AskForHelp => {
                "Ask another agent for help. Parameters: agent_id (target agent UUID or name), message (the request)"
            }
            Self::ListAgents => "List all available agents with their UUIDs and names",
            Self::AttemptCompletion => {
                "Mark the task complete and stop. Parameters: report_content (final report, optional)"
            }
        }
    }

    pub fn parameters(self) -> ToolParameters {
        match self {
            Self::AskForHelp => ToolParameters::object()
                .string("agent_id", "Target agent UUID or name", true)
                .string("message", "The request", true)
                .build(),
            Self::ListAgents => ToolParameters::empty(),
            Self::AttemptCompletion => ToolParameters::object()
                .string("report_content", "Final report (optional)", false)
                .build(),
        }
    }

    /// Schema offered to providers with native function-calling.
    pub fn schema(self) -> ToolSchema {
        let description = match self {
            Self::AskForHelp => "Ask another agent for help",
            Self::ListAgents => "List all available agents with their UUIDs and names",
            Self::AttemptCompletion => "Mark the task complete and stop",
        };
        ToolSchema {
            name: self.name().to_string(),
            description: description.to_string(),
            parameters: self.parameters().schema,
        }
    }
}

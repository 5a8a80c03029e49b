//! dumplings: a mesh of tool-calling chat agents.
//!
//! Each agent talks to an OpenAI-compatible chat-completions endpoint and
//! runs a conversation loop: send the conversation, parse tool calls out of
//! the reply (native function calls or inline XML-style tags), dispatch them,
//! append the results and ask again until the model answers in plain text or
//! marks the task complete. Agents share one [`tools::ToolRegistry`] with
//! per-agent access lists and can hand work to each other through the
//! built-in `ask_for_help` tool.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use dumplings::agent::{Agent, AgentDirectory};
//! use dumplings::config::AgentSettings;
//! use dumplings::tools::{FnTool, ToolAccess, ToolParameters, ToolRegistry};
//!
//! # async fn example() -> dumplings::error::Result<()> {
//! let registry = Arc::new(ToolRegistry::new());
//! registry.register(
//!     Arc::new(FnTool::new("get_time", "Get the current time", ToolParameters::empty(),
//!         |_input, _ctx| async { Ok(serde_json::json!("11:03")) })),
//!     ToolAccess::only(["time_agent"]),
//! )?;
//!
//! let settings = AgentSettings::builder()
//!     .name("time_agent")
//!     .endpoint("https://api.example.com/v1/chat/completions")
//!     .model("gpt-4o-mini")
//!     .build();
//! let agent = Agent::builder(settings).with_registry(registry).connect().await?;
//!
//! let directory = AgentDirectory::new();
//! let handle = directory.insert(agent)?;
//! let outcome = handle.converse("What time is it?").await?;
//! println!("{}", outcome.text());
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod mcp;
pub mod parser;
pub mod provider;
pub mod tools;
pub mod types;

#[cfg(feature = "cli")]
pub mod cli;

pub use agent::{Agent, AgentDirectory, AgentHandle, TurnOutcome};
pub use error::{MeshError, Result};

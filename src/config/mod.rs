//! Configuration (layered: code > env > file).
//!
//! A mesh file declares defaults shared by every agent, the agents
//! themselves, external tool servers and loop limits:
//!
//! ```toml
//! [defaults]
//! endpoint = "https://api.example.com/v1/chat/completions"
//! model = "gpt-4o-mini"
//!
//! [[agents]]
//! name = "time_agent"
//! prompt = "You answer questions about the current time."
//!
//! [[agents]]
//! name = "scheduling_agent"
//! prompt = "You plan meetings."
//! native_tools = true
//! ```

use std::fmt;
use std::path::Path;

use bon::Builder;
use serde::{Deserialize, Serialize};

use crate::error::MeshError;

/// Default env var holding the API key.
pub const DEFAULT_API_KEY_ENV: &str = "API_KEY";
const FALLBACK_API_KEY_ENV: &str = "DUMPLINGS_API_KEY";

/// New agent identifier: a v4 UUID in simple (unhyphenated) form.
pub fn new_agent_uuid() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn default_true() -> bool {
    true
}

/// Bounds on a single conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopLimits {
    /// Model requests allowed in one turn before giving up.
    pub max_iterations: usize,
    /// Nested delegations allowed below the agent that received the turn.
    pub max_delegation_depth: usize,
}

impl Default for LoopLimits {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            max_delegation_depth: 8,
        }
    }
}

/// Fully resolved settings for one agent.
#[derive(Clone, Builder, PartialEq, Eq)]
pub struct AgentSettings {
    #[builder(into, default = new_agent_uuid())]
    pub uuid: String,
    #[builder(into)]
    pub name: String,
    /// Base system prompt, before the tool listing is appended.
    #[builder(into, default)]
    pub prompt: String,
    /// Full chat-completions URL.
    #[builder(into)]
    pub endpoint: String,
    #[builder(into)]
    pub model: String,
    #[builder(into, default)]
    pub api_key: String,
    #[builder(default = true)]
    pub stream: bool,
    /// Offer tools through native function-calling instead of inline tags only.
    #[builder(default)]
    pub native_tools: bool,
}

impl fmt::Debug for AgentSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentSettings")
            .field("uuid", &self.uuid)
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("api_key", &if self.api_key.is_empty() { "" } else { "***" })
            .field("stream", &self.stream)
            .field("native_tools", &self.native_tools)
            .finish()
    }
}

/// `[defaults]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentDefaults {
    pub endpoint: Option<String>,
    pub model: Option<String>,
    /// Env var to read the API key from.
    pub api_key_env: String,
    /// Key resolved from the environment; never read from the file.
    #[serde(skip)]
    pub api_key: Option<String>,
    pub stream: bool,
    pub native_tools: bool,
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            endpoint: None,
            model: None,
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            api_key: None,
            stream: true,
            native_tools: false,
        }
    }
}

/// One `[[agents]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSpec {
    #[serde(default)]
    pub uuid: Option<String>,
    pub name: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub stream: Option<bool>,
    #[serde(default)]
    pub native_tools: Option<bool>,
}

impl AgentSpec {
    /// Fill unset fields from `defaults`; `lookup` reads environment variables.
    pub fn resolve(
        &self,
        defaults: &AgentDefaults,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<AgentSettings, MeshError> {
        let endpoint = self
            .endpoint
            .clone()
            .or_else(|| defaults.endpoint.clone())
            .ok_or_else(|| {
                MeshError::Configuration(format!("agent '{}' has no endpoint", self.name))
            })?;
        let model = self
            .model
            .clone()
            .or_else(|| defaults.model.clone())
            .ok_or_else(|| MeshError::Configuration(format!("agent '{}' has no model", self.name)))?;
        let api_key = match &self.api_key_env {
            Some(var) => lookup(var),
            None => defaults.api_key.clone().or_else(|| lookup(&defaults.api_key_env)),
        }
        .unwrap_or_default();

        Ok(AgentSettings {
            uuid: self.uuid.clone().unwrap_or_else(new_agent_uuid),
            name: self.name.clone(),
            prompt: self.prompt.clone(),
            endpoint,
            model,
            api_key,
            stream: self.stream.unwrap_or(defaults.stream),
            native_tools: self.native_tools.unwrap_or(defaults.native_tools),
        })
    }
}

/// One `[[mcp_servers]]` entry: an external tool server started as a child process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpServerSpec {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Agents allowed to call this server's tools; absent means everyone.
    #[serde(default)]
    pub allowed_agents: Option<Vec<String>>,
    /// Seconds an unused session stays open.
    #[serde(default = "default_max_idle_secs")]
    pub max_idle_secs: u64,
}

fn default_max_idle_secs() -> u64 {
    300
}

/// Whole-mesh configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshConfig {
    #[serde(default)]
    pub defaults: AgentDefaults,
    #[serde(default)]
    pub agents: Vec<AgentSpec>,
    #[serde(default)]
    pub mcp_servers: Vec<McpServerSpec>,
    #[serde(default)]
    pub limits: LoopLimits,
}

impl MeshConfig {
    /// Defaults plus environment overrides (loads `.env` if present).
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let mut config = Self::default();
        config.apply_env(|var| std::env::var(var).ok());
        config
    }

    /// Parse a TOML document without consulting the environment.
    pub fn from_toml_str(raw: &str) -> Result<Self, MeshError> {
        let config: Self = toml::from_str(raw)?;
        config.check()?;
        Ok(config)
    }

    /// Read a TOML file, then apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MeshError> {
        let _ = dotenvy::dotenv();
        let raw = std::fs::read_to_string(path.as_ref())?;
        let mut config = Self::from_toml_str(&raw)?;
        config.apply_env(|var| std::env::var(var).ok());
        tracing::debug!(
            path = %path.as_ref().display(),
            agents = config.agents.len(),
            "loaded mesh config"
        );
        Ok(config)
    }

    /// Apply overrides read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(endpoint) = lookup("DUMPLINGS_ENDPOINT") {
            self.defaults.endpoint = Some(endpoint);
        }
        if let Some(model) = lookup("DUMPLINGS_MODEL") {
            self.defaults.model = Some(model);
        }
        self.defaults.api_key = lookup(&self.defaults.api_key_env)
            .or_else(|| lookup(DEFAULT_API_KEY_ENV))
            .or_else(|| lookup(FALLBACK_API_KEY_ENV))
            .or(self.defaults.api_key.take());

        let parse = |var: &str| lookup(var).and_then(|v| v.trim().parse::<usize>().ok());
        if let Some(n) = parse("DUMPLINGS_MAX_ITERATIONS") {
            self.limits.max_iterations = n;
        }
        if let Some(n) = parse("DUMPLINGS_MAX_DELEGATION_DEPTH") {
            self.limits.max_delegation_depth = n;
        }
    }

    /// Resolve every configured agent.
    pub fn resolve_agents(&self) -> Result<Vec<AgentSettings>, MeshError> {
        self.agents
            .iter()
            .map(|spec| spec.resolve(&self.defaults, |var| std::env::var(var).ok()))
            .collect()
    }

    fn check(&self) -> Result<(), MeshError> {
        let mut seen = std::collections::HashSet::new();
        for agent in &self.agents {
            if agent.name.trim().is_empty() {
                return Err(MeshError::Configuration("agent with empty name".into()));
            }
            if !seen.insert(agent.name.as_str()) {
                return Err(MeshError::Configuration(format!(
                    "agent name '{}' is declared twice",
                    agent.name
                )));
            }
            if let Some(uuid) = &agent.uuid {
                if !seen.insert(uuid.as_str()) {
                    return Err(MeshError::Configuration(format!(
                        "agent key '{uuid}' is declared twice"
                    )));
                }
            }
        }
        if self.limits.max_iterations == 0 {
            return Err(MeshError::Configuration(
                "limits.max_iterations must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

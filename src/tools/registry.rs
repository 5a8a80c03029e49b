//! Process-wide, permissioned tool registry.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::builtin::Builtin;
use super::dynamic::{DynamicToolAdapter, DynamicToolProvider};
use super::tool::Tool;
use crate::error::MeshError;
use crate::provider::ToolSchema;

/// Which agents may call a tool.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ToolAccess {
    /// Every agent.
    #[default]
    Unrestricted,
    /// Only the listed agents, by canonical name (or uuid).
    Only(Vec<String>),
}

impl ToolAccess {
    pub fn only<I, S>(agents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Only(agents.into_iter().map(Into::into).collect())
    }

    /// `None` means unrestricted.
    pub fn from_list(agents: Option<Vec<String>>) -> Self {
        agents.map_or(Self::Unrestricted, Self::Only)
    }

    fn admits(&self, key: &str) -> bool {
        match self {
            Self::Unrestricted => true,
            Self::Only(agents) => agents.iter().any(|a| a == key),
        }
    }
}

/// A registered tool plus its allow-list.
#[derive(Clone)]
pub struct ToolDefinition {
    pub tool: Arc<dyn Tool>,
    pub access: ToolAccess,
}

impl ToolDefinition {
    pub fn name(&self) -> &str {
        self.tool.name()
    }

    /// Schema in the shape providers expect.
    pub fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.tool.name().to_string(),
            description: self.tool.description().to_string(),
            parameters: self.tool.parameters().schema.clone(),
        }
    }
}

impl std::fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.tool.name())
            .field("access", &self.access)
            .finish()
    }
}

/// Snapshot row returned by [`ToolRegistry::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSummary {
    pub name: String,
    pub description: String,
    pub access: ToolAccess,
}

#[derive(Default)]
struct RegistryInner {
    // Registration order.
    tools: Vec<ToolDefinition>,
    index: HashMap<String, usize>,
    // uuid -> canonical agent name
    aliases: HashMap<String, String>,
}

/// Tool registry shared by every conversation loop.
///
/// Reads take a shared lock; each registration holds the write lock only
/// for the duration of its own batch.
#[derive(Default)]
pub struct ToolRegistry {
    inner: RwLock<RegistryInner>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a tool. Names are unique and built-in names are reserved.
    pub fn register(&self, tool: Arc<dyn Tool>, access: ToolAccess) -> Result<(), MeshError> {
        self.register_all(vec![tool], access).map(|_| ())
    }

    /// Register a batch of tools under one write lock. Either every tool is
    /// added or, on the first invalid name, none is.
    pub fn register_all(
        &self,
        tools: Vec<Arc<dyn Tool>>,
        access: ToolAccess,
    ) -> Result<usize, MeshError> {
        let mut inner = self.write();
        let mut seen = HashSet::new();
        for tool in &tools {
            let name = tool.name();
            if Builtin::is_reserved(name) {
                return Err(MeshError::ReservedToolName(name.to_string()));
            }
            if inner.index.contains_key(name) || !seen.insert(name) {
                return Err(MeshError::DuplicateTool(name.to_string()));
            }
        }
        let count = tools.len();
        for tool in tools {
            let name = tool.name().to_string();
            let position = inner.tools.len();
            inner.tools.push(ToolDefinition {
                tool,
                access: access.clone(),
            });
            inner.index.insert(name.clone(), position);
            tracing::debug!(tool = %name, "registered tool");
        }
        Ok(count)
    }

    /// Register every tool a dynamic provider currently lists. Returns the
    /// count; nothing is registered if any name is taken.
    pub async fn register_provider(
        &self,
        provider: Arc<dyn DynamicToolProvider>,
        access: ToolAccess,
    ) -> Result<usize, MeshError> {
        let discovered = provider.list_tools().await?;
        let tools: Vec<Arc<dyn Tool>> = discovered
            .into_iter()
            .map(|tool| Arc::new(DynamicToolAdapter::new(Arc::clone(&provider), tool)) as Arc<dyn Tool>)
            .collect();
        let count = self.register_all(tools, access)?;
        tracing::info!(provider = provider.provider_name(), count, "registered provider tools");
        Ok(count)
    }

    /// Record that `uuid` refers to the agent named `name`.
    pub fn register_agent_alias(&self, uuid: impl Into<String>, name: impl Into<String>) {
        let (uuid, name) = (uuid.into(), name.into());
        tracing::debug!(%uuid, %name, "registered agent alias");
        self.write().aliases.insert(uuid, name);
    }

    /// Canonical agent name for a uuid, or the key itself.
    pub fn canonical_name(&self, agent_key: &str) -> String {
        self.read()
            .aliases
            .get(agent_key)
            .cloned()
            .unwrap_or_else(|| agent_key.to_string())
    }

    pub fn lookup(&self, name: &str) -> Result<ToolDefinition, MeshError> {
        let inner = self.read();
        match inner.index.get(name) {
            Some(&position) => Ok(inner.tools[position].clone()),
            None => Err(MeshError::ToolNotFound {
                name: name.to_string(),
                available: inner.tools.iter().map(|d| d.name().to_string()).collect(),
            }),
        }
    }

    /// Whether `agent_key` (uuid or name) may call `name`.
    pub fn is_permitted(&self, agent_key: &str, name: &str) -> bool {
        let canonical = self.canonical_name(agent_key);
        let inner = self.read();
        let Some(&position) = inner.index.get(name) else {
            return false;
        };
        let access = &inner.tools[position].access;
        let permitted = access.admits(&canonical) || access.admits(agent_key);
        if !permitted {
            tracing::debug!(agent = %canonical, tool = %name, "tool not permitted");
        }
        permitted
    }

    /// Tools visible to `agent_key`, in registration order.
    pub fn list_permitted(&self, agent_key: &str) -> Vec<ToolDefinition> {
        let canonical = self.canonical_name(agent_key);
        self.visible_to(&canonical, agent_key)
    }

    fn visible_to(&self, name: &str, uuid: &str) -> Vec<ToolDefinition> {
        self.read()
            .tools
            .iter()
            .filter(|d| d.access.admits(name) || d.access.admits(uuid))
            .cloned()
            .collect()
    }

    pub fn schemas_for(&self, agent_key: &str) -> Vec<ToolSchema> {
        self.list_permitted(agent_key).iter().map(ToolDefinition::schema).collect()
    }

    /// `(name, description)` pairs visible to `agent_key`.
    pub fn descriptions_for(&self, agent_key: &str) -> Vec<(String, String)> {
        self.list_permitted(agent_key)
            .iter()
            .map(|d| (d.name().to_string(), d.tool.description().to_string()))
            .collect()
    }

    /// Like [`Self::descriptions_for`], for an agent whose alias is not
    /// registered yet.
    pub fn descriptions_for_agent(&self, uuid: &str, name: &str) -> Vec<(String, String)> {
        self.visible_to(name, uuid)
            .iter()
            .map(|d| (d.name().to_string(), d.tool.description().to_string()))
            .collect()
    }

    pub fn list(&self) -> Vec<ToolSummary> {
        self.read()
            .tools
            .iter()
            .map(|d| ToolSummary {
                name: d.name().to_string(),
                description: d.tool.description().to_string(),
                access: d.access.clone(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.read();
        f.debug_struct("ToolRegistry")
            .field("tools", &inner.tools)
            .field("aliases", &inner.aliases.len())
            .finish()
    }
}

//! Shared directory of agents, addressable by uuid or by name.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use tokio::sync::{Mutex, MutexGuard};

use super::agent::{Agent, TurnOutcome};
use crate::error::MeshError;

/// One registered agent. Identity is readable without taking the agent lock.
pub struct AgentHandle {
    uuid: String,
    name: String,
    agent: Mutex<Agent>,
}

impl AgentHandle {
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Exclusive access to the agent; one conversation loop at a time.
    pub async fn lock(&self) -> MutexGuard<'_, Agent> {
        self.agent.lock().await
    }

    /// The agent, unless another loop is running on it.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, Agent>> {
        self.agent.try_lock().ok()
    }

    /// Run one user turn on this agent.
    pub async fn converse(&self, message: impl Into<String>) -> Result<TurnOutcome, MeshError> {
        self.lock().await.converse(message).await
    }
}

impl std::fmt::Debug for AgentHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentHandle")
            .field("uuid", &self.uuid)
            .field("name", &self.name)
            .finish()
    }
}

#[derive(Default)]
struct DirectoryInner {
    by_key: HashMap<String, Arc<AgentHandle>>,
    // Insertion order, one entry per agent.
    order: Vec<Arc<AgentHandle>>,
}

/// Agent directory passed explicitly to every agent it holds.
///
/// Both the uuid and the name of an agent map to the same [`AgentHandle`].
#[derive(Clone, Default)]
pub struct AgentDirectory {
    inner: Arc<RwLock<DirectoryInner>>,
}

/// Non-owning reference an agent keeps to its directory.
#[derive(Clone, Default)]
pub(crate) struct DirectoryLink(Weak<RwLock<DirectoryInner>>);

impl DirectoryLink {
    pub(crate) fn upgrade(&self) -> Option<AgentDirectory> {
        self.0.upgrade().map(|inner| AgentDirectory { inner })
    }
}

impl AgentDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, DirectoryInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, DirectoryInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert an agent under both of its keys.
    pub fn insert(&self, mut agent: Agent) -> Result<Arc<AgentHandle>, MeshError> {
        let uuid = agent.uuid().to_string();
        let name = agent.name().to_string();
        agent.attach_directory(DirectoryLink(Arc::downgrade(&self.inner)));

        let mut inner = self.write();
        for key in [&uuid, &name] {
            if inner.by_key.contains_key(key.as_str()) {
                return Err(MeshError::Configuration(format!(
                    "agent key '{key}' is already registered"
                )));
            }
        }
        let handle = Arc::new(AgentHandle {
            uuid: uuid.clone(),
            name: name.clone(),
            agent: Mutex::new(agent),
        });
        inner.by_key.insert(uuid.clone(), Arc::clone(&handle));
        inner.by_key.insert(name.clone(), Arc::clone(&handle));
        inner.order.push(Arc::clone(&handle));
        tracing::debug!(%uuid, %name, "agent joined directory");
        Ok(handle)
    }

    /// Look up by uuid or name.
    pub fn get(&self, key: &str) -> Option<Arc<AgentHandle>> {
        self.read().by_key.get(key).cloned()
    }

    pub fn resolve(&self, key: &str) -> Result<Arc<AgentHandle>, MeshError> {
        self.get(key)
            .ok_or_else(|| MeshError::AgentNotFound(key.to_string()))
    }

    /// `(name, uuid)` of every agent, in insertion order.
    pub fn peers(&self) -> Vec<(String, String)> {
        self.read()
            .order
            .iter()
            .map(|h| (h.name.clone(), h.uuid.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for AgentDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentDirectory")
            .field("agents", &self.peers())
            .finish()
    }
}

//! Keep-alive pool holding at most one session per server.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use super::session::{McpConnector, McpSession};
use crate::error::MeshError;

struct PooledSession {
    session: Arc<dyn McpSession>,
    last_used: Instant,
}

/// Reuses one session while it is in use and retires it after `max_idle`.
/// The next call after retirement opens a fresh session.
pub struct McpSessionPool {
    connector: Arc<dyn McpConnector>,
    max_idle: Duration,
    slot: Mutex<Option<PooledSession>>,
}

impl McpSessionPool {
    pub fn new(connector: Arc<dyn McpConnector>, max_idle: Duration) -> Self {
        Self {
            connector,
            max_idle,
            slot: Mutex::new(None),
        }
    }

    pub fn server_name(&self) -> &str {
        self.connector.server_name()
    }

    /// A live session, opening one if needed.
    pub async fn session(&self) -> Result<Arc<dyn McpSession>, MeshError> {
        let mut slot = self.slot.lock().await;
        let now = Instant::now();
        let stale = slot.as_ref().is_some_and(|p| {
            now.duration_since(p.last_used) > self.max_idle || p.session.is_closed()
        });
        if stale {
            tracing::debug!(server = self.server_name(), "retiring MCP session");
            *slot = None;
        }
        if let Some(pooled) = slot.as_mut() {
            pooled.last_used = now;
            return Ok(Arc::clone(&pooled.session));
        }

        tracing::info!(server = self.server_name(), "opening MCP session");
        let session = self.connector.connect().await?;
        *slot = Some(PooledSession {
            session: Arc::clone(&session),
            last_used: now,
        });
        Ok(session)
    }

    /// Drop the session if it has been idle too long. Returns whether one was retired.
    pub async fn retire_idle(&self) -> bool {
        let mut slot = self.slot.lock().await;
        let idle = slot
            .as_ref()
            .is_some_and(|p| p.last_used.elapsed() > self.max_idle || p.session.is_closed());
        if idle {
            tracing::debug!(server = self.server_name(), "retired idle MCP session");
            *slot = None;
        }
        idle
    }

    pub async fn is_open(&self) -> bool {
        self.slot.lock().await.is_some()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::mcp::session::{McpCallResult, McpToolSchema};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    pub(crate) struct FakeSession {
        pub(crate) closed: AtomicBool,
        pub(crate) calls: std::sync::Mutex<Vec<(String, Option<serde_json::Map<String, serde_json::Value>>)>>,
    }

    #[async_trait]
    impl McpSession for FakeSession {
        async fn list_tools(&self) -> Result<Vec<McpToolSchema>, MeshError> {
            Ok(vec![McpToolSchema {
                name: "read_file".into(),
                description: Some("Read a file".into()),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": { "path": { "type": "string" } },
                    "required": ["path"]
                }),
            }])
        }

        async fn call_tool(
            &self,
            name: &str,
            arguments: Option<serde_json::Map<String, serde_json::Value>>,
        ) -> Result<McpCallResult, MeshError> {
            self.calls.lock().unwrap().push((name.to_string(), arguments));
            Ok(McpCallResult {
                text_content: Some("file body".into()),
                ..Default::default()
            })
        }

        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    #[derive(Default)]
    pub(crate) struct FakeConnector {
        pub(crate) opened: AtomicUsize,
        pub(crate) sessions: std::sync::Mutex<Vec<Arc<FakeSession>>>,
    }

    #[async_trait]
    impl McpConnector for FakeConnector {
        fn server_name(&self) -> &str {
            "fake"
        }

        async fn connect(&self) -> Result<Arc<dyn McpSession>, MeshError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            let session = Arc::new(FakeSession {
                closed: AtomicBool::new(false),
                calls: std::sync::Mutex::new(Vec::new()),
            });
            self.sessions.lock().unwrap().push(Arc::clone(&session));
            Ok(session)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn session_is_reused_while_active() {
        let connector = Arc::new(FakeConnector::default());
        let pool = McpSessionPool::new(connector.clone(), Duration::from_secs(60));

        pool.session().await.unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;
        pool.session().await.unwrap();
        tokio::time::advance(Duration::from_secs(45)).await;
        pool.session().await.unwrap();

        assert_eq!(connector.opened.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_session_is_retired_and_reopened() {
        let connector = Arc::new(FakeConnector::default());
        let pool = McpSessionPool::new(connector.clone(), Duration::from_secs(60));

        pool.session().await.unwrap();
        assert!(!pool.retire_idle().await);
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(pool.retire_idle().await);
        assert!(!pool.is_open().await);

        pool.session().await.unwrap();
        assert_eq!(connector.opened.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn closed_session_is_replaced() {
        let connector = Arc::new(FakeConnector::default());
        let pool = McpSessionPool::new(connector.clone(), Duration::from_secs(60));

        pool.session().await.unwrap();
        connector.sessions.lock().unwrap()[0]
            .closed
            .store(true, Ordering::SeqCst);
        pool.session().await.unwrap();
        assert_eq!(connector.opened.load(Ordering::SeqCst), 2);
    }
}

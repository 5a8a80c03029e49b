//! External tool servers speaking the Model Context Protocol.
//!
//! A server's tools are listed once and registered like local tools; calls
//! go through a pooled session that is retired after sitting idle. The
//! child-process client needs the `mcp` feature.

pub mod bridge;
#[cfg(feature = "mcp")]
pub mod client;
pub mod pool;
pub mod session;

pub use bridge::McpToolProvider;
#[cfg(feature = "mcp")]
pub use client::{provider_from_spec, ChildProcessConnector};
pub use pool::McpSessionPool;
pub use session::{McpCallResult, McpConnector, McpSession, McpToolSchema};

//! Tool system: definitions, arguments and the permissioned registry.

pub mod arguments;
pub mod builtin;
pub mod dynamic;
pub mod registry;
pub mod tool;
pub mod types;

pub use arguments::ToolArguments;
pub use builtin::{Builtin, COMPLETION_MARKER};
pub use dynamic::{DynamicTool, DynamicToolAdapter, DynamicToolProvider};
pub use registry::{ToolAccess, ToolDefinition, ToolRegistry, ToolSummary};
pub use tool::{render_result, CallingConvention, FnTool, Tool, ToolContext, ToolInput};
pub use types::ToolParameters;

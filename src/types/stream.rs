//! Streaming types.

use serde::{Deserialize, Serialize};

use super::usage::Usage;

/// One event from an incremental model response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Incremental text content.
    TextDelta { text: String },
    /// A partial native tool call.
    ToolCallDelta(ToolCallFragment),
    /// Trailing usage summary.
    Usage(Usage),
    /// Stream finished.
    Done,
}

/// A fragment of a native tool call, keyed by its position in the response.
///
/// The first fragment for an index carries the id and name; later fragments
/// usually carry only more argument text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallFragment {
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

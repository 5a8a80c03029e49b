//! Error types for the agent mesh.

use thiserror::Error;

/// Primary error type for all mesh operations.
#[derive(Error, Debug)]
pub enum MeshError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Agent '{agent}' failed its connectivity check: {reason}")]
    Connectivity { agent: String, reason: String },

    #[error("Tool '{0}' is already registered")]
    DuplicateTool(String),

    #[error("Tool name '{0}' is reserved for agent built-ins")]
    ReservedToolName(String),

    #[error("Tool '{name}' not found (available: {})", available.join(", "))]
    ToolNotFound { name: String, available: Vec<String> },

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("No agent registered under '{0}'")]
    AgentNotFound(String),

    #[error("Delegation to '{target}' refused: {reason}")]
    DelegationRefused { target: String, reason: String },

    #[error("Agent '{agent}' exceeded {limit} model requests in one turn")]
    IterationLimit { agent: String, limit: usize },

    #[error("Malformed tool block: {0}")]
    TagParse(String),

    #[error("Provider error: {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Authentication,
    RateLimit,
    Network,
    Server,
    Api,
    Configuration,
    Serialization,
    ToolExecution,
    Conversation,
    Unknown,
}

impl MeshError {
    /// Create an API error.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Network(_) | Self::Stream(_) => ErrorCategory::Network,
            Self::Configuration(_) | Self::Toml(_) | Self::Connectivity { .. } => {
                ErrorCategory::Configuration
            }
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::Api { status, .. } => match status {
                401 | 403 => ErrorCategory::Authentication,
                429 => ErrorCategory::RateLimit,
                500..=599 => ErrorCategory::Server,
                _ => ErrorCategory::Api,
            },
            Self::ToolExecution { .. } | Self::InvalidArgument(_) => ErrorCategory::ToolExecution,
            Self::ToolNotFound { .. }
            | Self::AgentNotFound(_)
            | Self::DelegationRefused { .. }
            | Self::TagParse(_) => ErrorCategory::Conversation,
            _ => ErrorCategory::Unknown,
        }
    }

    /// Whether this error is potentially retryable.
    ///
    /// The conversation loop never retries on its own; this is for callers.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::RateLimit | ErrorCategory::Network | ErrorCategory::Server
        )
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, MeshError>;

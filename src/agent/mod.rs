//! Agents: conversation loop, built-in capabilities and the shared directory.

#[allow(clippy::module_inception)]
pub mod agent;
pub mod conversation;
pub mod directory;
pub mod events;

pub use agent::{Agent, AgentBuilder, TurnOutcome};
pub use conversation::Conversation;
pub use directory::{AgentDirectory, AgentHandle};
pub use events::{collecting_sink, noop_sink, stdout_sink, AgentEvent, EventSink};

pub use crate::dispatch::AgentCapabilities;

#[cfg(test)]
pub(crate) mod test_support {
    use async_trait::async_trait;

    use crate::error::MeshError;
    use crate::provider::{ChatEventStream, ChatRequest, ChatResponse, ChatTransport};

    /// Answers every request with a fixed text, or fails every request.
    pub(crate) struct FixedTransport {
        pub(crate) reply: Result<String, u16>,
    }

    #[async_trait]
    impl ChatTransport for FixedTransport {
        fn endpoint(&self) -> &str {
            "mock://fixed"
        }

        async fn complete(&self, _request: &ChatRequest) -> Result<ChatResponse, MeshError> {
            match &self.reply {
                Ok(text) => Ok(ChatResponse {
                    text: text.clone(),
                    ..Default::default()
                }),
                Err(status) => Err(MeshError::api(*status, "rejected")),
            }
        }

        async fn stream(&self, _request: &ChatRequest) -> Result<ChatEventStream, MeshError> {
            Err(MeshError::Stream("streaming not scripted".into()))
        }
    }
}

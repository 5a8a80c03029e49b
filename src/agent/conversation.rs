//! Per-agent conversation history.

use crate::types::{ModelMessage, Role};

/// Ordered message history whose first entry is always the system prompt.
#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<ModelMessage>,
}

impl Conversation {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![ModelMessage::system(system_prompt)],
        }
    }

    pub fn system_prompt(&self) -> String {
        self.messages[0].text()
    }

    pub fn messages(&self) -> &[ModelMessage] {
        &self.messages
    }

    pub fn push(&mut self, message: ModelMessage) {
        self.messages.push(message);
    }

    pub fn last(&self) -> Option<&ModelMessage> {
        self.messages.last()
    }

    /// Messages with the given role, oldest first.
    pub fn with_role(&self, role: Role) -> impl Iterator<Item = &ModelMessage> {
        self.messages.iter().filter(move |m| m.role == role)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Drop everything but the system prompt.
    pub fn reset(&mut self) {
        self.messages.truncate(1);
    }
}

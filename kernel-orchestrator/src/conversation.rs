//! Conversation messages threaded through the orchestrator's tool loop.

use serde::{Deserialize, Serialize};

/// Role of one [`ConversationMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// System prompt.
    System,
    /// End-user turn.
    User,
    /// Model turn.
    Assistant,
}

/// One turn in the conversation passed to a [`crate::StreamProvider`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    /// Who sent this message.
    pub role: Role,
    /// Message text. Tool-result messages hold the rendered tool output.
    pub content: String,
}

impl ConversationMessage {
    /// Build a user-role message.
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    /// Build an assistant-role message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

//! Stream events and state-machine states for the orchestrator.

use crate::id::ToolCallId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One event flowing out of a `ProviderAdapter`'s stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A content token.
    Token {
        /// The token's text content.
        content: String,
    },
    /// A tool call started.
    ToolStart {
        /// Identifier for this tool call, stable until `ToolResult`.
        tool_call_id: ToolCallId,
        /// Name of the tool being invoked.
        name: String,
        /// Partial or complete JSON arguments accumulated so far.
        args: serde_json::Value,
    },
    /// A tool call resolved.
    ToolResult {
        /// Identifier matching the originating `ToolStart`.
        tool_call_id: ToolCallId,
        /// Tool output content, or an error description.
        content: String,
        /// Whether the tool call succeeded.
        success: bool,
        /// How long the tool call took.
        #[serde(with = "duration_millis")]
        duration: Duration,
    },
    /// Extended thinking started.
    ThinkingStart,
    /// A chunk of extended-thinking content.
    ThinkingToken {
        /// The thinking token's text content.
        content: String,
    },
    /// Extended thinking ended.
    ThinkingEnd,
    /// Usage/provider metadata, not part of the visible content.
    Metadata {
        /// Provider name.
        provider: String,
        /// Model identifier.
        model: String,
        /// Input tokens consumed so far.
        input_tokens: u32,
        /// Output tokens produced so far.
        output_tokens: u32,
    },
    /// A terminal or recoverable error.
    Error {
        /// Machine-readable error code.
        code: String,
        /// Human-readable message.
        message: String,
        /// Whether retrying might succeed.
        retryable: bool,
    },
    /// The stream finished normally.
    Done {
        /// Full assistant content produced this turn.
        content: String,
        /// Why the stream stopped (e.g. `"end_turn"`, `"tool_use"`, `"max_tokens"`).
        reason: String,
        /// Run-level counters as of this event.
        metrics: StreamMetrics,
    },
}

/// Run-level counters attached to a [`StreamEvent::Done`], so a consumer can
/// read final token/cost counts straight off the terminal event instead of
/// polling a side-channel accessor.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct StreamMetrics {
    /// Input tokens consumed this run.
    pub input_tokens: u32,
    /// Output tokens yielded this run; equals the number of `Token` events.
    pub output_tokens: u32,
    /// Number of tool calls resolved this run.
    pub tool_call_count: u32,
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u128(d.as_millis())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}

/// State of one orchestrated stream run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    /// No stream has started yet.
    Idle,
    /// Actively receiving content tokens.
    Streaming,
    /// Waiting on one or more tool calls to resolve.
    ToolExecuting,
    /// Receiving extended-thinking tokens.
    Thinking,
    /// The run finished (normally or via `abort()`).
    Completed,
    /// The run ended in a non-recoverable error.
    Error,
}

impl StreamState {
    /// Whether `self -> next` is a legal transition under §4.4's state graph.
    pub fn can_transition_to(self, next: StreamState) -> bool {
        use StreamState::*;
        match (self, next) {
            (_, Error) => true,
            (Idle, Streaming) => true,
            (Streaming, Thinking) => true,
            (Thinking, Streaming) => true,
            (Streaming, ToolExecuting) => true,
            (ToolExecuting, Streaming) => true,
            (Streaming, Completed) => true,
            (ToolExecuting, Completed) => true,
            (Thinking, Completed) => true,
            _ => false,
        }
    }
}

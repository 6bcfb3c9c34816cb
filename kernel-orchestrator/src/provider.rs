//! Provider adapter interface consumed by the orchestrator.

use crate::conversation::ConversationMessage;
use kernel_types::stream::{StreamEvent, StreamMetrics};
use std::future::Future;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

/// Stream of [`StreamEvent`]s boxed for object safety.
pub type EventStream = Pin<Box<dyn futures::Stream<Item = StreamEvent> + Send>>;

/// One tool definition advertised to the provider.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    /// Tool name, matched against [`crate::ToolRegistry`] entries.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON schema for the tool's input.
    pub input_schema: serde_json::Value,
}

/// Options threaded through to a provider adapter for one turn.
#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// Model identifier to use.
    pub model: String,
    /// Tools the model may call this turn.
    pub tools: Vec<ToolDefinition>,
    /// Sampling temperature, if supported.
    pub temperature: Option<f64>,
    /// Hard cap on output tokens.
    pub max_tokens: Option<u32>,
    /// Whether to request extended-thinking tokens, if supported.
    pub enable_thinking: bool,
    /// Thinking token budget, if `enable_thinking` is set.
    pub thinking_budget: Option<u32>,
    /// Cooperative cancellation handle.
    pub cancellation: CancellationToken,
}

/// A backend capable of streaming one LLM turn.
///
/// Object-safe for the same reason as `kernel-racer`'s `ProviderAdapter`:
/// the orchestrator boxes both the setup future and the resulting stream so
/// it can hold `Arc<dyn StreamProvider>` without naming a concrete type.
pub trait StreamProvider: Send + Sync {
    /// Begin streaming a completion for `messages` under `options`.
    fn stream(
        &self,
        messages: Vec<ConversationMessage>,
        options: StreamOptions,
    ) -> Pin<Box<dyn Future<Output = EventStream> + Send + '_>>;
}

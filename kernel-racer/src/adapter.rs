//! Provider adapter interface consumed by the racer.

use kernel_types::stream::{StreamEvent, StreamMetrics};
use std::future::Future;
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

/// Stream of [`StreamEvent`]s boxed for object safety, mirroring the
/// type-erased sequence a `Stream<Item = StreamEvent> + Send` would produce.
pub type EventStream = Pin<Box<dyn futures::Stream<Item = StreamEvent> + Send>>;

/// Options threaded through to a provider adapter for one turn.
#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// Model identifier to use.
    pub model: String,
    /// Sampling temperature, if supported.
    pub temperature: Option<f64>,
    /// Hard cap on output tokens.
    pub max_tokens: Option<u32>,
    /// Whether to request extended-thinking tokens, if supported.
    pub enable_thinking: bool,
    /// Thinking token budget, if `enable_thinking` is set.
    pub thinking_budget: Option<u32>,
    /// Cooperative cancellation handle; the adapter should stop promptly
    /// once this is cancelled.
    pub cancellation: CancellationToken,
}

/// A backend capable of streaming one LLM turn.
///
/// Unlike the RPITIT-based `Provider` trait it descends from, `ProviderAdapter`
/// is object-safe: the racer holds a `Vec<Arc<dyn ProviderAdapter>>` and
/// launches them concurrently, so boxing the future and the resulting
/// stream is the price of that flexibility.
pub trait ProviderAdapter: Send + Sync {
    /// Provider name, e.g. `"anthropic"`.
    fn provider(&self) -> &str;

    /// Begin streaming a completion for `messages` under `options`.
    fn stream(
        &self,
        messages: Vec<String>,
        options: StreamOptions,
    ) -> Pin<Box<dyn Future<Output = EventStream> + Send + '_>>;
}

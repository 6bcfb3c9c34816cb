//! Tool registry consulted during the orchestrator's tool-execution state.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Result of invoking one tool handler.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Rendered content, success or error description.
    pub content: String,
    /// Whether the call succeeded.
    pub success: bool,
}

impl ToolOutput {
    /// Build a successful output.
    pub fn ok(content: impl Into<String>) -> Self {
        Self { content: content.into(), success: true }
    }

    /// Build a failed output.
    pub fn failed(content: impl Into<String>) -> Self {
        Self { content: content.into(), success: false }
    }
}

/// A tool the orchestrator can dispatch `ToolStart` calls to.
pub trait ToolHandler: Send + Sync {
    /// Run the tool against its arguments.
    fn call(&self, args: serde_json::Value) -> Pin<Box<dyn Future<Output = ToolOutput> + Send + '_>>;
}

/// Name-keyed set of registered [`ToolHandler`]s.
///
/// A `ToolStart` naming an unregistered tool yields a failed [`ToolOutput`]
/// rather than aborting the stream.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    /// Build an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under `name`, replacing any prior registration.
    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn ToolHandler>) {
        self.handlers.insert(name.into(), handler);
    }

    /// Invoke the handler for `name`, or a failed output if none is registered.
    pub async fn dispatch(&self, name: &str, args: serde_json::Value) -> ToolOutput {
        match self.handlers.get(name) {
            Some(handler) => handler.call(args).await,
            None => ToolOutput::failed(format!("no handler registered for tool '{name}'")),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub struct EchoTool;

    impl ToolHandler for EchoTool {
        fn call(&self, args: serde_json::Value) -> Pin<Box<dyn Future<Output = ToolOutput> + Send + '_>> {
            Box::pin(async move { ToolOutput::ok(args.to_string()) })
        }
    }
}

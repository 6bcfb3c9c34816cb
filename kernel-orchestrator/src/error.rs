//! Error types for the orchestrator.

use kernel_types::stream::StreamState;
use thiserror::Error;

/// Errors from [`crate::StreamOrchestrator`].
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// `maxToolCalls` was reached mid-turn.
    #[error("max tool calls exceeded")]
    MaxToolCallsExceeded,

    /// The provider adapter reported a non-retryable failure.
    #[error("adapter error: {0}")]
    AdapterError(String),

    /// An illegal state transition was attempted.
    #[error("invalid transition from {from:?} to {to:?}")]
    InvalidTransition {
        /// Originating state.
        from: StreamState,
        /// Rejected destination state.
        to: StreamState,
    },

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

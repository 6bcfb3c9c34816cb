//! Errors raised by the event bus.

use thiserror::Error;

/// Errors from [`crate::EventBus`] operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BusError {
    /// `wait_for` did not observe a matching event before its timeout elapsed.
    #[error("wait_for timed out after {0:?}")]
    WaitTimeout(std::time::Duration),

    /// A topic or prefix string failed validation (empty, or containing
    /// whitespace).
    #[error("invalid topic: {0:?}")]
    InvalidTopic(String),

    /// Catch-all for errors from handler execution or other failures.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

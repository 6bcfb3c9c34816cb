//! Errors from the Active Inference engine and autonomous loop.

use thiserror::Error;

/// Errors from [`crate::engine::ActiveInferenceEngine`] and
/// [`crate::autonomous_loop::AutonomousLoop`].
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum EngineError {
    /// A belief or policy failed its normalisation invariant mid-step.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// `run()` was called while a previous run on the same loop was still active.
    #[error("loop is already running")]
    AlreadyRunning,

    /// The configured action executor returned an error.
    #[error("action executor failed: {0}")]
    ActionExecutorFailed(String),

    /// An observation fell outside its declared domain.
    #[error(transparent)]
    OutOfDomain(#[from] kernel_types::observation::OutOfDomain),

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

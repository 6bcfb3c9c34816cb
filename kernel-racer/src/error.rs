//! Error types for the racer.

use std::time::Duration;
use thiserror::Error;

/// Errors from [`crate::ModelRacer`] and [`crate::LatencyTracker`].
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RacerError {
    /// Every candidate failed or errored before producing a token.
    #[error("all racing candidates failed")]
    AllCandidatesFailed,

    /// No candidate produced a token within the configured timeout.
    #[error("race timed out after {0:?}")]
    Timeout(Duration),

    /// `racing_candidates` returned an empty set, or all were excluded.
    #[error("no candidates available to race")]
    NoCandidates,

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

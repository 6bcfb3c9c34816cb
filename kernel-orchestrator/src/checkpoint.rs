//! Suspend and resume a stream run mid-turn.

use crate::metrics::OrchestratorMetrics;
use kernel_types::stream::StreamState;

/// Captured state of one in-progress or finished run.
///
/// `resume_from` re-enters `streaming` with `content_so_far` as the
/// assistant prefix, continuing the conversation rather than restarting it.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    /// Assistant content accumulated up to the checkpoint.
    pub content_so_far: String,
    /// Metrics accumulated up to the checkpoint.
    pub metrics: OrchestratorMetrics,
    /// State at the moment of the checkpoint.
    pub state: StreamState,
}

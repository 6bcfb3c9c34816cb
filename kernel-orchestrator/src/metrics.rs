//! Live metrics accumulated over one orchestrated stream run.

use kernel_types::stream::StreamMetrics;
use rust_decimal::Decimal;
use std::time::Duration;

/// Snapshot of one run's metrics so far.
///
/// Cheap to clone; the orchestrator keeps one behind a `Mutex` and hands out
/// copies so callers can poll it without synchronising with the stream.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorMetrics {
    /// Input tokens consumed so far.
    pub input_tokens: u32,
    /// Output tokens produced so far.
    pub output_tokens: u32,
    /// Extended-thinking tokens produced so far.
    pub thinking_tokens: u32,
    /// Time from `execute()` to the first `Token` event.
    pub time_to_first_token: Option<Duration>,
    /// Number of tool calls resolved so far.
    pub tool_call_count: u32,
    /// Cumulative wall time spent inside tool handlers.
    pub tool_latency: Duration,
    /// Estimated cost from the configured [`crate::ModelCost`] table.
    pub estimated_cost: Decimal,
}

impl OrchestratorMetrics {
    /// Output tokens divided by elapsed wall time, or 0 before any elapse.
    pub fn tokens_per_second(&self, elapsed: Duration) -> f64 {
        let secs = elapsed.as_secs_f64();
        if secs > 0.0 {
            self.output_tokens as f64 / secs
        } else {
            0.0
        }
    }

    /// Snapshot the counters a [`kernel_types::stream::StreamEvent::Done`] carries.
    pub fn to_stream_metrics(&self) -> StreamMetrics {
        StreamMetrics {
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
            tool_call_count: self.tool_call_count,
        }
    }
}

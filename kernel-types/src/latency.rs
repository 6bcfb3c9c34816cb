//! Latency statistics and racing candidate scoring shared by the racer.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One streaming-LLM outcome, as recorded by a [`crate::latency::ProviderStats`] tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyRecord {
    /// Backend provider name (e.g. `"anthropic"`).
    pub provider: String,
    /// Model identifier (e.g. `"claude-sonnet"`).
    pub model: String,
    /// Time to first token, in milliseconds.
    pub ttft_ms: f64,
    /// Tokens emitted per second after the first token.
    pub tokens_per_sec: f64,
    /// Total wall-clock latency for the completed stream, in milliseconds.
    pub total_latency_ms: f64,
    /// Number of tokens emitted.
    pub token_count: u32,
    /// Whether the stream completed successfully.
    pub success: bool,
}

impl LatencyRecord {
    /// A failure record for a candidate that never produced output.
    pub fn failure(provider: impl Into<String>, model: impl Into<String>, ttft_ms: f64) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            ttft_ms,
            tokens_per_sec: 0.0,
            total_latency_ms: ttft_ms,
            token_count: 0,
            success: false,
        }
    }
}

/// Exponentially-weighted aggregate latency statistics for one `(provider, model)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProviderStats {
    /// Smoothed mean time to first token, in milliseconds.
    pub mean_ttft_ms: f64,
    /// Smoothed mean tokens per second.
    pub mean_tokens_per_sec: f64,
    /// Fraction of recorded attempts that succeeded.
    pub success_rate: f64,
    /// Confidence in these statistics, monotone in sample count, saturating near 1.
    pub confidence: f64,
    /// Number of records this summary is derived from.
    pub sample_count: u32,
}

impl ProviderStats {
    /// Confidence as a function of sample count: `n / (n + k)`, `k = 5`.
    ///
    /// Zero samples yields zero confidence; confidence increases monotonically
    /// and asymptotes toward 1 without ever reaching it exactly.
    pub fn confidence_for_sample_count(n: u32) -> f64 {
        const K: f64 = 5.0;
        n as f64 / (n as f64 + K)
    }
}

/// A scored `(provider, model)` choice produced by the racer's ranking step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RacingCandidate {
    /// Backend provider name.
    pub provider: String,
    /// Model identifier.
    pub model: String,
    /// Expected time to first token, in milliseconds.
    pub expected_ttft_ms: f64,
    /// Expected tokens per second.
    pub expected_tokens_per_sec: f64,
    /// Confidence in the expectations above.
    pub confidence: f64,
    /// Cost per token, used to penalise candidates when not preferring speed.
    pub cost_per_token: Decimal,
    /// Composite ranking score; higher is better.
    pub score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_increases_with_samples() {
        let c0 = ProviderStats::confidence_for_sample_count(0);
        let c1 = ProviderStats::confidence_for_sample_count(5);
        let c2 = ProviderStats::confidence_for_sample_count(500);
        assert_eq!(c0, 0.0);
        assert!(c1 > c0);
        assert!(c2 > c1);
        assert!(c2 < 1.0);
    }

    #[test]
    fn failure_record_has_zero_tokens() {
        let r = LatencyRecord::failure("acme", "acme-1", 5000.0);
        assert!(!r.success);
        assert_eq!(r.token_count, 0);
        assert_eq!(r.ttft_ms, 5000.0);
    }
}

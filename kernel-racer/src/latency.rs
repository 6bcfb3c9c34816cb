//! Per-backend latency statistics feeding the racer's candidate ranking.

use kernel_types::latency::{LatencyRecord, ProviderStats, RacingCandidate};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

const DEFAULT_WINDOW: usize = 64;
const EMA_ALPHA: f64 = 0.3;

/// A known backend the tracker can race even before any records exist for it.
#[derive(Debug, Clone)]
struct Backend {
    cost_per_token: Decimal,
}

/// Options for [`LatencyTracker::racing_candidates`].
#[derive(Debug, Clone, Default)]
pub struct RacingQuery {
    /// Cap on the number of candidates returned.
    pub max: Option<usize>,
    /// Weight tokens-per-second and ignore cost penalties.
    pub prefer_speed: bool,
    /// Providers to exclude from consideration.
    pub exclude_providers: Vec<String>,
}

/// A process-wide store of recent [`LatencyRecord`]s keyed by `(provider, model)`.
///
/// Each key keeps a bounded FIFO window; `stats` folds the window into an
/// exponentially-weighted summary so recent behaviour dominates without
/// discarding history outright.
pub struct LatencyTracker {
    window: usize,
    records: Mutex<HashMap<(String, String), VecDeque<LatencyRecord>>>,
    backends: Mutex<HashMap<(String, String), Backend>>,
}

impl Default for LatencyTracker {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl LatencyTracker {
    /// Create a tracker retaining up to `window` records per `(provider, model)`.
    pub fn new(window: usize) -> Self {
        Self { window, records: Mutex::new(HashMap::new()), backends: Mutex::new(HashMap::new()) }
    }

    /// Register a backend as available for racing, with its per-token cost.
    ///
    /// Unregistered backends never appear in [`Self::racing_candidates`],
    /// even if latency records exist for them from a prior process.
    pub fn register(&self, provider: impl Into<String>, model: impl Into<String>, cost_per_token: Decimal) {
        let mut backends = self.backends.lock().expect("backends mutex poisoned");
        backends.insert((provider.into(), model.into()), Backend { cost_per_token });
    }

    /// Append a latency record, evicting the oldest entry beyond the window.
    pub fn record(&self, record: LatencyRecord) {
        let key = (record.provider.clone(), record.model.clone());
        let mut records = self.records.lock().expect("records mutex poisoned");
        let deque = records.entry(key).or_default();
        deque.push_back(record);
        while deque.len() > self.window {
            deque.pop_front();
        }
    }

    /// Exponentially-weighted statistics for one `(provider, model)`.
    ///
    /// Returns zeroed stats with zero confidence when no records exist yet.
    pub fn stats(&self, provider: &str, model: &str) -> ProviderStats {
        let records = self.records.lock().expect("records mutex poisoned");
        let Some(deque) = records.get(&(provider.to_string(), model.to_string())) else {
            return ProviderStats {
                mean_ttft_ms: 0.0,
                mean_tokens_per_sec: 0.0,
                success_rate: 0.0,
                confidence: 0.0,
                sample_count: 0,
            };
        };
        if deque.is_empty() {
            return ProviderStats {
                mean_ttft_ms: 0.0,
                mean_tokens_per_sec: 0.0,
                success_rate: 0.0,
                confidence: 0.0,
                sample_count: 0,
            };
        }

        let mut mean_ttft = deque[0].ttft_ms;
        let mut mean_tps = deque[0].tokens_per_sec;
        let mut successes = if deque[0].success { 1.0 } else { 0.0 };
        for r in deque.iter().skip(1) {
            mean_ttft = EMA_ALPHA * r.ttft_ms + (1.0 - EMA_ALPHA) * mean_ttft;
            mean_tps = EMA_ALPHA * r.tokens_per_sec + (1.0 - EMA_ALPHA) * mean_tps;
            successes += if r.success { 1.0 } else { 0.0 };
        }

        let sample_count = deque.len() as u32;
        ProviderStats {
            mean_ttft_ms: mean_ttft,
            mean_tokens_per_sec: mean_tps,
            success_rate: successes / deque.len() as f64,
            confidence: ProviderStats::confidence_for_sample_count(sample_count),
            sample_count,
        }
    }

    /// Rank registered backends into scored racing candidates.
    ///
    /// Score is a weighted sum of `1 / expected_ttft`, `expected_tokens_per_sec`,
    /// and `confidence`; unless `prefer_speed` is set, the score is penalised
    /// by `cost_per_token`. Backends with no recorded history still appear,
    /// scored from conservative defaults, so a fresh process can race at all.
    pub fn racing_candidates(&self, query: &RacingQuery) -> Vec<RacingCandidate> {
        let backends = self.backends.lock().expect("backends mutex poisoned").clone();
        let mut candidates: Vec<RacingCandidate> = backends
            .into_iter()
            .filter(|((provider, _), _)| !query.exclude_providers.iter().any(|p| p == provider))
            .map(|((provider, model), backend)| {
                let stats = self.stats(&provider, &model);
                let expected_ttft_ms = if stats.sample_count == 0 { 1000.0 } else { stats.mean_ttft_ms };
                let expected_tokens_per_sec = if stats.sample_count == 0 { 20.0 } else { stats.mean_tokens_per_sec };
                let confidence = stats.confidence;

                let mut score = (1.0 / expected_ttft_ms.max(1.0)) * 1000.0 + expected_tokens_per_sec + confidence;
                if !query.prefer_speed {
                    let cost = backend.cost_per_token.to_f64().unwrap_or(0.0);
                    score -= cost * 1000.0;
                }

                RacingCandidate {
                    provider,
                    model,
                    expected_ttft_ms,
                    expected_tokens_per_sec,
                    confidence,
                    cost_per_token: backend.cost_per_token,
                    score,
                }
            })
            .collect();

        candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        if let Some(max) = query.max {
            candidates.truncate(max);
        }
        candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(provider: &str, model: &str, ttft: f64, tps: f64, success: bool) -> LatencyRecord {
        LatencyRecord {
            provider: provider.into(),
            model: model.into(),
            ttft_ms: ttft,
            tokens_per_sec: tps,
            total_latency_ms: ttft + 1000.0,
            token_count: 50,
            success,
        }
    }

    #[test]
    fn window_evicts_oldest_beyond_capacity() {
        let tracker = LatencyTracker::new(2);
        tracker.record(rec("acme", "fast", 100.0, 30.0, true));
        tracker.record(rec("acme", "fast", 200.0, 30.0, true));
        tracker.record(rec("acme", "fast", 300.0, 30.0, true));
        let stats = tracker.stats("acme", "fast");
        assert_eq!(stats.sample_count, 2);
    }

    #[test]
    fn stats_for_unknown_backend_has_zero_confidence() {
        let tracker = LatencyTracker::default();
        let stats = tracker.stats("nobody", "nothing");
        assert_eq!(stats.confidence, 0.0);
        assert_eq!(stats.sample_count, 0);
    }

    #[test]
    fn racing_candidates_exclude_unregistered_and_excluded_providers() {
        let tracker = LatencyTracker::default();
        tracker.register("acme", "fast", Decimal::new(1, 6));
        tracker.register("beta", "slow", Decimal::new(1, 6));
        let candidates = tracker.racing_candidates(&RacingQuery { exclude_providers: vec!["beta".into()], ..Default::default() });
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].provider, "acme");
    }

    #[test]
    fn faster_provider_scores_higher() {
        let tracker = LatencyTracker::default();
        tracker.register("fast-co", "m1", Decimal::ZERO);
        tracker.register("slow-co", "m1", Decimal::ZERO);
        for _ in 0..10 {
            tracker.record(rec("fast-co", "m1", 100.0, 50.0, true));
            tracker.record(rec("slow-co", "m1", 900.0, 10.0, true));
        }
        let candidates = tracker.racing_candidates(&RacingQuery::default());
        assert_eq!(candidates[0].provider, "fast-co");
    }

    #[test]
    fn cost_penalty_applies_unless_prefer_speed() {
        let tracker = LatencyTracker::default();
        tracker.register("cheap", "m1", Decimal::ZERO);
        tracker.register("pricey", "m1", Decimal::new(1, 2));
        for _ in 0..10 {
            tracker.record(rec("cheap", "m1", 500.0, 20.0, true));
            tracker.record(rec("pricey", "m1", 500.0, 20.0, true));
        }
        let penalised = tracker.racing_candidates(&RacingQuery::default());
        assert_eq!(penalised[0].provider, "cheap");
        assert!(penalised[0].score > penalised[1].score);

        let speed_first = tracker.racing_candidates(&RacingQuery { prefer_speed: true, ..Default::default() });
        assert!((speed_first[0].score - speed_first[1].score).abs() < 1e-9);
    }

    #[test]
    fn max_truncates_result_set() {
        let tracker = LatencyTracker::default();
        tracker.register("a", "m", Decimal::ZERO);
        tracker.register("b", "m", Decimal::ZERO);
        tracker.register("c", "m", Decimal::ZERO);
        let candidates = tracker.racing_candidates(&RacingQuery { max: Some(2), ..Default::default() });
        assert_eq!(candidates.len(), 2);
    }
}

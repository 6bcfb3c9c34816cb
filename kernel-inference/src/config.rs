//! Configuration surface for the engine and its autonomous loop.

use std::time::Duration;

/// Tuning knobs for expected-free-energy weighting and policy sharpness.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Weight on the pragmatic (goal-divergence) term of EFE.
    pub pragmatic_weight: f64,
    /// Weight on the epistemic (information-gain) term of EFE.
    pub epistemic_weight: f64,
    /// Weight `λ` on the value-function bonus in a value-augmented engine.
    pub value_weight: f64,
    /// Softmax temperature; lower sharpens the policy toward the lowest-EFE action.
    pub softmax_temperature: f64,
    /// PRNG seed used for action sampling, so a fixed observation stream
    /// replays to an identical action sequence.
    pub rng_seed: u64,
    /// `task` observation value at or above which the goal is considered achieved.
    pub goal_achieved_task_threshold: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pragmatic_weight: 1.0,
            epistemic_weight: 1.0,
            value_weight: 1.0,
            softmax_temperature: 1.0,
            rng_seed: 0,
            goal_achieved_task_threshold: 3,
        }
    }
}

impl EngineConfig {
    /// Set the pragmatic weight.
    pub fn with_pragmatic_weight(mut self, w: f64) -> Self {
        self.pragmatic_weight = w;
        self
    }

    /// Set the epistemic weight.
    pub fn with_epistemic_weight(mut self, w: f64) -> Self {
        self.epistemic_weight = w;
        self
    }

    /// Set the value-function weight.
    pub fn with_value_weight(mut self, w: f64) -> Self {
        self.value_weight = w;
        self
    }

    /// Set the softmax temperature.
    pub fn with_softmax_temperature(mut self, tau: f64) -> Self {
        self.softmax_temperature = tau;
        self
    }

    /// Set the PRNG seed.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = seed;
        self
    }
}

/// Configuration for [`crate::autonomous_loop::AutonomousLoop`].
#[derive(Debug, Clone, Copy)]
pub struct LoopConfig {
    /// Sleep between cycles. Zero yields cooperative scheduling only.
    pub cycle_interval: Duration,
    /// Hard cap on the number of cycles a single `run()` will execute.
    pub max_cycles: Option<u64>,
    /// Stop the loop once the engine reports `goal_achieved`.
    pub stop_on_goal_achieved: bool,
    /// Stop the loop once the engine reports `energy_critical`.
    pub stop_on_energy_critical: bool,
    /// Stop the loop once running mean surprise exceeds `high_surprise_threshold`.
    pub stop_on_high_surprise: bool,
    /// Running-mean-surprise threshold above which the loop stops, when
    /// `stop_on_high_surprise` is set.
    pub high_surprise_threshold: f64,
    /// Emit per-cycle tracing events at debug level.
    pub verbose: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            cycle_interval: Duration::from_millis(0),
            max_cycles: None,
            stop_on_goal_achieved: true,
            stop_on_energy_critical: false,
            stop_on_high_surprise: true,
            high_surprise_threshold: 5.0,
            verbose: false,
        }
    }
}

impl LoopConfig {
    /// Set the cycle interval.
    pub fn with_cycle_interval(mut self, d: Duration) -> Self {
        self.cycle_interval = d;
        self
    }

    /// Set the max-cycles cap.
    pub fn with_max_cycles(mut self, n: u64) -> Self {
        self.max_cycles = Some(n);
        self
    }
}

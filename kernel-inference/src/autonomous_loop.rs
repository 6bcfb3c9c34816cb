//! The autonomous loop: observe, step the engine, act, repeat.

use crate::config::LoopConfig;
use crate::engine::{ActiveInferenceEngine, StepOutcome};
use crate::error::EngineError;
use async_trait::async_trait;
use kernel_bus::EventBus;
use kernel_types::action::Action;
use kernel_types::event::{KernelPayload, Payload};
use kernel_types::observation::Observation;
use kernel_types::Beliefs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Reads the current observation. Implementations should be fast and
/// side-effect-free; long-running sensing belongs in a background task that
/// feeds a cache this reads from.
#[async_trait]
pub trait ObservationGatherer: Send + Sync {
    /// Produce the next observation.
    async fn gather(&self) -> Result<Observation, EngineError>;
}

/// Carries out a sampled action.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Execute `action`, given the beliefs that produced it.
    async fn execute(&self, action: Action, beliefs: &Beliefs) -> Result<ActionResult, EngineError>;
}

/// Outcome of one [`ActionExecutor::execute`] call.
#[derive(Debug, Clone)]
pub struct ActionResult {
    /// Whether the action succeeded.
    pub success: bool,
    /// The action that was executed.
    pub action: Action,
    /// Optional free-form result data.
    pub data: Option<serde_json::Value>,
    /// Error description, if `success` is false.
    pub error: Option<String>,
}

/// Why an [`AutonomousLoop::run`] call stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    /// The configured `max_cycles` was reached.
    MaxCyclesReached,
    /// The engine reported `goal_achieved`.
    GoalAchieved,
    /// The engine reported `energy_critical`.
    EnergyCritical,
    /// Running mean surprise exceeded the configured threshold.
    HighSurprise,
    /// `stop()` was called explicitly, carrying the given reason.
    Explicit(String),
    /// An error occurred and the loop stopped.
    Error(String),
}

type CycleHandler = Box<dyn Fn(u64, &StepOutcome, &Beliefs) + Send + Sync>;
type StopHandler = Box<dyn Fn(&StopReason) + Send + Sync>;

/// Drives an [`ActiveInferenceEngine`] through repeated observe/step/act cycles.
pub struct AutonomousLoop<G: ObservationGatherer, E: ActionExecutor> {
    engine: ActiveInferenceEngine,
    gatherer: G,
    executor: E,
    config: LoopConfig,
    running: Arc<AtomicBool>,
    stop_requested: Arc<std::sync::Mutex<Option<String>>>,
    on_cycle: Vec<CycleHandler>,
    on_stop: Vec<StopHandler>,
    bus: Option<Arc<EventBus>>,
}

impl<G: ObservationGatherer, E: ActionExecutor> AutonomousLoop<G, E> {
    /// Build a new loop over the given engine, gatherer, and executor.
    pub fn new(engine: ActiveInferenceEngine, gatherer: G, executor: E, config: LoopConfig) -> Self {
        Self {
            engine,
            gatherer,
            executor,
            config,
            running: Arc::new(AtomicBool::new(false)),
            stop_requested: Arc::new(std::sync::Mutex::new(None)),
            on_cycle: Vec::new(),
            on_stop: Vec::new(),
            bus: None,
        }
    }

    /// Attach a bus; subsequent runs publish `kernel.*` events to it.
    pub fn with_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Register a callback invoked after every cycle.
    pub fn on_cycle(&mut self, handler: impl Fn(u64, &StepOutcome, &Beliefs) + Send + Sync + 'static) {
        self.on_cycle.push(Box::new(handler));
    }

    /// Register a callback invoked once when the loop stops.
    pub fn on_stop(&mut self, handler: impl Fn(&StopReason) + Send + Sync + 'static) {
        self.on_stop.push(Box::new(handler));
    }

    /// Request the loop stop at the next cycle boundary, with `reason`
    /// recorded in [`StopReason::Explicit`].
    pub fn stop(&self, reason: impl Into<String>) {
        *self.stop_requested.lock().expect("stop_requested mutex poisoned") = Some(reason.into());
    }

    /// Run cycles until a stop predicate fires or `max_cycles` (if set, this
    /// overrides [`LoopConfig::max_cycles`]) is reached.
    pub async fn run(&mut self, max_cycles: Option<u64>) -> Result<StopReason, EngineError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(EngineError::AlreadyRunning);
        }
        struct RunningGuard(Arc<AtomicBool>);
        impl Drop for RunningGuard {
            fn drop(&mut self) {
                self.0.store(false, Ordering::SeqCst);
            }
        }
        let _guard = RunningGuard(self.running.clone());

        let cap = max_cycles.or(self.config.max_cycles);
        let mut cycle: u64 = 0;
        let reason = loop {
            if let Some(cap) = cap {
                if cycle >= cap {
                    break StopReason::MaxCyclesReached;
                }
            }
            if let Some(reason) = self.stop_requested.lock().expect("stop_requested mutex poisoned").take() {
                break StopReason::Explicit(reason);
            }

            let observation = match self.gatherer.gather().await {
                Ok(o) => o,
                Err(e) => break StopReason::Error(e.to_string()),
            };

            let outcome = match self.engine.step(&observation) {
                Ok(o) => o,
                Err(e) => break StopReason::Error(e.to_string()),
            };

            let exec_result = match self.executor.execute(outcome.action, self.engine.beliefs()).await {
                Ok(r) => r,
                Err(e) => break StopReason::Error(e.to_string()),
            };
            if !exec_result.success {
                if let Some(err) = &exec_result.error {
                    tracing::warn!(action = %outcome.action, error = %err, "action executor reported failure");
                }
            }

            if self.config.verbose {
                tracing::debug!(cycle, action = %outcome.action, surprise = outcome.surprise, "cycle complete");
            }
            if let Some(bus) = &self.bus {
                bus.publish("kernel.cycle", "kernel-inference::autonomous_loop", Payload::Kernel(KernelPayload::Cycle { cycle }));
            }
            for handler in &self.on_cycle {
                handler(cycle, &outcome, self.engine.beliefs());
            }

            cycle += 1;

            if self.config.stop_on_goal_achieved && outcome.goal_achieved {
                break StopReason::GoalAchieved;
            }
            if self.config.stop_on_energy_critical && outcome.energy_critical {
                break StopReason::EnergyCritical;
            }
            if self.config.stop_on_high_surprise && self.engine.stats().mean_surprise > self.config.high_surprise_threshold
            {
                break StopReason::HighSurprise;
            }

            if !self.config.cycle_interval.is_zero() {
                tokio::time::sleep(self.config.cycle_interval).await;
            } else {
                tokio::task::yield_now().await;
            }
        };

        for handler in &self.on_stop {
            handler(&reason);
        }
        Ok(reason)
    }
}

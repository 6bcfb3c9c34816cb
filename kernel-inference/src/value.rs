//! Optional value-function augmentation and φ (phi) gating.

use crate::config::EngineConfig;
use crate::engine::{ActiveInferenceEngine, PredictedState, StepOutcome};
use crate::error::EngineError;
use kernel_types::action::Action;
use kernel_types::observation::Observation;

/// A learned (or hand-written) estimate of how good a predicted state is.
///
/// An `ActiveInferenceEngine` wrapped in a [`ValueAugmentedEngine`] adds
/// `value_weight * evaluate(action, predicted).value` to `-EFE(action)`
/// before computing the policy, i.e. `π(a|s) ∝ exp(-EFE(a) + λ·V(s′))`.
pub trait ValueFunction: Send + Sync {
    /// Score a predicted post-action state.
    fn evaluate(&self, action: Action, predicted: &PredictedState) -> ValueEstimate;
}

/// A value estimate, with its components broken out for diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct ValueEstimate {
    /// Scalar value estimate.
    pub value: f64,
    /// Contribution from the predicted viability belief.
    pub viability_component: f64,
    /// Contribution from the predicted goal-progress belief.
    pub goal_component: f64,
}

/// A narrow read of an external integrated-information (φ) scalar.
///
/// No concrete implementation ships in this crate; a consciousness
/// collaborator supplies one, and an engine may fold it into gating
/// decisions without depending on that collaborator's implementation.
pub trait PhiProvider: Send + Sync {
    /// Current φ reading.
    fn phi(&self) -> f64;
}

/// An [`ActiveInferenceEngine`] augmented with a [`ValueFunction`].
pub struct ValueAugmentedEngine<V: ValueFunction> {
    engine: ActiveInferenceEngine,
    value_fn: V,
}

impl<V: ValueFunction> ValueAugmentedEngine<V> {
    /// Wrap an engine with a value function.
    pub fn new(config: EngineConfig, value_fn: V) -> Self {
        Self { engine: ActiveInferenceEngine::new(config), value_fn }
    }

    /// Current belief snapshot, delegating to the inner engine.
    pub fn beliefs(&self) -> &kernel_types::Beliefs {
        self.engine.beliefs()
    }

    /// Running statistics, delegating to the inner engine.
    pub fn stats(&self) -> crate::engine::EngineStats {
        self.engine.stats()
    }

    /// One step, with the policy shaped by the wrapped value function.
    pub fn step(&mut self, observation: &Observation) -> Result<StepOutcome, EngineError> {
        let value_fn = &self.value_fn;
        self.engine.step_with_value(observation, |action, predicted| value_fn.evaluate(action, predicted).value)
    }
}

/// A simple value function scoring predicted states by how close their
/// viability and goal-progress beliefs are to the top hidden state.
///
/// Useful as a default / test double; real deployments supply a learned
/// value function trained from bus-observed rewards.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearValueFunction {
    /// Weight on the viability component.
    pub viability_weight: f64,
    /// Weight on the goal-progress component.
    pub goal_weight: f64,
}

impl LinearValueFunction {
    /// A value function weighting viability and goal progress equally.
    pub fn balanced() -> Self {
        Self { viability_weight: 1.0, goal_weight: 1.0 }
    }
}

impl ValueFunction for LinearValueFunction {
    fn evaluate(&self, _action: Action, predicted: &PredictedState) -> ValueEstimate {
        let top = (crate::engine::ARITY - 1) as f64;
        let viability_component = self.viability_weight * (predicted.viability.argmax() as f64 / top);
        let goal_component = self.goal_weight * (predicted.goal_progress.argmax() as f64 / top);
        ValueEstimate { value: viability_component + goal_component, viability_component, goal_component }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_augmented_engine_runs_and_tracks_stats() {
        let mut engine = ValueAugmentedEngine::new(EngineConfig::default(), LinearValueFunction::balanced());
        for (e, p, t, c, k) in [(0, 1, 1, 1, 1), (1, 1, 1, 1, 1), (2, 2, 1, 1, 1), (3, 2, 1, 2, 1), (4, 3, 1, 2, 3)] {
            let obs = Observation::try_new(e, p, t, c, k).unwrap();
            engine.step(&obs).unwrap();
        }
        assert_eq!(engine.stats().cycles, 5);
    }

    #[test]
    fn cumulative_value_is_non_decreasing_along_improving_sequence() {
        let value_fn = LinearValueFunction::balanced();
        let mut engine = ActiveInferenceEngine::new(EngineConfig::default());
        let mut cumulative = Vec::new();
        let mut running_total = 0.0;
        for (i, (e, p, t, c, k)) in
            [(0, 1, 1, 1, 1), (1, 1, 1, 1, 1), (2, 2, 1, 1, 1), (3, 2, 1, 2, 1), (4, 3, 1, 2, 3)].into_iter().enumerate()
        {
            let obs = Observation::try_new(e, p, t, c, k).unwrap();
            let components = engine.efe_components(&obs);
            let (_, predicted) =
                components.iter().find(|(c, _)| c.action == Action::Exploit).expect("Exploit is always present");
            let estimate = value_fn.evaluate(Action::Exploit, predicted);
            running_total += estimate.value;
            cumulative.push(running_total / (i as f64 + 1.0));
            engine.step(&obs).unwrap();
        }
        assert!(
            cumulative.last().unwrap() >= &(cumulative[1] - 1e-9),
            "cumulative mean value should not regress over an improving observation sequence: {cumulative:?}"
        );
    }

    #[test]
    fn final_step_of_improving_sequence_reaches_goal_achieved() {
        let mut engine = ActiveInferenceEngine::new(EngineConfig::default());
        let mut last = None;
        for (e, p, t, c, k) in [(0, 1, 1, 1, 1), (1, 1, 1, 1, 1), (2, 2, 1, 1, 1), (3, 2, 1, 2, 1), (4, 3, 1, 2, 3)] {
            let obs = Observation::try_new(e, p, t, c, k).unwrap();
            last = Some(engine.step(&obs).unwrap());
        }
        assert!(last.unwrap().goal_achieved);
    }
}

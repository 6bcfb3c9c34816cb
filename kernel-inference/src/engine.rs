//! The Active Inference engine: belief update, EFE-based policy inference,
//! and action sampling.

use crate::config::EngineConfig;
use crate::error::EngineError;
use kernel_bus::EventBus;
use kernel_types::action::Action;
use kernel_types::beliefs::{Distribution, NORMALISATION_EPSILON};
use kernel_types::event::{AiPayload, Payload};
use kernel_types::observation::Observation;
use kernel_types::{Beliefs, Policy};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

/// Surprise above this magnitude additionally publishes an `ai.surprise`
/// event; smaller, routine updates only publish `ai.beliefs.updated`.
const NOTABLE_SURPRISE: f64 = 1.0;

/// Number of states each hidden factor's belief is defined over.
pub const ARITY: usize = 4;

/// Log-preference vector over hidden-state indices, increasing and concave:
/// the marginal value of moving from state 2 to 3 is much smaller than from
/// 0 to 1, so an already-good state has little to gain from acting further.
const PREFERENCE: [f64; ARITY] = [0.0, 1.0, 1.6, 1.9];

const SIGMA_BASE: f64 = 1.5;
const SIGMA_COHERENCE_SCALE: f64 = 0.2;
const SIGMA_MIN: f64 = 0.3;
const EPISTEMIC_SCALE: f64 = 0.2;

fn sigma_for(coherence: u8) -> f64 {
    (SIGMA_BASE - SIGMA_COHERENCE_SCALE * coherence as f64).max(SIGMA_MIN)
}

/// Perceptual likelihood of each hidden state given a scalar observation in
/// `0..=MAX_LEVEL`, as a Gaussian kernel centred on the observation rescaled
/// into `0..ARITY`.
fn likelihood(observation: u8, sigma: f64) -> Distribution {
    let peak = (observation as f64 * (ARITY - 1) as f64 / kernel_types::observation::MAX_LEVEL as f64).round();
    let unnormalised: Vec<f64> =
        (0..ARITY).map(|i| (-((i as f64 - peak).powi(2)) / (2.0 * sigma * sigma)).exp()).collect();
    let sum: f64 = unnormalised.iter().sum();
    Distribution::new(unnormalised.into_iter().map(|v| v / sum).collect())
        .expect("normalised gaussian kernel sums to 1")
}

fn bayes_update(prior: &Distribution, lik: &Distribution) -> Distribution {
    let unnormalised: Vec<f64> = prior.probs().iter().zip(lik.probs()).map(|(p, l)| p * l).collect();
    let sum: f64 = unnormalised.iter().sum();
    let sum = if sum <= 0.0 { 1.0 } else { sum };
    Distribution::new(unnormalised.into_iter().map(|v| v / sum).collect())
        .unwrap_or_else(|_| Distribution::uniform(ARITY))
}

/// Shift probability mass toward higher (positive `shift`) or lower
/// (negative `shift`) indices, clamping at the domain boundary. Models the
/// predicted effect of an action on a hidden factor without a full
/// transition matrix per action.
fn shift_belief(belief: &Distribution, shift: i32) -> Distribution {
    let mut out = vec![0.0; ARITY];
    for (i, p) in belief.probs().iter().enumerate() {
        let j = (i as i32 + shift).clamp(0, ARITY as i32 - 1) as usize;
        out[j] += p;
    }
    Distribution::new(out).expect("shifting preserves total probability mass")
}

fn dot(d: &Distribution, preference: &[f64; ARITY]) -> f64 {
    d.probs().iter().zip(preference).map(|(p, c)| p * c).sum()
}

fn entropy(d: &Distribution) -> f64 {
    d.probs().iter().filter(|p| **p > 0.0).map(|p| -p * p.ln()).sum()
}

/// Predicted shift in viability belief for each action, and in goal-progress
/// belief, plus a flat effort cost. `Rest` is free; every other action
/// incurs effort, which is what lets `Rest` win once acting further would
/// buy only a small preference gain (the Wu Wei optimum).
fn action_effects(action: Action) -> (i32, i32, f64) {
    match action {
        Action::Recover => (2, 0, 0.4),
        Action::Rest => (0, 0, 0.0),
        Action::Explore => (-1, 0, 0.45),
        Action::Exploit => (0, 2, 0.6),
        Action::Communicate => (0, 1, 0.55),
        Action::Delegate => (0, 1, 0.5),
    }
}

/// Breakdown of one action's expected free energy, exposed for diagnostics
/// and for `ValueFunction` implementations that want the raw components.
#[derive(Debug, Clone, Copy)]
pub struct EfeComponents {
    /// Action this breakdown is for.
    pub action: Action,
    /// Pragmatic (goal-divergence) cost, before weighting.
    pub pragmatic: f64,
    /// Epistemic (information-gain) value, before weighting.
    pub epistemic: f64,
    /// Effort cost, folded into the pragmatic term.
    pub effort: f64,
    /// Final expected free energy (lower is better).
    pub efe: f64,
}

/// Predicted post-action beliefs, used by a `ValueFunction` to score `s'`.
#[derive(Debug, Clone)]
pub struct PredictedState {
    /// Predicted viability belief after the action.
    pub viability: Distribution,
    /// Predicted goal-progress belief after the action.
    pub goal_progress: Distribution,
}

/// The Active Inference engine.
///
/// Maintains beliefs over four hidden factors (viability, world state,
/// coupling, goal progress), and on each [`ActiveInferenceEngine::step`]
/// performs a Bayesian belief update followed by expected-free-energy
/// policy inference and action sampling.
pub struct ActiveInferenceEngine {
    config: EngineConfig,
    beliefs: Beliefs,
    rng: StdRng,
    cycles: u64,
    action_histogram: [u64; 6],
    surprise_sum: f64,
    bus: Option<Arc<EventBus>>,
}

impl ActiveInferenceEngine {
    /// Build a new engine with a maximum-entropy prior. No events are
    /// published until [`ActiveInferenceEngine::with_bus`] attaches a bus.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            rng: StdRng::seed_from_u64(config.rng_seed),
            config,
            beliefs: Beliefs::uniform_prior(ARITY),
            cycles: 0,
            action_histogram: [0; 6],
            surprise_sum: 0.0,
            bus: None,
        }
    }

    /// Attach a bus; subsequent steps publish `ai.*` events to it.
    pub fn with_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Current belief snapshot.
    pub fn beliefs(&self) -> &Beliefs {
        &self.beliefs
    }

    /// The hidden-state index with the highest posterior mass per factor.
    pub fn most_likely_state(&self) -> [usize; 4] {
        [
            self.beliefs.viability.argmax(),
            self.beliefs.world_state.argmax(),
            self.beliefs.coupling.argmax(),
            self.beliefs.goal_progress.argmax(),
        ]
    }

    /// Running statistics: per-action selection counts and mean surprise.
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            cycles: self.cycles,
            action_histogram: self.action_histogram,
            mean_surprise: if self.cycles == 0 { 0.0 } else { self.surprise_sum / self.cycles as f64 },
        }
    }

    /// Per-action EFE breakdown for the current beliefs, without sampling.
    /// Exposed so `ValueAugmentedEngine` can fold in a value bonus before
    /// computing the final policy.
    pub fn efe_components(&self, observation: &Observation) -> Vec<(EfeComponents, PredictedState)> {
        let sigma = sigma_for(observation.coherence);
        let viability_lik = likelihood(observation.energy, sigma);
        let goal_lik = likelihood(observation.task, sigma);
        let world_lik = likelihood(observation.tool, sigma);

        let viability_post = bayes_update(&self.beliefs.viability, &viability_lik);
        let goal_post = bayes_update(&self.beliefs.goal_progress, &goal_lik);
        let world_post = bayes_update(&self.beliefs.world_state, &world_lik);
        let world_entropy = entropy(&world_post);

        Action::ALL
            .into_iter()
            .map(|action| {
                let (dv, dg, effort) = action_effects(action);
                let predicted_viability = shift_belief(&viability_post, dv);
                let predicted_goal = shift_belief(&goal_post, dg);
                let pragmatic = -(dot(&predicted_viability, &PREFERENCE) + dot(&predicted_goal, &PREFERENCE));
                let epistemic = if action == Action::Explore { EPISTEMIC_SCALE * world_entropy } else { 0.0 };
                let efe = self.config.pragmatic_weight * (pragmatic + effort) - self.config.epistemic_weight * epistemic;
                (
                    EfeComponents { action, pragmatic, epistemic, effort, efe },
                    PredictedState { viability: predicted_viability, goal_progress: predicted_goal },
                )
            })
            .collect()
    }

    /// One synchronous engine step.
    ///
    /// Updates beliefs, computes the policy from (possibly value-augmented)
    /// EFE, samples an action, and returns it along with the events the
    /// caller should publish.
    pub fn step(&mut self, observation: &Observation) -> Result<StepOutcome, EngineError> {
        self.step_with_value(observation, |_, _| 0.0)
    }

    /// Like [`ActiveInferenceEngine::step`], but folds `value_fn(action,
    /// &predicted_state) * value_weight` into each action's EFE before
    /// computing the policy. Used by [`crate::value::ValueAugmentedEngine`].
    pub fn step_with_value(
        &mut self,
        observation: &Observation,
        value_fn: impl Fn(Action, &PredictedState) -> f64,
    ) -> Result<StepOutcome, EngineError> {
        let sigma = sigma_for(observation.coherence);
        let coupling_lik = likelihood(observation.phi, sigma);
        let coupling_post = bayes_update(&self.beliefs.coupling, &coupling_lik);

        let components = self.efe_components(observation);
        let prior = self.beliefs.clone();

        let mut scores = [0.0; 6];
        for (c, predicted) in &components {
            let bonus = value_fn(c.action, predicted) * self.config.value_weight;
            scores[c.action.rank()] = -(c.efe - bonus);
        }
        let policy = Policy::softmax(scores, self.config.softmax_temperature);

        let viability_lik = likelihood(observation.energy, sigma);
        let world_lik = likelihood(observation.tool, sigma);
        let goal_lik = likelihood(observation.task, sigma);
        let posterior = Beliefs {
            viability: bayes_update(&self.beliefs.viability, &viability_lik),
            world_state: bayes_update(&self.beliefs.world_state, &world_lik),
            coupling: coupling_post,
            goal_progress: bayes_update(&self.beliefs.goal_progress, &goal_lik),
        };
        for d in [&posterior.viability, &posterior.world_state, &posterior.coupling, &posterior.goal_progress] {
            let sum: f64 = d.probs().iter().sum();
            if (sum - 1.0).abs() > NORMALISATION_EPSILON || d.probs().iter().any(|p| p.is_nan()) {
                let message = format!("posterior distribution failed to normalise (sum = {sum})");
                self.publish_invariant_violation(&message);
                return Err(EngineError::InvariantViolation(message));
            }
        }

        let surprise = posterior.surprise(&prior);
        let draw: f64 = self.rng.gen();
        let action = policy.sample(draw);

        self.beliefs = posterior;
        self.cycles += 1;
        self.action_histogram[action.rank()] += 1;
        self.surprise_sum += surprise;

        let outcome = StepOutcome {
            action,
            policy,
            surprise,
            energy_critical: observation.is_energy_critical(),
            goal_achieved: observation.task >= self.config.goal_achieved_task_threshold,
        };
        self.publish_step_events(&outcome);
        Ok(outcome)
    }

    fn publish_step_events(&self, outcome: &StepOutcome) {
        let Some(bus) = &self.bus else { return };
        const SOURCE: &str = "kernel-inference::engine";
        bus.publish("ai.beliefs.updated", SOURCE, Payload::Ai(AiPayload::BeliefsUpdated { surprise: outcome.surprise }));
        bus.publish(
            "ai.policy.inferred",
            SOURCE,
            Payload::Ai(AiPayload::PolicyInferred { top_action: outcome.policy.top_action() }),
        );
        bus.publish("ai.action.selected", SOURCE, Payload::Ai(AiPayload::ActionSelected { action: outcome.action }));
        if outcome.surprise > NOTABLE_SURPRISE {
            bus.publish("ai.surprise", SOURCE, Payload::Ai(AiPayload::Surprise { value: outcome.surprise }));
        }
        if outcome.energy_critical {
            bus.publish(
                "ai.energy_critical",
                SOURCE,
                Payload::Ai(AiPayload::EnergyCritical { energy: 0 }),
            );
        }
        if outcome.goal_achieved {
            bus.publish(
                "ai.goal_achieved",
                SOURCE,
                Payload::Ai(AiPayload::GoalAchieved { progress: self.beliefs.goal_progress.argmax() as u8 }),
            );
        }
    }

    /// Surface a failed normalisation invariant on the bus before the caller
    /// sees the error, per the `consciousness.*` topic family.
    fn publish_invariant_violation(&self, message: &str) {
        let Some(bus) = &self.bus else { return };
        bus.publish(
            "consciousness.invariant.violation",
            "kernel-inference::engine",
            Payload::Json(serde_json::json!({ "message": message })),
        );
    }
}

/// Everything produced by one [`ActiveInferenceEngine::step`] call.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    /// The sampled action.
    pub action: Action,
    /// The policy the action was sampled from.
    pub policy: Policy,
    /// KL divergence between prior and posterior beliefs this step.
    pub surprise: f64,
    /// Whether the observation's energy reading was at its critical floor.
    pub energy_critical: bool,
    /// Whether the observation's task reading met the goal-achieved threshold.
    pub goal_achieved: bool,
}

/// Running statistics exposed by [`ActiveInferenceEngine::stats`].
#[derive(Debug, Clone, Copy)]
pub struct EngineStats {
    /// Number of steps executed so far.
    pub cycles: u64,
    /// Selection count per action, indexed by [`Action::rank`].
    pub action_histogram: [u64; 6],
    /// Mean surprise across all steps.
    pub mean_surprise: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_types::observation::Observation;

    #[test]
    fn critical_energy_selects_recover() {
        let mut engine = ActiveInferenceEngine::new(EngineConfig::default());
        let obs = Observation::try_new(0, 1, 1, 1, 1).unwrap();
        let outcome = engine.step(&obs).unwrap();
        assert_eq!(outcome.policy.top_action(), Action::Recover);
        assert!(outcome.energy_critical);
    }

    #[test]
    fn wu_wei_optimum_selects_rest() {
        let mut engine = ActiveInferenceEngine::new(EngineConfig::default());
        let obs = Observation::try_new(4, 3, 1, 2, 3).unwrap();
        let outcome = engine.step(&obs).unwrap();
        assert_eq!(outcome.policy.top_action(), Action::Rest);
        assert_eq!(engine.most_likely_state()[0], ARITY - 1, "viability mode should be optimal");
    }

    #[test]
    fn beliefs_stay_normalised_across_steps() {
        let mut engine = ActiveInferenceEngine::new(EngineConfig::default());
        for (e, p, t, c, k) in [(0, 1, 1, 1, 1), (2, 2, 1, 1, 1), (4, 3, 1, 2, 3)] {
            let obs = Observation::try_new(e, p, t, c, k).unwrap();
            engine.step(&obs).unwrap();
            for d in [
                &engine.beliefs().viability,
                &engine.beliefs().world_state,
                &engine.beliefs().coupling,
                &engine.beliefs().goal_progress,
            ] {
                let sum: f64 = d.probs().iter().sum();
                assert!((sum - 1.0).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn policy_sums_to_one_and_matches_action_arity() {
        let mut engine = ActiveInferenceEngine::new(EngineConfig::default());
        let obs = Observation::try_new(2, 2, 2, 2, 2).unwrap();
        let outcome = engine.step(&obs).unwrap();
        let sum: f64 = outcome.policy.entries().map(|(_, w)| w).sum();
        assert!((sum - 1.0).abs() < 1e-9);
        assert_eq!(outcome.policy.entries().count(), 6);
    }

    #[test]
    fn replay_with_fixed_seed_is_deterministic() {
        let observations: Vec<Observation> = [(0, 1, 1, 1, 1), (1, 1, 1, 1, 1), (2, 2, 1, 1, 1), (3, 2, 1, 2, 1)]
            .into_iter()
            .map(|(e, p, t, c, k)| Observation::try_new(e, p, t, c, k).unwrap())
            .collect();

        let run = |seed: u64| {
            let mut engine = ActiveInferenceEngine::new(EngineConfig::default().with_rng_seed(seed));
            observations.iter().map(|o| engine.step(o).unwrap().action).collect::<Vec<_>>()
        };

        assert_eq!(run(42), run(42));
    }

    #[test]
    fn attached_bus_receives_step_events() {
        let bus = Arc::new(kernel_bus::EventBus::default());
        let mut engine = ActiveInferenceEngine::new(EngineConfig::default()).with_bus(bus.clone());
        let obs = Observation::try_new(0, 1, 1, 1, 1).unwrap();
        engine.step(&obs).unwrap();
        let history = bus.history(Some("ai."), 10);
        let topics: Vec<&str> = history.iter().map(|e| e.topic.as_str()).collect();
        assert!(topics.contains(&"ai.beliefs.updated"));
        assert!(topics.contains(&"ai.action.selected"));
        assert!(topics.contains(&"ai.energy_critical"));
    }

    #[test]
    fn invariant_violation_publishes_consciousness_event() {
        let bus = Arc::new(kernel_bus::EventBus::default());
        let engine = ActiveInferenceEngine::new(EngineConfig::default()).with_bus(bus.clone());
        engine.publish_invariant_violation("posterior distribution failed to normalise (sum = 0)");
        let history = bus.history(Some("consciousness."), 10);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].topic, "consciousness.invariant.violation");
        assert_eq!(history[0].source, "kernel-inference::engine");
    }

    #[test]
    fn goal_achieved_flag_follows_threshold() {
        let mut engine = ActiveInferenceEngine::new(EngineConfig::default());
        let obs = Observation::try_new(4, 3, 1, 2, 3).unwrap();
        let outcome = engine.step(&obs).unwrap();
        assert!(outcome.goal_achieved);
    }
}

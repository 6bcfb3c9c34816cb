//! Categorical beliefs over the engine's hidden factors.

use serde::{Deserialize, Serialize};

/// Tolerance used when checking that a distribution sums to 1.
pub const NORMALISATION_EPSILON: f64 = 1e-6;

/// The four hidden factors the engine maintains beliefs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HiddenFactor {
    /// Is the system viable (thriving / stable / at-risk / critical)?
    Viability,
    /// What state is the world/environment in?
    WorldState,
    /// How coupled is the system to its environment/collaborators?
    Coupling,
    /// How far along the current goal is.
    GoalProgress,
}

/// A categorical probability distribution over a hidden factor's states.
///
/// Invariant: `probs` is non-empty, every entry is non-negative, and the
/// entries sum to 1 within [`NORMALISATION_EPSILON`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    probs: Vec<f64>,
}

/// Error returned when a distribution fails its normalisation invariant.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum DistributionError {
    /// The distribution was empty.
    #[error("distribution must have at least one entry")]
    Empty,
    /// An entry was negative or NaN.
    #[error("entry {index} = {value} is negative or NaN")]
    InvalidEntry {
        /// Index of the offending entry.
        index: usize,
        /// The offending value.
        value: f64,
    },
    /// Entries did not sum to 1 within tolerance.
    #[error("entries sum to {sum}, expected 1.0 within {epsilon}")]
    NotNormalised {
        /// Observed sum.
        sum: f64,
        /// Tolerance that was exceeded.
        epsilon: f64,
    },
}

impl Distribution {
    /// Validate and wrap a probability vector.
    pub fn new(probs: Vec<f64>) -> Result<Self, DistributionError> {
        if probs.is_empty() {
            return Err(DistributionError::Empty);
        }
        for (index, &value) in probs.iter().enumerate() {
            if !(value >= 0.0) {
                return Err(DistributionError::InvalidEntry { index, value });
            }
        }
        let sum: f64 = probs.iter().sum();
        if (sum - 1.0).abs() > NORMALISATION_EPSILON {
            return Err(DistributionError::NotNormalised { sum, epsilon: NORMALISATION_EPSILON });
        }
        Ok(Self { probs })
    }

    /// Build a uniform distribution over `n` states.
    pub fn uniform(n: usize) -> Self {
        assert!(n > 0, "uniform distribution needs at least one state");
        let p = 1.0 / n as f64;
        Self { probs: vec![p; n] }
    }

    /// Borrow the underlying probabilities.
    pub fn probs(&self) -> &[f64] {
        &self.probs
    }

    /// Index of the highest-probability state, first on ties.
    pub fn argmax(&self) -> usize {
        self.probs
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).expect("no NaN in a valid Distribution"))
            .map(|(i, _)| i)
            .expect("Distribution is never empty")
    }

    /// KL divergence `D_KL(self || prior)`, used as the surprise signal.
    pub fn kl_divergence(&self, prior: &Distribution) -> f64 {
        self.probs
            .iter()
            .zip(prior.probs.iter())
            .map(|(p, q)| if *p <= 0.0 { 0.0 } else { p * (p / q.max(f64::MIN_POSITIVE)).ln() })
            .sum()
    }
}

/// The engine's full belief state: one distribution per hidden factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Beliefs {
    /// Belief over system viability.
    pub viability: Distribution,
    /// Belief over world/environment state.
    pub world_state: Distribution,
    /// Belief over coupling to the environment.
    pub coupling: Distribution,
    /// Belief over goal progress.
    pub goal_progress: Distribution,
}

impl Beliefs {
    /// A maximum-entropy prior: uniform over each factor's `arity` states.
    pub fn uniform_prior(arity: usize) -> Self {
        Self {
            viability: Distribution::uniform(arity),
            world_state: Distribution::uniform(arity),
            coupling: Distribution::uniform(arity),
            goal_progress: Distribution::uniform(arity),
        }
    }

    /// Total surprise: sum of per-factor KL divergence from `prior`.
    pub fn surprise(&self, prior: &Beliefs) -> f64 {
        self.viability.kl_divergence(&prior.viability)
            + self.world_state.kl_divergence(&prior.world_state)
            + self.coupling.kl_divergence(&prior.coupling)
            + self.goal_progress.kl_divergence(&prior.goal_progress)
    }
}

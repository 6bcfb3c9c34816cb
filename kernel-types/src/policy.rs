//! Policy: a probability distribution over the action set.

use crate::action::Action;
use serde::{Deserialize, Serialize};

/// A probability vector over [`Action::ALL`], in canonical order.
///
/// Invariant: entries are non-negative and sum to 1 within
/// [`crate::beliefs::NORMALISATION_EPSILON`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    weights: [f64; 6],
}

impl Policy {
    /// Build a policy from per-action weights, validating normalisation.
    pub fn new(weights: [f64; 6]) -> Result<Self, crate::beliefs::DistributionError> {
        crate::beliefs::Distribution::new(weights.to_vec())?;
        Ok(Self { weights })
    }

    /// Softmax policy over per-action scores, with temperature `tau`.
    ///
    /// Lower-scoring actions (e.g. lower expected free energy when `scores`
    /// holds negated EFE) get higher probability: `p_i ∝ exp(scores_i / tau)`.
    pub fn softmax(scores: [f64; 6], tau: f64) -> Self {
        let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let exp: [f64; 6] = std::array::from_fn(|i| ((scores[i] - max) / tau).exp());
        let sum: f64 = exp.iter().sum();
        let weights = std::array::from_fn(|i| exp[i] / sum);
        Self { weights }
    }

    /// Probability mass assigned to `action`.
    pub fn weight(&self, action: Action) -> f64 {
        self.weights[action.rank()]
    }

    /// The action with the highest probability, ties broken by canonical order.
    pub fn top_action(&self) -> Action {
        let (idx, _) = self
            .weights
            .iter()
            .enumerate()
            .max_by(|(ia, a), (ib, b)| match a.partial_cmp(b).expect("no NaN in a valid Policy") {
                std::cmp::Ordering::Equal => ib.cmp(ia),
                other => other,
            })
            .expect("Policy always has six entries");
        Action::ALL[idx]
    }

    /// Sample an action, given a uniform `[0,1)` draw `u`.
    pub fn sample(&self, u: f64) -> Action {
        let mut cumulative = 0.0;
        for (idx, w) in self.weights.iter().enumerate() {
            cumulative += w;
            if u < cumulative {
                return Action::ALL[idx];
            }
        }
        Action::ALL[5]
    }

    /// All action/weight pairs in canonical order.
    pub fn entries(&self) -> impl Iterator<Item = (Action, f64)> + '_ {
        Action::ALL.into_iter().map(move |a| (a, self.weights[a.rank()]))
    }
}

//! Events published on the kernel bus.

use crate::id::CorrelationId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload carried by one event, keyed by topic family.
///
/// The closed set of topic families the kernel itself publishes or reacts to
/// (`kernel.*`, `ai.*`, `economic.*`) each get a concrete struct. Everything
/// else (`brain.*`, `consciousness.*`, `memory.*`, `neuromod.*`, `content.*`,
/// `lifecycle.*`) is represented as an opaque JSON payload so collaborators
/// can publish on the shared bus without the kernel crate depending on their
/// schemas.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    /// `kernel.cycle`, `kernel.mode`, `kernel.panic`.
    Kernel(KernelPayload),
    /// `ai.beliefs.updated`, `ai.policy.inferred`, `ai.action.selected`,
    /// `ai.surprise`, `ai.energy_critical`, `ai.goal_achieved`.
    Ai(AiPayload),
    /// `economic.cost`, `economic.revenue`, `economic.ness.deviation`.
    Economic(EconomicPayload),
    /// Any other namespace (`brain.*`, `consciousness.*`, `memory.*`,
    /// `neuromod.*`, `content.*`, `lifecycle.*`): opaque, collaborator-owned.
    Json(Value),
}

/// Payloads for the `kernel.*` namespace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "topic", rename_all = "snake_case")]
pub enum KernelPayload {
    /// One autonomous-loop cycle completed.
    Cycle {
        /// Index of the completed cycle, starting at 0.
        cycle: u64,
    },
    /// The runtime switched operating mode.
    Mode {
        /// New mode name.
        mode: String,
    },
    /// Fatal condition; the loop is stopping.
    Panic {
        /// Human-readable reason.
        reason: String,
    },
    /// A predicted observation diverged from the actual one beyond tolerance.
    PredictionError {
        /// Magnitude of the divergence.
        magnitude: f64,
    },
}

/// Payloads for the `ai.*` namespace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "topic", rename_all = "snake_case")]
pub enum AiPayload {
    /// Beliefs were replaced after a step.
    BeliefsUpdated {
        /// KL divergence between prior and posterior beliefs.
        surprise: f64,
    },
    /// A new policy was computed.
    PolicyInferred {
        /// Action with the highest policy mass.
        top_action: crate::action::Action,
    },
    /// An action was sampled from the policy.
    ActionSelected {
        /// The sampled action.
        action: crate::action::Action,
    },
    /// Running mean surprise exceeded the configured threshold.
    Surprise {
        /// The surprise value that triggered this event.
        value: f64,
    },
    /// The energy observation hit its critical floor.
    EnergyCritical {
        /// Observed energy value.
        energy: u8,
    },
    /// The goal-progress observation hit its ceiling.
    GoalAchieved {
        /// Observed goal-progress value.
        progress: u8,
    },
}

/// Payloads for the `economic.*` namespace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "topic", rename_all = "snake_case")]
pub enum EconomicPayload {
    /// A cost was incurred (e.g. a racing loss, an LLM call).
    Cost {
        /// Amount in the configured unit (typically USD).
        amount: rust_decimal::Decimal,
    },
    /// Revenue was recognised.
    Revenue {
        /// Amount in the configured unit (typically USD).
        amount: rust_decimal::Decimal,
    },
    /// A homeostatic (ness) deviation was detected.
    NessDeviation {
        /// Signed deviation from the setpoint.
        deviation: f64,
    },
}

/// One published message on the bus.
///
/// `seq` is strictly increasing and unique within a single bus instance.
/// `timestamp` is non-decreasing. The payload schema is fixed per topic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    /// Monotonically increasing sequence number, assigned by the bus on publish.
    pub seq: u64,
    /// Wall-clock time the event was published.
    pub timestamp: DateTime<Utc>,
    /// Dotted topic string, e.g. `"ai.surprise"`.
    pub topic: String,
    /// Component that published the event, e.g. `"kernel-inference::engine"`.
    pub source: String,
    /// Correlation ID inherited from the publish-time correlation stack, if any.
    pub correlation_id: Option<CorrelationId>,
    /// The event's typed payload.
    pub payload: Payload,
}

impl Event {
    /// Whether this event's topic is exactly `topic` or begins with `prefix`.
    pub fn matches_prefix(&self, prefix: &str) -> bool {
        self.topic.starts_with(prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_matching() {
        let ev = Event {
            seq: 1,
            timestamp: Utc::now(),
            topic: "ai.surprise".into(),
            source: "kernel-inference::engine".into(),
            correlation_id: None,
            payload: Payload::Ai(AiPayload::Surprise { value: 0.5 }),
        };
        assert!(ev.matches_prefix("ai."));
        assert!(ev.matches_prefix("ai.surprise"));
        assert!(!ev.matches_prefix("economic."));
    }

    #[test]
    fn payload_round_trips_json() {
        let payload = Payload::Kernel(KernelPayload::Cycle { cycle: 7 });
        let json = serde_json::to_string(&payload).unwrap();
        let back: Payload = serde_json::from_str(&json).unwrap();
        assert_eq!(payload, back);
    }
}

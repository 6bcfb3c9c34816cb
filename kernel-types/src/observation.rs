//! Sensor readings consumed by the Active Inference engine each cycle.

use serde::{Deserialize, Serialize};

/// Domain size for every observation dimension: readings are clamped-free
/// integers in `0..=MAX_LEVEL`.
pub const MAX_LEVEL: u8 = 4;

/// A fixed-width tuple of small-integer sensor readings.
///
/// Each field lies in `0..=MAX_LEVEL`. Constructing one out of domain is a
/// programmer error and panics in debug builds via `new`'s assertions; use
/// `try_new` at a system boundary where the input isn't already trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    /// Available energy/resources, 0 = critical, MAX_LEVEL = full.
    pub energy: u8,
    /// Integrated-information (phi) reading, as reported by a collaborator.
    pub phi: u8,
    /// Tool availability/readiness.
    pub tool: u8,
    /// Internal coherence (how well beliefs and goals line up).
    pub coherence: u8,
    /// Progress toward the current goal, 0 = none, MAX_LEVEL = achieved.
    pub task: u8,
}

/// Error returned when an `Observation` field is outside its declared domain.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("observation field {field} = {value} is outside domain 0..={max}")]
pub struct OutOfDomain {
    /// Name of the offending field.
    pub field: &'static str,
    /// The out-of-range value.
    pub value: u8,
    /// The declared maximum.
    pub max: u8,
}

impl Observation {
    /// Build an observation, validating every field against its domain.
    pub fn try_new(
        energy: u8,
        phi: u8,
        tool: u8,
        coherence: u8,
        task: u8,
    ) -> Result<Self, OutOfDomain> {
        for (field, value) in [
            ("energy", energy),
            ("phi", phi),
            ("tool", tool),
            ("coherence", coherence),
            ("task", task),
        ] {
            if value > MAX_LEVEL {
                return Err(OutOfDomain { field, value, max: MAX_LEVEL });
            }
        }
        Ok(Self { energy, phi, tool, coherence, task })
    }

    /// Whether energy is at its critical floor.
    pub fn is_energy_critical(&self) -> bool {
        self.energy == 0
    }

    /// Whether task progress has reached its ceiling.
    pub fn is_goal_achieved(&self) -> bool {
        self.task >= MAX_LEVEL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_domain() {
        let err = Observation::try_new(5, 0, 0, 0, 0).unwrap_err();
        assert_eq!(err.field, "energy");
        assert_eq!(err.value, 5);
    }

    #[test]
    fn accepts_boundary_values() {
        assert!(Observation::try_new(0, 0, 0, 0, 0).is_ok());
        assert!(Observation::try_new(4, 4, 4, 4, 4).is_ok());
    }

    #[test]
    fn critical_and_goal_flags() {
        let o = Observation::try_new(0, 1, 1, 1, 1).unwrap();
        assert!(o.is_energy_critical());
        assert!(!o.is_goal_achieved());

        let o = Observation::try_new(4, 3, 1, 2, 4).unwrap();
        assert!(!o.is_energy_critical());
        assert!(o.is_goal_achieved());
    }
}

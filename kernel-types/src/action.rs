//! The canonical, versioned action set sampled by the Active Inference engine.

use serde::{Deserialize, Serialize};

/// One of the six actions the cognitive kernel can select per cycle.
///
/// Declaration order is also the expected-free-energy tie-break order: when
/// two actions score equally, the one declared first wins. `Recover` and
/// `Rest` are listed first so an exact tie defaults to the safer action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Recharge or recover; selected when energy is critical.
    Recover,
    /// The Wu Wei optimum: remain in place and conserve resources.
    Rest,
    /// Seek new information (an epistemic action).
    Explore,
    /// Act on the current best policy toward the goal.
    Exploit,
    /// Emit a response, i.e. use the language model.
    Communicate,
    /// Hand off to a tool or collaborator subsystem.
    Delegate,
}

impl Action {
    /// All actions in their canonical, tie-break order.
    pub const ALL: [Action; 6] = [
        Action::Recover,
        Action::Rest,
        Action::Explore,
        Action::Exploit,
        Action::Communicate,
        Action::Delegate,
    ];

    /// Position in the canonical ordering; lower sorts first on EFE ties.
    pub fn rank(self) -> usize {
        Self::ALL.iter().position(|a| *a == self).expect("Action::ALL is exhaustive")
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Action::Recover => "recover",
            Action::Rest => "rest",
            Action::Explore => "explore",
            Action::Exploit => "exploit",
            Action::Communicate => "communicate",
            Action::Delegate => "delegate",
        };
        f.write_str(s)
    }
}

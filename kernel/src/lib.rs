#![deny(missing_docs)]
//! # kernel — umbrella crate
//!
//! Single import surface for the cognitive kernel. Re-exports the
//! typed event bus, Active Inference engine, model racer, and stream
//! orchestrator behind feature flags, plus a `prelude` for the happy path.

#[cfg(feature = "types")]
pub use kernel_types;

#[cfg(feature = "bus")]
pub use kernel_bus;

#[cfg(feature = "inference")]
pub use kernel_inference;

#[cfg(feature = "racer")]
pub use kernel_racer;

#[cfg(feature = "orchestrator")]
pub use kernel_orchestrator;

/// Happy-path imports for composing kernel systems.
pub mod prelude {
    #[cfg(feature = "types")]
    pub use kernel_types::{Action, Beliefs, Event, Observation, Policy, StreamEvent, StreamState};

    #[cfg(feature = "bus")]
    pub use kernel_bus::{BusError, EventBus};

    #[cfg(feature = "inference")]
    pub use kernel_inference::{ActiveInferenceEngine, AutonomousLoop, EngineConfig, EngineError, LoopConfig};

    #[cfg(feature = "racer")]
    pub use kernel_racer::{LatencyTracker, ModelRacer, RaceStrategy, RacerError, RacingConfig};

    #[cfg(feature = "orchestrator")]
    pub use kernel_orchestrator::{OrchestratorConfig, OrchestratorError, StreamOrchestrator};
}

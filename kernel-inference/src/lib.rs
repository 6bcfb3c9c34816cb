#![deny(missing_docs)]
//! Active Inference engine and autonomous loop for the cognitive kernel.
//!
//! [`ActiveInferenceEngine`] maintains categorical beliefs over a small set
//! of hidden factors and, given an observation, performs a Bayesian belief
//! update followed by expected-free-energy policy inference and action
//! sampling. [`AutonomousLoop`] drives the engine through repeated
//! observe/step/act cycles until a stop predicate fires.

pub mod autonomous_loop;
pub mod config;
pub mod engine;
pub mod error;
pub mod value;

pub use autonomous_loop::{ActionExecutor, ActionResult, AutonomousLoop, ObservationGatherer, StopReason};
pub use config::{EngineConfig, LoopConfig};
pub use engine::{ActiveInferenceEngine, EfeComponents, EngineStats, PredictedState, StepOutcome};
pub use error::EngineError;
pub use value::{LinearValueFunction, PhiProvider, ValueAugmentedEngine, ValueEstimate, ValueFunction};

#![deny(missing_docs)]
//! Shared data model for the cognitive kernel.
//!
//! This crate has no behaviour of its own: it defines the event, belief,
//! policy, latency, and stream types that `kernel-bus`, `kernel-inference`,
//! `kernel-racer`, and `kernel-orchestrator` all exchange, so that none of
//! them need to depend on each other's internals.

pub mod action;
pub mod beliefs;
pub mod error;
pub mod event;
pub mod id;
pub mod latency;
pub mod observation;
pub mod policy;
pub mod stream;

pub use action::Action;
pub use beliefs::{Beliefs, Distribution, HiddenFactor};
pub use event::{AiPayload, EconomicPayload, Event, KernelPayload, Payload};
pub use id::{CorrelationId, StreamRunId, SubscriptionId, ToolCallId};
pub use latency::{LatencyRecord, ProviderStats, RacingCandidate};
pub use observation::Observation;
pub use policy::Policy;
pub use stream::{StreamEvent, StreamState};

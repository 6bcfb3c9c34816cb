#![deny(missing_docs)]
//! Latency-learning model racer across streaming LLM backends.
//!
//! [`LatencyTracker`] keeps a rolling window of per-`(provider, model)`
//! outcomes and scores candidates for racing. [`ModelRacer`] launches
//! several [`ProviderAdapter`]s concurrently under one of four strategies
//! and streams the winner's events, cancelling the rest.

pub mod adapter;
pub mod error;
pub mod latency;
pub mod racer;

pub use adapter::{EventStream, ProviderAdapter, StreamOptions};
pub use error::RacerError;
pub use latency::{LatencyTracker, RacingQuery};
pub use racer::{ModelRacer, RaceOutcome, RaceStrategy, RacingConfig};

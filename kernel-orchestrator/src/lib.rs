#![deny(missing_docs)]
//! Single-stream state machine driving one LLM turn through its tool-call loop.
//!
//! [`StreamOrchestrator`] executes one logical turn against a [`StreamProvider`],
//! looping through tool calls via a [`ToolRegistry`], enforcing `maxToolCalls`,
//! and exposing a live [`OrchestratorMetrics`] snapshot while it runs.

pub mod checkpoint;
pub mod conversation;
pub mod cost;
pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod provider;
pub mod tool;

pub use checkpoint::Checkpoint;
pub use conversation::{ConversationMessage, Role};
pub use cost::ModelCost;
pub use error::OrchestratorError;
pub use metrics::OrchestratorMetrics;
pub use orchestrator::{OrchestratorConfig, StreamOrchestrator};
pub use provider::{EventStream, StreamOptions, StreamProvider, ToolDefinition};
pub use tool::{ToolHandler, ToolOutput, ToolRegistry};

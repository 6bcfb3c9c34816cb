//! Drives one logical LLM turn through its tool-call loop.

use crate::checkpoint::Checkpoint;
use crate::conversation::ConversationMessage;
use crate::cost::ModelCost;
use crate::error::OrchestratorError;
use crate::metrics::OrchestratorMetrics;
use crate::provider::{EventStream, StreamOptions, StreamProvider};
use crate::tool::ToolRegistry;
use futures::StreamExt;
use kernel_types::id::StreamRunId;
use kernel_types::stream::{StreamEvent, StreamState};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Tuning knobs for one [`StreamOrchestrator`].
#[derive(Clone)]
pub struct OrchestratorConfig {
    /// Hard cap on tool invocations across the whole turn.
    pub max_tool_calls: usize,
    /// Per-model `$/million tokens` table backing cost estimation.
    pub cost_table: HashMap<String, ModelCost>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self { max_tool_calls: 25, cost_table: ModelCost::default_table() }
    }
}

fn try_transition(state: &Mutex<StreamState>, next: StreamState) -> Result<(), OrchestratorError> {
    let mut guard = state.lock().expect("state mutex poisoned");
    let from = *guard;
    if from.can_transition_to(next) {
        *guard = next;
        Ok(())
    } else {
        Err(OrchestratorError::InvalidTransition { from, to: next })
    }
}

/// Executes one logical LLM turn, looping through tool calls as needed, and
/// exposes a live [`OrchestratorMetrics`] snapshot while it runs.
///
/// One `StreamOrchestrator` drives one run: construct a fresh instance per
/// turn, or call [`Self::resume_from`] to continue a checkpointed one.
pub struct StreamOrchestrator {
    provider: Arc<dyn StreamProvider>,
    tools: Arc<ToolRegistry>,
    model: String,
    config: OrchestratorConfig,
    run_id: StreamRunId,
    state: Arc<Mutex<StreamState>>,
    metrics: Arc<Mutex<OrchestratorMetrics>>,
    content_so_far: Arc<Mutex<String>>,
    cancel: CancellationToken,
}

impl StreamOrchestrator {
    /// Build an orchestrator for one turn against `model`, using `provider`
    /// to stream and `tools` to resolve any tool calls it makes.
    pub fn new(provider: Arc<dyn StreamProvider>, model: impl Into<String>, tools: ToolRegistry, config: OrchestratorConfig) -> Self {
        Self {
            provider,
            tools: Arc::new(tools),
            model: model.into(),
            config,
            run_id: StreamRunId::generate(),
            state: Arc::new(Mutex::new(StreamState::Idle)),
            metrics: Arc::new(Mutex::new(OrchestratorMetrics::default())),
            content_so_far: Arc::new(Mutex::new(String::new())),
            cancel: CancellationToken::new(),
        }
    }

    /// Stable identifier for this run, preserved across checkpoint/resume.
    pub fn run_id(&self) -> &StreamRunId {
        &self.run_id
    }

    /// Current state of the run.
    pub fn state(&self) -> StreamState {
        *self.state.lock().expect("state mutex poisoned")
    }

    /// A cheap clone of the metrics accumulated so far.
    pub fn metrics(&self) -> OrchestratorMetrics {
        self.metrics.lock().expect("metrics mutex poisoned").clone()
    }

    /// Cancel the underlying stream and transition to `completed`.
    ///
    /// A no-op if the run has already reached a terminal state.
    pub fn abort(&self) {
        self.cancel.cancel();
        let mut guard = self.state.lock().expect("state mutex poisoned");
        if matches!(*guard, StreamState::Streaming | StreamState::ToolExecuting | StreamState::Thinking) {
            *guard = StreamState::Completed;
        }
    }

    /// Capture `{contentSoFar, metrics, state}` for later resumption.
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            content_so_far: self.content_so_far.lock().expect("content mutex poisoned").clone(),
            metrics: self.metrics(),
            state: self.state(),
        }
    }

    /// Continue a checkpointed run: the checkpoint's content becomes the
    /// assistant prefix, and `messages` is the conversation to continue from
    /// (typically the same history the checkpoint was taken against, plus
    /// whatever the caller wants to inject).
    pub fn resume_from(&self, checkpoint: Checkpoint, mut messages: Vec<ConversationMessage>) -> EventStream {
        *self.metrics.lock().expect("metrics mutex poisoned") = checkpoint.metrics;
        *self.content_so_far.lock().expect("content mutex poisoned") = checkpoint.content_so_far.clone();
        *self.state.lock().expect("state mutex poisoned") = StreamState::Idle;
        if !checkpoint.content_so_far.is_empty() {
            messages.push(ConversationMessage::assistant(checkpoint.content_so_far));
        }
        self.execute(messages)
    }

    /// Begin streaming the turn. Internally loops through any tool calls the
    /// model makes, re-entering `streaming` after each batch resolves, until
    /// `Done` with no pending calls, `maxToolCalls` is exceeded, or a
    /// non-retryable error is reported.
    pub fn execute(&self, messages: Vec<ConversationMessage>) -> EventStream {
        let run_id = self.run_id.clone();
        let provider = self.provider.clone();
        let tools = self.tools.clone();
        let model = self.model.clone();
        let max_tool_calls = self.config.max_tool_calls;
        let cost_table = self.config.cost_table.clone();
        let state = self.state.clone();
        let metrics = self.metrics.clone();
        let content_so_far = self.content_so_far.clone();
        let cancel = self.cancel.clone();

        let stream = async_stream::stream! {
            let started = Instant::now();
            if let Err(e) = try_transition(&state, StreamState::Streaming) {
                yield StreamEvent::Error { code: "INVALID_TRANSITION".into(), message: e.to_string(), retryable: false };
                return;
            }

            let mut messages = messages;
            let mut tool_calls_made: usize = 0;
            let mut accumulated_content = String::new();

            loop {
                if cancel.is_cancelled() {
                    let _ = try_transition(&state, StreamState::Completed);
                    return;
                }

                let options = StreamOptions {
                    model: model.clone(),
                    tools: Vec::new(),
                    temperature: None,
                    max_tokens: None,
                    enable_thinking: false,
                    thinking_budget: None,
                    cancellation: cancel.clone(),
                };
                let mut turn_stream = provider.stream(messages.clone(), options).await;

                let mut pending_tool_calls = Vec::new();
                let mut turn_done = false;

                while let Some(event) = turn_stream.next().await {
                    match event {
                        StreamEvent::Token { content } => {
                            let mut m = metrics.lock().expect("metrics mutex poisoned");
                            if m.time_to_first_token.is_none() {
                                m.time_to_first_token = Some(started.elapsed());
                            }
                            m.output_tokens += 1;
                            drop(m);
                            accumulated_content.push_str(&content);
                            *content_so_far.lock().expect("content mutex poisoned") = accumulated_content.clone();
                            yield StreamEvent::Token { content };
                        }
                        StreamEvent::ThinkingStart => {
                            let _ = try_transition(&state, StreamState::Thinking);
                            tracing::debug!(run_id = %run_id, "entering thinking state");
                            yield StreamEvent::ThinkingStart;
                        }
                        StreamEvent::ThinkingToken { content } => {
                            metrics.lock().expect("metrics mutex poisoned").thinking_tokens += 1;
                            yield StreamEvent::ThinkingToken { content };
                        }
                        StreamEvent::ThinkingEnd => {
                            let _ = try_transition(&state, StreamState::Streaming);
                            yield StreamEvent::ThinkingEnd;
                        }
                        StreamEvent::Metadata { provider, model: reported_model, input_tokens, output_tokens } => {
                            // `output_tokens` here is provider-reported usage, not counted
                            // separately: `metrics.output_tokens` must equal the number of
                            // `Token` events yielded, so only `Token` increments it.
                            let mut m = metrics.lock().expect("metrics mutex poisoned");
                            m.input_tokens = input_tokens;
                            if let Some(cost) = cost_table.get(&reported_model) {
                                m.estimated_cost = cost.estimate(m.input_tokens, m.output_tokens);
                            }
                            drop(m);
                            yield StreamEvent::Metadata { provider, model: reported_model, input_tokens, output_tokens };
                        }
                        StreamEvent::ToolStart { tool_call_id, name, args } => {
                            pending_tool_calls.push((tool_call_id.clone(), name.clone(), args.clone()));
                            yield StreamEvent::ToolStart { tool_call_id, name, args };
                        }
                        StreamEvent::Error { code, message, retryable } => {
                            if !retryable {
                                let _ = try_transition(&state, StreamState::Error);
                                tracing::warn!(run_id = %run_id, %code, "stream ended in non-retryable error");
                                yield StreamEvent::Error { code, message, retryable };
                                return;
                            }
                            yield StreamEvent::Error { code, message, retryable };
                        }
                        StreamEvent::Done { content, reason } => {
                            turn_done = true;
                            let snapshot = metrics.lock().expect("metrics mutex poisoned").to_stream_metrics();
                            yield StreamEvent::Done { content, reason, metrics: snapshot };
                        }
                        StreamEvent::ToolResult { tool_call_id, content, success, duration } => {
                            yield StreamEvent::ToolResult { tool_call_id, content, success, duration };
                        }
                    }
                    if turn_done {
                        break;
                    }
                }

                if pending_tool_calls.is_empty() {
                    let _ = try_transition(&state, StreamState::Completed);
                    return;
                }

                if tool_calls_made + pending_tool_calls.len() > max_tool_calls {
                    yield StreamEvent::Error {
                        code: "MAX_TOOL_CALLS".into(),
                        message: format!("max tool calls ({max_tool_calls}) exceeded"),
                        retryable: false,
                    };
                    let _ = try_transition(&state, StreamState::Completed);
                    return;
                }

                if try_transition(&state, StreamState::ToolExecuting).is_err() {
                    return;
                }
                tracing::debug!(run_id = %run_id, pending = pending_tool_calls.len(), "resolving tool calls");
                messages.push(ConversationMessage::assistant(accumulated_content.clone()));

                let mut tool_result_text = String::new();
                for (tool_call_id, name, args) in pending_tool_calls {
                    let tool_started = Instant::now();
                    let output = tools.dispatch(&name, args).await;
                    let elapsed = tool_started.elapsed();
                    {
                        let mut m = metrics.lock().expect("metrics mutex poisoned");
                        m.tool_call_count += 1;
                        m.tool_latency += elapsed;
                    }
                    tool_calls_made += 1;
                    tool_result_text.push_str(&output.content);
                    tool_result_text.push('\n');
                    yield StreamEvent::ToolResult {
                        tool_call_id,
                        content: output.content,
                        success: output.success,
                        duration: elapsed,
                    };
                }
                messages.push(ConversationMessage::user(tool_result_text));
                accumulated_content.clear();

                if try_transition(&state, StreamState::Streaming).is_err() {
                    return;
                }
            }
        };
        Box::pin(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::test_support::{AlwaysToolProvider, ScriptedToolProvider};
    use crate::tool::test_support::EchoTool;

    fn registry_with_echo() -> ToolRegistry {
        let mut tools = ToolRegistry::new();
        tools.register("lookup", Arc::new(EchoTool));
        tools
    }

    /// S6 — one tool call resolves, then the model finishes: the observed
    /// event sequence is `Token*, ToolStart, ToolResult(success=true),
    /// Token*, Done`, and `metrics.tool_call_count == 1`.
    #[tokio::test]
    async fn tool_loop_resolves_one_call_then_completes() {
        let provider = ScriptedToolProvider::new("lookup");
        let orchestrator = StreamOrchestrator::new(provider, "claude-sonnet-4", registry_with_echo(), OrchestratorConfig::default());

        let mut stream = orchestrator.execute(vec![ConversationMessage::user("what's the weather?")]);
        let mut events = Vec::new();
        while let Some(event) = stream.next().await {
            events.push(event);
        }

        assert!(matches!(events[0], StreamEvent::Token { .. }));
        assert!(events.iter().any(|e| matches!(e, StreamEvent::ToolStart { .. })));
        assert!(events.iter().any(|e| matches!(e, StreamEvent::ToolResult { success: true, .. })));

        let token_count = events.iter().filter(|e| matches!(e, StreamEvent::Token { .. })).count() as u32;
        let StreamEvent::Done { metrics: done_metrics, .. } = events.last().unwrap() else {
            panic!("expected the stream to end in Done");
        };
        assert_eq!(done_metrics.output_tokens, token_count);

        let metrics = orchestrator.metrics();
        assert_eq!(metrics.tool_call_count, 1);
        assert_eq!(metrics.output_tokens, done_metrics.output_tokens);
        assert_eq!(orchestrator.state(), StreamState::Completed);
    }

    #[tokio::test]
    async fn unregistered_tool_yields_failed_result_without_aborting() {
        let provider = ScriptedToolProvider::new("no-such-tool");
        let orchestrator = StreamOrchestrator::new(provider, "claude-sonnet-4", ToolRegistry::new(), OrchestratorConfig::default());

        let mut stream = orchestrator.execute(vec![ConversationMessage::user("hi")]);
        let mut saw_failed_result = false;
        while let Some(event) = stream.next().await {
            if let StreamEvent::ToolResult { success, .. } = event {
                saw_failed_result = !success;
            }
        }
        assert!(saw_failed_result);
        assert_eq!(orchestrator.state(), StreamState::Completed);
    }

    #[tokio::test]
    async fn max_tool_calls_emits_error_without_transitioning_to_error_state() {
        let provider = Arc::new(AlwaysToolProvider { tool_name: "lookup".into() });
        let config = OrchestratorConfig { max_tool_calls: 1, ..OrchestratorConfig::default() };
        let orchestrator = StreamOrchestrator::new(provider, "claude-sonnet-4", registry_with_echo(), config);

        let mut stream = orchestrator.execute(vec![ConversationMessage::user("loop forever")]);
        let mut saw_cap_error = false;
        while let Some(event) = stream.next().await {
            if let StreamEvent::Error { code, .. } = &event {
                if code == "MAX_TOOL_CALLS" {
                    saw_cap_error = true;
                }
            }
        }
        assert!(saw_cap_error);
        assert_eq!(orchestrator.state(), StreamState::Completed);
    }

    #[tokio::test]
    async fn abort_cancels_and_completes() {
        let provider = Arc::new(AlwaysToolProvider { tool_name: "lookup".into() });
        let orchestrator = StreamOrchestrator::new(provider, "claude-sonnet-4", registry_with_echo(), OrchestratorConfig::default());
        orchestrator.abort();
        let mut stream = orchestrator.execute(vec![ConversationMessage::user("hi")]);
        // `execute` still attempts its first transition; since abort already
        // cancelled and this run never entered `streaming`, the transition
        // from `idle` to `streaming` is legal and proceeds, then the
        // cancellation check ends it immediately.
        while stream.next().await.is_some() {}
        assert_eq!(orchestrator.state(), StreamState::Completed);
    }

    #[tokio::test]
    async fn checkpoint_round_trips_into_resume() {
        let provider = ScriptedToolProvider::new("lookup");
        let orchestrator = StreamOrchestrator::new(provider, "claude-sonnet-4", registry_with_echo(), OrchestratorConfig::default());
        let mut stream = orchestrator.execute(vec![ConversationMessage::user("hi")]);
        // Drain only the first event so content_so_far has something in it
        // before checkpointing mid-stream.
        let _ = stream.next().await;
        let checkpoint = orchestrator.checkpoint();
        assert!(!checkpoint.content_so_far.is_empty());

        let provider2 = ScriptedToolProvider::new("lookup");
        let resumed = StreamOrchestrator::new(provider2, "claude-sonnet-4", registry_with_echo(), OrchestratorConfig::default());
        let mut resumed_stream = resumed.resume_from(checkpoint, vec![ConversationMessage::user("hi")]);
        let mut saw_any = false;
        while resumed_stream.next().await.is_some() {
            saw_any = true;
        }
        assert!(saw_any);
    }
}

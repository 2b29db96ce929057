//! Tool-calling loop
//!
//! One run of [`ToolLoop::run`] turns a user message into a final reply:
//! request, stream, execute any requested tools, feed results back, repeat
//! until the model stops asking for tools or the iteration cap is reached.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::config::{Config, DEFAULT_MAX_TOOL_ITERATIONS};
use crate::error::{FailureKind, ProviderError, TetherError};
use crate::providers::{ChatOptions, LLMProvider, StreamEvent, ToolDefinition, Usage};
use crate::session::{Message, ToolCall, ToolResult};
use crate::tools::{ToolContext, ToolRegistry};
use crate::utils::string::preview;

use super::context::ContextBuilder;
use super::stream::{Completion, StreamAccumulator};

/// Text used for results of tool calls skipped after cancellation.
const CANCELLED_RESULT: &str = "Error: cancelled before execution";

// ============================================================================
// Observer
// ============================================================================

/// Receives loop progress as it happens.
///
/// Callbacks run synchronously on the loop's task, in event order, so they
/// should return quickly.
pub trait LoopObserver: Send + Sync {
    /// A chunk of assistant text arrived.
    fn on_partial_reply(&self, _text: &str) {}

    /// A tool is about to run.
    fn on_tool_start(&self, _name: &str, _args: &Value) {}

    /// A tool finished; `result` is its output text.
    fn on_tool_end(&self, _name: &str, _result: &str) {}
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl LoopObserver for NoopObserver {}

// ============================================================================
// Configuration and outcome
// ============================================================================

/// Per-loop settings.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Maximum model calls per run
    pub max_iterations: u32,
    /// Model override; `None` uses the provider default
    pub model: Option<String>,
    /// Generation options sent on every call
    pub options: ChatOptions,
    /// System instructions
    pub system_prompt: Option<String>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_TOOL_ITERATIONS,
            model: None,
            options: ChatOptions::new(),
            system_prompt: None,
        }
    }
}

impl LoopConfig {
    /// Settings from the agent section of `config`.
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_iterations: config.agent.max_tool_iterations,
            model: Some(config.agent.model.clone()),
            options: ChatOptions::new()
                .with_max_tokens(config.agent.max_tokens)
                .with_temperature(config.agent.temperature),
            system_prompt: config.agent.system_prompt.clone(),
        }
    }

    /// Override the iteration cap.
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Override the model.
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = Some(model.to_string());
        self
    }
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopStop {
    /// The model produced a final answer
    Completed,
    /// The iteration cap was reached; the last text is the answer
    IterationCap,
    /// Cancellation was observed at a checkpoint
    Cancelled,
    /// The backend failed
    Failed,
}

impl LoopStop {
    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopStop::Completed => "completed",
            LoopStop::IterationCap => "iteration_cap",
            LoopStop::Cancelled => "cancelled",
            LoopStop::Failed => "failed",
        }
    }
}

impl std::fmt::Display for LoopStop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified backend failure that ended a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl From<&ProviderError> for RunFailure {
    fn from(err: &ProviderError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<&TetherError> for RunFailure {
    fn from(err: &TetherError) -> Self {
        Self {
            kind: err.failure_kind(),
            message: err.to_string(),
        }
    }
}

/// Everything a finished loop produced.
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    /// Final (or last) assistant text; may be empty
    pub final_text: String,
    /// Messages produced by this run, starting with the user turn
    pub messages: Vec<Message>,
    /// Usage summed across every model call
    pub usage: Usage,
    /// Model calls made
    pub iterations: u32,
    /// Why the loop stopped
    pub stop: LoopStop,
    /// Set when `stop` is [`LoopStop::Failed`]
    pub failure: Option<RunFailure>,
}

impl LoopOutcome {
    /// Whether the run ended without a backend failure.
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// How one streamed model call ended.
enum CallEnd {
    Finished(Completion),
    Cancelled(String),
    Failed(RunFailure),
}

// ============================================================================
// Loop
// ============================================================================

/// Drives one provider and one tool registry through the request/tool cycle.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use tether::agent::{LoopConfig, NoopObserver, ToolLoop};
/// use tether::providers::ClaudeProvider;
/// use tether::tools::{default_registry, ToolContext};
///
/// let provider = Arc::new(ClaudeProvider::new("sk-ant-..."));
/// let tool_loop = ToolLoop::new(provider, Arc::new(default_registry()), LoopConfig::default());
/// let outcome = tool_loop
///     .run(&[], "List the workspace", &ToolContext::new("."), &NoopObserver)
///     .await;
/// println!("{}", outcome.final_text);
/// ```
pub struct ToolLoop {
    provider: Arc<dyn LLMProvider>,
    tools: Arc<ToolRegistry>,
    context: ContextBuilder,
    config: LoopConfig,
}

impl ToolLoop {
    /// Create a loop over `provider` and `tools`.
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        tools: Arc<ToolRegistry>,
        config: LoopConfig,
    ) -> Self {
        let mut context = ContextBuilder::new();
        if let Some(prompt) = config.system_prompt.as_deref() {
            context = context.with_system_prompt(prompt);
        }
        Self {
            provider,
            tools,
            context,
            config,
        }
    }

    /// The settings this loop runs with.
    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Run the loop for one user turn.
    ///
    /// Never returns an error: backend failures and cancellation are reported
    /// through [`LoopOutcome::stop`] together with every message produced so
    /// far. `ctx` carries the workspace, session id and cancellation token
    /// handed to each tool.
    pub async fn run(
        &self,
        history: &[Message],
        input: &str,
        ctx: &ToolContext,
        observer: &dyn LoopObserver,
    ) -> LoopOutcome {
        let mut outcome = LoopOutcome {
            final_text: String::new(),
            messages: vec![Message::user(input)],
            usage: Usage::default(),
            iterations: 0,
            stop: LoopStop::IterationCap,
            failure: None,
        };
        let definitions = self.tools.definitions();
        let max_iterations = self.config.max_iterations.max(1);

        while outcome.iterations < max_iterations {
            if ctx.is_cancelled() {
                info!(iterations = outcome.iterations, "Run cancelled before model call");
                outcome.stop = LoopStop::Cancelled;
                return outcome;
            }

            outcome.iterations += 1;
            debug!(
                iteration = outcome.iterations,
                max_iterations, "Dispatching model call"
            );

            let messages = self.context.build_messages(history, &outcome.messages);
            let call = self
                .call_model(messages, definitions.clone(), ctx, observer, &mut outcome.usage)
                .await;

            let completion = match call {
                CallEnd::Finished(completion) => completion,
                CallEnd::Cancelled(partial) => {
                    info!(iteration = outcome.iterations, "Run cancelled while streaming");
                    outcome.final_text = partial;
                    outcome.stop = LoopStop::Cancelled;
                    return outcome;
                }
                CallEnd::Failed(failure) => {
                    error!(
                        iteration = outcome.iterations,
                        kind = %failure.kind,
                        error = %failure.message,
                        "Model call failed"
                    );
                    outcome.stop = LoopStop::Failed;
                    outcome.failure = Some(failure);
                    return outcome;
                }
            };

            outcome.final_text = completion.text.clone();
            let last_iteration = outcome.iterations >= max_iterations;

            if completion.is_final() || last_iteration {
                if !completion.tool_calls.is_empty() {
                    debug!(
                        calls = completion.tool_calls.len(),
                        stop_reason = ?completion.stop_reason,
                        "Ignoring tool calls on final model call"
                    );
                }
                if !completion.text.is_empty() {
                    outcome.messages.push(Message::assistant(&completion.text));
                }
                if completion.is_final() {
                    outcome.stop = LoopStop::Completed;
                } else {
                    info!(iterations = outcome.iterations, "Tool loop reached maximum iterations");
                    outcome.stop = LoopStop::IterationCap;
                }
                return outcome;
            }

            let (results, cancelled) = self
                .execute_tools(&completion.tool_calls, ctx, observer)
                .await;
            outcome.messages.push(Message::assistant_with_tools(
                &completion.text,
                completion.tool_calls,
            ));
            outcome.messages.push(Message::tool_results(results));

            if cancelled {
                info!(iteration = outcome.iterations, "Run cancelled during tool execution");
                outcome.stop = LoopStop::Cancelled;
                return outcome;
            }
        }

        outcome
    }

    /// Dispatch one streaming call and consume it to the end.
    async fn call_model(
        &self,
        messages: Vec<Message>,
        definitions: Vec<ToolDefinition>,
        ctx: &ToolContext,
        observer: &dyn LoopObserver,
        usage: &mut Usage,
    ) -> CallEnd {
        let model = self.config.model.as_deref();
        let dispatch = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return CallEnd::Cancelled(String::new()),
            result = self
                .provider
                .chat_stream(messages, definitions, model, self.config.options.clone()) => result,
        };

        let mut events = match dispatch {
            Ok(events) => events,
            Err(e) => return CallEnd::Failed(RunFailure::from(&e)),
        };

        let mut acc = StreamAccumulator::new();
        loop {
            let event = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => {
                    usage.add(acc.usage());
                    return CallEnd::Cancelled(acc.text().to_string());
                }
                event = events.recv() => event,
            };

            let Some(event) = event else {
                break;
            };
            if let StreamEvent::Error(err) = &event {
                usage.add(acc.usage());
                return CallEnd::Failed(RunFailure::from(err));
            }
            if let Some(delta) = acc.push(&event) {
                observer.on_partial_reply(delta);
            }
            if acc.is_done() {
                break;
            }
        }

        usage.add(acc.usage());
        if !acc.is_done() {
            warn!("Model stream ended without a completion marker");
            return CallEnd::Failed(RunFailure {
                kind: FailureKind::Unknown,
                message: "stream ended unexpectedly".to_string(),
            });
        }
        CallEnd::Finished(acc.finish())
    }

    /// Run each call in order. Returns the results and whether cancellation
    /// cut the batch short.
    async fn execute_tools(
        &self,
        calls: &[ToolCall],
        ctx: &ToolContext,
        observer: &dyn LoopObserver,
    ) -> (Vec<ToolResult>, bool) {
        let mut results = Vec::with_capacity(calls.len());
        let mut cancelled = false;

        for call in calls {
            if cancelled || ctx.is_cancelled() {
                cancelled = true;
                results.push(ToolResult::error(&call.id, CANCELLED_RESULT));
                continue;
            }

            info!(tool = %call.name, id = %call.id, "Executing tool");
            observer.on_tool_start(&call.name, &call.arguments);

            let start = Instant::now();
            let output = self
                .tools
                .execute_with_context(&call.name, call.arguments.clone(), ctx)
                .await;
            let latency_ms = start.elapsed().as_millis() as u64;

            if output.is_error {
                warn!(
                    tool = %call.name,
                    latency_ms,
                    output = %preview(&output.content, 200),
                    "Tool returned an error"
                );
            } else {
                debug!(tool = %call.name, latency_ms, "Tool executed successfully");
            }

            observer.on_tool_end(&call.name, &output.content);
            results.push(if output.is_error {
                ToolResult::error(&call.id, output.content)
            } else {
                ToolResult::success(&call.id, output.content)
            });
        }

        (results, cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::providers::{EventStream, StopReason};
    use crate::session::Role;
    use crate::tools::{Tool, ToolOutput};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    /// Replays one scripted event list per call; repeats the last script
    /// when it runs out.
    struct ScriptedProvider {
        scripts: Mutex<VecDeque<Vec<StreamEvent>>>,
        last: Mutex<Vec<StreamEvent>>,
        seen: Mutex<Vec<Vec<Message>>>,
    }

    impl ScriptedProvider {
        fn new(scripts: Vec<Vec<StreamEvent>>) -> Self {
            Self {
                scripts: Mutex::new(scripts.into()),
                last: Mutex::new(Vec::new()),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LLMProvider for ScriptedProvider {
        async fn chat_stream(
            &self,
            messages: Vec<Message>,
            _tools: Vec<ToolDefinition>,
            _model: Option<&str>,
            _options: ChatOptions,
        ) -> Result<EventStream> {
            self.seen.lock().unwrap().push(messages);
            let script = match self.scripts.lock().unwrap().pop_front() {
                Some(script) => {
                    *self.last.lock().unwrap() = script.clone();
                    script
                }
                None => self.last.lock().unwrap().clone(),
            };
            let (tx, rx) = mpsc::channel(script.len().max(1));
            for event in script {
                tx.try_send(event).unwrap();
            }
            Ok(rx)
        }

        fn default_model(&self) -> &str {
            "scripted"
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn text_reply(text: &str) -> Vec<StreamEvent> {
        vec![
            StreamEvent::TextDelta(text.to_string()),
            StreamEvent::Usage(Usage::new(5, 2)),
            StreamEvent::Done {
                stop_reason: Some(StopReason::EndTurn),
            },
        ]
    }

    fn tool_reply(id: &str, name: &str, args: &str) -> Vec<StreamEvent> {
        vec![
            StreamEvent::ToolCallDelta {
                index: 0,
                id: Some(id.to_string()),
                name: Some(name.to_string()),
                arguments: args.to_string(),
            },
            StreamEvent::Usage(Usage::new(3, 1)),
            StreamEvent::Done {
                stop_reason: Some(StopReason::ToolUse),
            },
        ]
    }

    struct EchoArgs;

    #[async_trait]
    impl Tool for EchoArgs {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echo"
        }
        fn parameters(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<ToolOutput> {
            Ok(ToolOutput::text(args.to_string()))
        }
    }

    /// Cancels the run's token when it executes.
    struct CancelTool(CancellationToken);

    #[async_trait]
    impl Tool for CancelTool {
        fn name(&self) -> &str {
            "stop"
        }
        fn description(&self) -> &str {
            "Cancel the run"
        }
        fn parameters(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<ToolOutput> {
            self.0.cancel();
            Ok(ToolOutput::text("stopping"))
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl LoopObserver for Recorder {
        fn on_partial_reply(&self, text: &str) {
            self.0.lock().unwrap().push(format!("text:{}", text));
        }
        fn on_tool_start(&self, name: &str, _args: &Value) {
            self.0.lock().unwrap().push(format!("start:{}", name));
        }
        fn on_tool_end(&self, name: &str, _result: &str) {
            self.0.lock().unwrap().push(format!("end:{}", name));
        }
    }

    fn registry() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoArgs));
        Arc::new(registry)
    }

    #[tokio::test]
    async fn test_plain_reply_single_iteration() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_reply("Hi there")]));
        let tool_loop = ToolLoop::new(provider.clone(), registry(), LoopConfig::default());
        let recorder = Recorder::default();

        let outcome = tool_loop
            .run(&[], "hello", &ToolContext::default(), &recorder)
            .await;

        assert_eq!(outcome.stop, LoopStop::Completed);
        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.final_text, "Hi there");
        assert_eq!(outcome.usage, Usage::new(5, 2));
        assert_eq!(outcome.messages.len(), 2);
        assert_eq!(provider.calls(), 1);
        assert_eq!(*recorder.0.lock().unwrap(), vec!["text:Hi there"]);
    }

    #[tokio::test]
    async fn test_tool_round_trip_and_usage_sum() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_reply("call_1", "echo", "{\"x\":1}"),
            text_reply("done"),
        ]));
        let tool_loop = ToolLoop::new(provider.clone(), registry(), LoopConfig::default());
        let recorder = Recorder::default();

        let outcome = tool_loop
            .run(&[], "go", &ToolContext::default(), &recorder)
            .await;

        assert_eq!(outcome.stop, LoopStop::Completed);
        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.usage, Usage::new(8, 3));
        // user, assistant+calls, carrier, final assistant
        assert_eq!(outcome.messages.len(), 4);
        let results = outcome.messages[2].tool_results.as_ref().unwrap();
        assert_eq!(results[0].tool_call_id(), "call_1");
        assert_eq!(results[0].content(), "{\"x\":1}");
        assert!(!results[0].is_error());
        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec!["start:echo", "end:echo", "text:done"]
        );

        // The second request carries the first round's messages.
        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen[1].len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_tool_reported_and_loop_continues() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_reply("call_1", "nope", "{}"),
            text_reply("sorry"),
        ]));
        let tool_loop = ToolLoop::new(provider, registry(), LoopConfig::default());

        let outcome = tool_loop
            .run(&[], "go", &ToolContext::default(), &NoopObserver)
            .await;

        let results = outcome.messages[2].tool_results.as_ref().unwrap();
        assert!(results[0].is_error());
        assert!(results[0].content().contains("nope"));
        assert_eq!(outcome.stop, LoopStop::Completed);
        assert_eq!(outcome.final_text, "sorry");
    }

    #[tokio::test]
    async fn test_iteration_cap_stops_at_exactly_cap() {
        let provider = Arc::new(ScriptedProvider::new(vec![tool_reply("c", "echo", "{}")]));
        let config = LoopConfig::default().with_max_iterations(3);
        let tool_loop = ToolLoop::new(provider.clone(), registry(), config);

        let outcome = tool_loop
            .run(&[], "loop", &ToolContext::default(), &NoopObserver)
            .await;

        assert_eq!(outcome.stop, LoopStop::IterationCap);
        assert_eq!(outcome.iterations, 3);
        assert_eq!(provider.calls(), 3);
        assert!(outcome.is_success());
        assert_eq!(outcome.final_text, "");
        // The last call's tool-only reply leaves no empty assistant turn behind.
        let last = outcome.messages.last().unwrap();
        assert!(last.tool_results.is_some());
        assert!(outcome
            .messages
            .iter()
            .all(|m| m.role != Role::Assistant || !m.content.is_empty() || m.tool_calls.is_some()));
    }

    #[tokio::test]
    async fn test_empty_final_reply_records_no_assistant_message() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_reply("call_1", "echo", "{}"),
            vec![StreamEvent::Done {
                stop_reason: Some(StopReason::EndTurn),
            }],
        ]));
        let tool_loop = ToolLoop::new(provider, registry(), LoopConfig::default());

        let outcome = tool_loop
            .run(&[], "go", &ToolContext::default(), &NoopObserver)
            .await;

        assert_eq!(outcome.stop, LoopStop::Completed);
        assert_eq!(outcome.final_text, "");
        // user, assistant+calls, carrier
        assert_eq!(outcome.messages.len(), 3);
        assert!(outcome.messages[2].tool_results.is_some());
    }

    #[tokio::test]
    async fn test_stream_error_returns_partial_messages() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            tool_reply("c", "echo", "{}"),
            vec![
                StreamEvent::TextDelta("par".into()),
                StreamEvent::Error(ProviderError::RateLimit("429 slow down".into())),
            ],
        ]));
        let tool_loop = ToolLoop::new(provider, registry(), LoopConfig::default());

        let outcome = tool_loop
            .run(&[], "go", &ToolContext::default(), &NoopObserver)
            .await;

        assert_eq!(outcome.stop, LoopStop::Failed);
        let failure = outcome.failure.unwrap();
        assert_eq!(failure.kind, FailureKind::RateLimit);
        assert_eq!(outcome.messages.len(), 3);
    }

    #[tokio::test]
    async fn test_truncated_stream_is_failure() {
        let provider = Arc::new(ScriptedProvider::new(vec![vec![StreamEvent::TextDelta(
            "cut".into(),
        )]]));
        let tool_loop = ToolLoop::new(provider, registry(), LoopConfig::default());

        let outcome = tool_loop
            .run(&[], "go", &ToolContext::default(), &NoopObserver)
            .await;

        assert_eq!(outcome.stop, LoopStop::Failed);
        assert_eq!(outcome.failure.unwrap().kind, FailureKind::Unknown);
    }

    #[tokio::test]
    async fn test_cancel_before_first_call() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_reply("never")]));
        let tool_loop = ToolLoop::new(provider.clone(), registry(), LoopConfig::default());
        let token = CancellationToken::new();
        token.cancel();
        let ctx = ToolContext::default().with_cancel(token);

        let outcome = tool_loop.run(&[], "go", &ctx, &NoopObserver).await;

        assert_eq!(outcome.stop, LoopStop::Cancelled);
        assert_eq!(outcome.iterations, 0);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_cancel_mid_batch_pairs_remaining_calls() {
        let token = CancellationToken::new();
        let mut tools = ToolRegistry::new();
        tools.register(Box::new(EchoArgs));
        tools.register(Box::new(CancelTool(token.clone())));

        let batch = vec![
            StreamEvent::ToolCallDelta {
                index: 0,
                id: Some("a".into()),
                name: Some("stop".into()),
                arguments: "{}".into(),
            },
            StreamEvent::ToolCallDelta {
                index: 1,
                id: Some("b".into()),
                name: Some("echo".into()),
                arguments: "{}".into(),
            },
            StreamEvent::Done {
                stop_reason: Some(StopReason::ToolUse),
            },
        ];
        let provider = Arc::new(ScriptedProvider::new(vec![batch, text_reply("never")]));
        let tool_loop = ToolLoop::new(provider.clone(), Arc::new(tools), LoopConfig::default());
        let ctx = ToolContext::default().with_cancel(token);

        let outcome = tool_loop.run(&[], "go", &ctx, &NoopObserver).await;

        assert_eq!(outcome.stop, LoopStop::Cancelled);
        assert_eq!(provider.calls(), 1);
        let results = outcome.messages[2].tool_results.as_ref().unwrap();
        assert_eq!(results.len(), 2);
        assert!(!results[0].is_error());
        assert_eq!(results[1].tool_call_id(), "b");
        assert!(results[1].is_error());
        assert!(results[1].content().contains("cancelled"));
    }

    #[tokio::test]
    async fn test_system_prompt_and_history_prefix() {
        let provider = Arc::new(ScriptedProvider::new(vec![text_reply("ok")]));
        let config = LoopConfig {
            system_prompt: Some("Be terse.".into()),
            ..LoopConfig::default()
        };
        let tool_loop = ToolLoop::new(provider.clone(), registry(), config);
        let history = vec![Message::user("earlier"), Message::assistant("reply")];

        tool_loop
            .run(&history, "now", &ToolContext::default(), &NoopObserver)
            .await;

        let seen = provider.seen.lock().unwrap();
        let contents: Vec<&str> = seen[0].iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["Be terse.", "earlier", "reply", "now"]);
    }
}

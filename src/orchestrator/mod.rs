//! Orchestrator - lane-ordered runs over shared providers and tools
//!
//! [`Orchestrator::submit`] is the single entry point for a user turn:
//!
//! 1. resolve the provider and model (request override, else config default)
//! 2. wait for the turn's lane (session id unless a custom key is given)
//! 3. register the run, load the conversation, drive the [`ToolLoop`]
//! 4. save the conversation once, including partial messages on failure
//!
//! Lifecycle events go out on a broadcast channel; subscribers only watch.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{error, info, info_span, Instrument};

use crate::agent::{LoopConfig, LoopObserver, LoopStop, RunFailure, ToolLoop};
use crate::config::Config;
use crate::error::{FailureKind, Result, TetherError};
use crate::lanes::{LaneScheduler, LaneStats};
use crate::providers::{build_providers, ProviderRegistry, Usage};
use crate::runs::{RunInfo, RunTracker};
use crate::session::{Conversation, FileSessionStore, SessionStore};
use crate::tools::{default_registry, ToolContext, ToolRegistry};

/// Broadcast buffer; slow subscribers lag instead of blocking runs.
const EVENT_CAPACITY: usize = 256;

// ============================================================================
// Requests, results, events
// ============================================================================

/// One user turn to execute.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Conversation to continue
    pub session_id: String,
    /// The user's message
    pub input: String,
    /// Lane to serialize on; defaults to the session id
    pub lane_key: Option<String>,
    /// Provider override
    pub provider: Option<String>,
    /// Model override
    pub model: Option<String>,
}

impl RunRequest {
    /// Create a request for `session_id`.
    pub fn new(session_id: &str, input: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            input: input.to_string(),
            lane_key: None,
            provider: None,
            model: None,
        }
    }

    /// Serialize on a custom lane instead of the session id.
    pub fn with_lane(mut self, lane_key: &str) -> Self {
        self.lane_key = Some(lane_key.to_string());
        self
    }

    /// Dispatch to a specific provider.
    pub fn with_provider(mut self, provider: &str) -> Self {
        self.provider = Some(provider.to_string());
        self
    }

    /// Use a specific model.
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = Some(model.to_string());
        self
    }

    fn lane(&self) -> &str {
        self.lane_key.as_deref().unwrap_or(&self.session_id)
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub run_id: String,
    pub session_id: String,
    pub provider: String,
    pub model: String,
    /// Final assistant text; may be empty
    pub final_text: String,
    pub usage: Usage,
    /// Model calls made
    pub iterations: u32,
    pub stop: LoopStop,
    /// Set when a backend failure ended the run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<RunFailure>,
}

impl RunResult {
    /// Whether the run ended without a backend failure.
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Lifecycle notifications published by the orchestrator.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// A run left its lane queue and began executing
    Started {
        run_id: String,
        session_id: String,
        provider: String,
        model: String,
    },
    /// A run finished without a backend failure
    Ended { result: RunResult },
    /// A run ended because of a failure
    Failed {
        run_id: String,
        session_id: String,
        kind: FailureKind,
        message: String,
    },
}

// ============================================================================
// Orchestrator
// ============================================================================

struct Inner {
    config: Config,
    providers: ProviderRegistry,
    tools: Arc<ToolRegistry>,
    store: Arc<dyn SessionStore>,
    lanes: LaneScheduler,
    runs: RunTracker,
    events: broadcast::Sender<RunEvent>,
}

/// Coordinates lanes, runs, persistence and the tool-calling loop.
///
/// Cloning shares all state.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    /// Create an orchestrator over explicit collaborators.
    pub fn new(
        config: Config,
        providers: ProviderRegistry,
        tools: ToolRegistry,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                config,
                providers,
                tools: Arc::new(tools),
                store,
                lanes: LaneScheduler::new(),
                runs: RunTracker::new(),
                events,
            }),
        }
    }

    /// Build providers, built-in tools and the file session store from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the sessions directory cannot be created.
    pub fn from_config(config: Config) -> Result<Self> {
        let providers = build_providers(&config);
        let store = Arc::new(FileSessionStore::new()?);
        Ok(Self::new(config, providers, default_registry(), store))
    }

    /// The configuration runs use.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Execute one user turn and wait for it to finish.
    ///
    /// Waits behind earlier turns in the same lane. A backend failure is not
    /// an `Err`: it is reported in [`RunResult::failure`] after the partial
    /// conversation has been saved.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider is unknown, the conversation cannot
    /// be loaded or saved, or the lane task panicked.
    pub async fn submit(
        &self,
        request: RunRequest,
        observer: Arc<dyn LoopObserver>,
    ) -> Result<RunResult> {
        let provider_name = request
            .provider
            .clone()
            .unwrap_or_else(|| self.inner.config.agent.provider.clone());
        let provider = self.inner.providers.get(&provider_name).ok_or_else(|| {
            crate::log_component!(
                warn,
                "orchestrator",
                "Unknown provider requested",
                provider = provider_name.as_str()
            );
            TetherError::Config(format!(
                "provider '{}' is not configured (available: {:?})",
                provider_name,
                self.inner.providers.names()
            ))
        })?;
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| provider.default_model().to_string());

        let inner = Arc::clone(&self.inner);
        let lane = request.lane().to_string();
        let task = async move {
            let guard = inner.runs.start(&request.session_id, &provider_name, &model);
            let run_id = guard.run_id().to_string();
            let span = info_span!("run", run_id = %run_id, session_id = %request.session_id);

            async move {
                inner.publish(RunEvent::Started {
                    run_id: run_id.clone(),
                    session_id: request.session_id.clone(),
                    provider: provider_name.clone(),
                    model: model.clone(),
                });

                let mut conversation = match inner.store.load(&request.session_id).await {
                    Ok(found) => found.unwrap_or_else(|| Conversation::new(&request.session_id)),
                    Err(e) => {
                        error!(error = %e, "Failed to load conversation");
                        inner.publish_failure(&run_id, &request.session_id, &e);
                        return Err(e);
                    }
                };

                let loop_config =
                    LoopConfig::from_config(&inner.config).with_model(&model);
                let tool_loop = ToolLoop::new(provider, Arc::clone(&inner.tools), loop_config);
                let ctx = ToolContext::new(inner.config.workspace_path())
                    .with_cancel(guard.cancel_token())
                    .with_session(&request.session_id);

                let outcome = tool_loop
                    .run(&conversation.messages, &request.input, &ctx, observer.as_ref())
                    .await;

                conversation.extend(outcome.messages);
                if let Err(e) = inner.store.save(&conversation).await {
                    error!(error = %e, "Failed to save conversation");
                    inner.publish_failure(&run_id, &request.session_id, &e);
                    return Err(e);
                }

                let result = RunResult {
                    run_id: run_id.clone(),
                    session_id: request.session_id.clone(),
                    provider: provider_name.clone(),
                    model: model.clone(),
                    final_text: outcome.final_text,
                    usage: outcome.usage,
                    iterations: outcome.iterations,
                    stop: outcome.stop,
                    failure: outcome.failure,
                };

                info!(
                    stop = %result.stop,
                    iterations = result.iterations,
                    input_tokens = result.usage.input_tokens,
                    output_tokens = result.usage.output_tokens,
                    "Run finished"
                );

                match result.failure.as_ref() {
                    Some(failure) => inner.publish(RunEvent::Failed {
                        run_id: run_id.clone(),
                        session_id: request.session_id.clone(),
                        kind: failure.kind,
                        message: failure.message.clone(),
                    }),
                    None => inner.publish(RunEvent::Ended {
                        result: result.clone(),
                    }),
                }
                Ok(result)
            }
            .instrument(span)
            .await
        };

        self.inner.lanes.enqueue(&lane, task).await?
    }

    /// Subscribe to lifecycle events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.inner.events.subscribe()
    }

    /// Request cancellation of the session's active run.
    ///
    /// Returns `false` if no run is active for the session; queued turns are
    /// not affected.
    pub fn cancel(&self, session_id: &str) -> bool {
        self.inner.runs.cancel(session_id)
    }

    /// Snapshot of runs currently executing.
    pub fn list_active(&self) -> Vec<RunInfo> {
        self.inner.runs.list_active()
    }

    /// Current lane load.
    pub fn lane_stats(&self) -> LaneStats {
        self.inner.lanes.stats()
    }

    /// Cancel every active run. Returns how many were signalled.
    pub fn shutdown(&self) -> usize {
        let cancelled = self.inner.runs.cancel_all();
        crate::log_component!(info, "orchestrator", "Shutting down", cancelled = cancelled);
        cancelled
    }
}

impl Inner {
    fn publish(&self, event: RunEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn publish_failure(&self, run_id: &str, session_id: &str, err: &TetherError) {
        self.publish(RunEvent::Failed {
            run_id: run_id.to_string(),
            session_id: session_id.to_string(),
            kind: err.failure_kind(),
            message: err.to_string(),
        });
    }
}

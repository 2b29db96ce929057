//! Run tracker - in-flight executions and cooperative cancellation
//!
//! A run is one execution of the tool-calling loop for one user turn. The
//! tracker records each run from the moment its lane task begins until it
//! finishes, whatever the outcome, and hands out the run's
//! [`CancellationToken`]. Cancelling only sets the token; the loop and the
//! tools decide when to look at it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

struct ActiveRun {
    session_id: String,
    provider: String,
    model: String,
    started_at: DateTime<Utc>,
    cancel: CancellationToken,
}

/// Read-only view of an active run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunInfo {
    /// Process-unique run identifier
    pub run_id: String,
    /// Session the run belongs to
    pub session_id: String,
    /// Provider tag the run was dispatched to
    pub provider: String,
    /// Effective model id
    pub model: String,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// Whether cancellation has been requested
    pub cancel_requested: bool,
}

#[derive(Default)]
struct TrackerInner {
    runs: Mutex<HashMap<String, ActiveRun>>,
    next_seq: AtomicU64,
}

/// Registry of in-flight runs.
///
/// Cloning shares the registry.
#[derive(Clone, Default)]
pub struct RunTracker {
    inner: Arc<TrackerInner>,
}

impl RunTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new run and return a guard that removes it when dropped.
    ///
    /// Run ids pair the session id with a per-tracker counter, so two runs
    /// started at the same instant never collide.
    pub fn start(&self, session_id: &str, provider: &str, model: &str) -> RunGuard {
        let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let run_id = format!("run-{}-{}", session_id, seq);
        let cancel = CancellationToken::new();

        let mut runs = self.lock();
        runs.insert(
            run_id.clone(),
            ActiveRun {
                session_id: session_id.to_string(),
                provider: provider.to_string(),
                model: model.to_string(),
                started_at: Utc::now(),
                cancel: cancel.clone(),
            },
        );
        info!(run_id = %run_id, session_id, provider, model, active = runs.len(), "Run started");

        RunGuard {
            tracker: self.clone(),
            run_id,
            cancel,
        }
    }

    /// Request cancellation of the active run(s) for a session.
    ///
    /// Returns `true` if a matching run was found.
    pub fn cancel(&self, session_id: &str) -> bool {
        let runs = self.lock();
        let mut found = false;
        for (run_id, run) in runs.iter().filter(|(_, r)| r.session_id == session_id) {
            warn!(run_id = %run_id, session_id, "Cancellation requested");
            run.cancel.cancel();
            found = true;
        }
        found
    }

    /// Request cancellation of every active run. Returns how many were signalled.
    pub fn cancel_all(&self) -> usize {
        let runs = self.lock();
        for run in runs.values() {
            run.cancel.cancel();
        }
        runs.len()
    }

    /// Snapshot of active runs, oldest first.
    pub fn list_active(&self) -> Vec<RunInfo> {
        let runs = self.lock();
        let mut infos: Vec<RunInfo> = runs
            .iter()
            .map(|(run_id, run)| RunInfo {
                run_id: run_id.clone(),
                session_id: run.session_id.clone(),
                provider: run.provider.clone(),
                model: run.model.clone(),
                started_at: run.started_at,
                cancel_requested: run.cancel.is_cancelled(),
            })
            .collect();
        infos.sort_by(|a, b| a.started_at.cmp(&b.started_at).then(a.run_id.cmp(&b.run_id)));
        infos
    }

    /// Number of active runs.
    pub fn active_count(&self) -> usize {
        self.lock().len()
    }

    /// Whether a session has an active run.
    pub fn is_active(&self, session_id: &str) -> bool {
        self.lock().values().any(|r| r.session_id == session_id)
    }

    fn finish(&self, run_id: &str) {
        let mut runs = self.lock();
        if runs.remove(run_id).is_some() {
            debug!(run_id, active = runs.len(), "Run removed");
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ActiveRun>> {
        self.inner.runs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Keeps a run registered for as long as it is alive.
pub struct RunGuard {
    tracker: RunTracker,
    run_id: String,
    cancel: CancellationToken,
}

impl RunGuard {
    /// The run's id.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// A handle to the run's cancellation token.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.tracker.finish(&self.run_id);
    }
}

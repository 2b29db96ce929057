//! Lane scheduler - per-key FIFO serialization of async tasks
//!
//! Every task is enqueued under a key (normally a session id). Tasks sharing
//! a key run one at a time in arrival order; tasks under different keys run
//! concurrently. A lane exists only while it has queued or running work.
//!
//! A task must never wait on another task enqueued under its own key: the
//! second task can only start after the first finishes, so the wait never
//! resolves.
//!
//! # Example
//!
//! ```
//! use tether::lanes::LaneScheduler;
//!
//! #[tokio::main]
//! async fn main() {
//!     let lanes = LaneScheduler::new();
//!     let value = lanes.enqueue("session-1", async { 40 + 2 }).await.unwrap();
//!     assert_eq!(value, 42);
//!     assert_eq!(lanes.stats().active_lanes, 0);
//! }
//! ```

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::{Result, TetherError};

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Default)]
struct Lane {
    queue: VecDeque<Job>,
    running: bool,
}

/// Snapshot of scheduler load, for observability only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LaneStats {
    /// Lanes with queued or running work
    pub active_lanes: usize,
    /// Tasks waiting for their turn, across all lanes
    pub queued: usize,
}

/// Per-key FIFO task scheduler.
///
/// Each scheduler owns its own lane map, so independent instances never
/// interfere. Cloning shares the map.
#[derive(Clone, Default)]
pub struct LaneScheduler {
    lanes: Arc<Mutex<HashMap<String, Lane>>>,
}

impl LaneScheduler {
    /// Create a scheduler with no lanes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` in the lane for `key` and wait for its output.
    ///
    /// The task starts once every task enqueued earlier under the same key
    /// has finished. A panic inside the task is reported to this caller as
    /// [`TetherError::Lane`] and does not affect later tasks in the lane.
    pub async fn enqueue<F, T>(&self, key: &str, task: F) -> Result<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            let outcome = AssertUnwindSafe(task).catch_unwind().await;
            // The caller may have stopped waiting; the lane carries on.
            let _ = tx.send(outcome);
        });

        let start_drain = {
            let mut lanes = self.lock();
            let lane = lanes.entry(key.to_string()).or_default();
            lane.queue.push_back(job);
            debug!(lane = key, queued = lane.queue.len(), "Task enqueued");
            !std::mem::replace(&mut lane.running, true)
        };

        if start_drain {
            tokio::spawn(drain(Arc::clone(&self.lanes), key.to_string()));
        }

        match rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(panic)) => {
                let reason = panic_message(panic.as_ref());
                warn!(lane = key, reason = %reason, "Lane task panicked");
                Err(TetherError::Lane(format!(
                    "task in lane '{}' panicked: {}",
                    key, reason
                )))
            }
            Err(_) => Err(TetherError::Lane(format!(
                "lane '{}' dropped the task before it completed",
                key
            ))),
        }
    }

    /// Current lane and queue counts.
    pub fn stats(&self) -> LaneStats {
        let lanes = self.lock();
        LaneStats {
            active_lanes: lanes.len(),
            queued: lanes.values().map(|lane| lane.queue.len()).sum(),
        }
    }

    /// Whether the lane for `key` currently has queued or running work.
    pub fn is_active(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Lane>> {
        self.lanes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Run queued jobs for one lane until its queue is empty, then drop the lane.
async fn drain(lanes: Arc<Mutex<HashMap<String, Lane>>>, key: String) {
    loop {
        let job = {
            let mut guard = lanes.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(lane) = guard.get_mut(&key) else {
                return;
            };
            match lane.queue.pop_front() {
                Some(job) => job,
                None => {
                    guard.remove(&key);
                    debug!(lane = %key, "Lane drained");
                    return;
                }
            }
        };
        job.await;
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

//! Tether - local orchestration core for an LLM-backed coding agent
//!
//! Turns a user message into a final reply by running a streaming
//! tool-calling loop against a pluggable model backend, while keeping each
//! session's turns in order and letting in-flight runs be cancelled.
//!
//! - [`lanes`]: per-key FIFO scheduling
//! - [`runs`]: active-run registry and cooperative cancellation
//! - [`agent`]: the tool-calling loop
//! - [`orchestrator`]: ties lanes, runs, persistence and the loop together
//! - [`providers`]: Anthropic and OpenAI streaming adapters
//! - [`tools`]: tool contract, registry and built-in tools
//! - [`session`]: conversation model and persistence

pub mod agent;
pub mod config;
pub mod error;
pub mod lanes;
pub mod orchestrator;
pub mod providers;
pub mod runs;
pub mod session;
pub mod tools;
pub mod utils;

pub use agent::{LoopObserver, LoopOutcome, LoopStop, NoopObserver, RunFailure, ToolLoop};
pub use config::Config;
pub use error::{FailureKind, ProviderError, Result, TetherError};
pub use orchestrator::{Orchestrator, RunEvent, RunRequest, RunResult};
pub use providers::{ChatOptions, LLMProvider, StopReason, StreamEvent, ToolDefinition, Usage};
pub use session::{Conversation, Message, Role, SessionStore, ToolCall, ToolResult};

//! Agent module - the tool-calling loop
//!
//! The loop turns one user message into a final reply by alternating model
//! calls and tool executions:
//!
//! ```text
//!  BUILD_REQUEST ──> AWAIT_MODEL ──> tool calls? ──yes──> EXECUTE_TOOLS ─┐
//!        ^                                │                              │
//!        │                                no                             │
//!        │                                v                              │
//!        │                              DONE                             │
//!        └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Streaming, tool-call reassembly and cancellation checkpoints all live
//! here. Lane ordering, run bookkeeping and persistence are the
//! orchestrator's concern.

mod context;
mod r#loop;
mod stream;

pub use context::ContextBuilder;
pub use r#loop::{
    LoopConfig, LoopObserver, LoopOutcome, LoopStop, NoopObserver, RunFailure, ToolLoop,
};
pub use stream::{Completion, StreamAccumulator};

//! Tool types for Tether
//!
//! This module defines the `Tool` trait every capability implements and the
//! `ToolContext` scope handed to each invocation.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// What a tool hands back to the loop.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    /// Text returned to the model.
    pub content: String,
    /// Whether this result represents an error condition.
    pub is_error: bool,
}

impl ToolOutput {
    /// Successful output.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    /// Error output. The model sees the message and may try something else.
    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// Trait that all tools must implement.
///
/// Tools are executable capabilities the model can call: reading files,
/// running commands, and so on. Returning `Err` is allowed; the registry turns
/// it into an error-flagged [`ToolOutput`] so the loop never sees a failure.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use serde_json::Value;
/// use tether::tools::{Tool, ToolContext, ToolOutput};
/// use tether::error::Result;
///
/// struct MyTool;
///
/// #[async_trait]
/// impl Tool for MyTool {
///     fn name(&self) -> &str { "my_tool" }
///     fn description(&self) -> &str { "Does something useful" }
///     fn parameters(&self) -> Value {
///         serde_json::json!({
///             "type": "object",
///             "properties": {},
///             "required": []
///         })
///     }
///     async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<ToolOutput> {
///         Ok(ToolOutput::text("Done!"))
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name as the model sees it. Matched case-insensitively.
    fn name(&self) -> &str;

    /// Description sent to the model.
    fn description(&self) -> &str;

    /// JSON schema for the tool's arguments.
    fn parameters(&self) -> Value;

    /// Execute the tool.
    ///
    /// Long-running tools should watch `ctx.cancel` and stop early once it
    /// fires; the loop never interrupts a tool on its own.
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutput>;
}

/// Scope provided to a tool invocation.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Root directory for file operations
    pub workspace: PathBuf,
    /// Cooperative cancellation signal of the owning run
    pub cancel: CancellationToken,
    /// Session the run belongs to, if any
    pub session_id: Option<String>,
}

impl Default for ToolContext {
    fn default() -> Self {
        Self::new(".")
    }
}

impl ToolContext {
    /// Create a context rooted at `workspace` with a fresh token.
    ///
    /// # Example
    /// ```
    /// use tether::tools::ToolContext;
    ///
    /// let ctx = ToolContext::new("/home/user/project");
    /// assert!(!ctx.is_cancelled());
    /// ```
    pub fn new(workspace: impl AsRef<Path>) -> Self {
        Self {
            workspace: workspace.as_ref().to_path_buf(),
            cancel: CancellationToken::new(),
            session_id: None,
        }
    }

    /// Use an existing cancellation token.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Tag the context with a session id.
    pub fn with_session(mut self, session_id: &str) -> Self {
        self.session_id = Some(session_id.to_string());
        self
    }

    /// Whether the owning run has been asked to stop.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_context_new() {
        let ctx = ToolContext::new("/tmp/workspace");
        assert_eq!(ctx.workspace, PathBuf::from("/tmp/workspace"));
        assert!(ctx.session_id.is_none());
        assert!(!ctx.is_cancelled());
    }

    #[test]
    fn test_tool_context_builder_chain() {
        let token = CancellationToken::new();
        let ctx = ToolContext::new("/w")
            .with_session("s1")
            .with_cancel(token.clone());
        assert_eq!(ctx.session_id.as_deref(), Some("s1"));

        token.cancel();
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn test_tool_context_clone_shares_token() {
        let ctx = ToolContext::default();
        let copy = ctx.clone();
        ctx.cancel.cancel();
        assert!(copy.is_cancelled());
    }

    #[test]
    fn test_tool_output_constructors() {
        let ok = ToolOutput::text("fine");
        assert_eq!(ok.content, "fine");
        assert!(!ok.is_error);

        let err = ToolOutput::error("broken");
        assert!(err.is_error);
    }
}

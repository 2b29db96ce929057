//! Tools module - Tool definitions and execution for LLM function calling
//!
//! This module provides the infrastructure for defining and executing tools
//! that the model can call during a run.
//!
//! # Overview
//!
//! - `Tool` trait: The interface that all tools must implement
//! - `ToolContext`: Execution scope (workspace root, cancellation, session)
//! - `ToolRegistry`: Central registry for managing and executing tools
//!
//! # Built-in Tools
//!
//! - `EchoTool`: Simple echo tool for testing
//! - `ReadFileTool`: Read file contents inside the workspace
//! - `ListDirTool`: List directory contents inside the workspace
//! - `ShellTool`: Execute shell commands, stopping on cancellation
//!
//! # Example
//!
//! ```rust
//! use tether::tools::{ToolRegistry, EchoTool};
//! use tether::tools::filesystem::ReadFileTool;
//! use tether::tools::shell::ShellTool;
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let mut registry = ToolRegistry::new();
//! registry.register(Box::new(EchoTool));
//! registry.register(Box::new(ReadFileTool));
//! registry.register(Box::new(ShellTool::new()));
//!
//! let output = registry.execute("echo", json!({"message": "Hello!"})).await;
//! assert_eq!(output.content, "Hello!");
//!
//! let definitions = registry.definitions();
//! assert_eq!(definitions.len(), 3);
//! # });
//! ```

pub mod filesystem;
mod registry;
pub mod shell;
mod types;

pub use registry::ToolRegistry;
pub use types::{Tool, ToolContext, ToolOutput};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Build a registry holding every built-in tool.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(EchoTool));
    registry.register(Box::new(filesystem::ReadFileTool));
    registry.register(Box::new(filesystem::ListDirTool));
    registry.register(Box::new(shell::ShellTool::new()));
    registry
}

/// A simple echo tool for testing purposes.
///
/// # Example
///
/// ```rust
/// use tether::tools::{Tool, ToolContext, EchoTool};
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let tool = EchoTool;
/// let ctx = ToolContext::default();
/// let output = tool.execute(json!({"message": "Hello"}), &ctx).await.unwrap();
/// assert_eq!(output.content, "Hello");
/// # });
/// ```
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echoes back the provided message"
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "The message to echo"
                }
            },
            "required": ["message"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<ToolOutput> {
        let message = args
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("(no message)");
        Ok(ToolOutput::text(message))
    }
}

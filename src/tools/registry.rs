//! Tool registry for Tether
//!
//! This module provides the `ToolRegistry` struct for managing and executing
//! tools. Lookup is case-insensitive, and execution never fails: unknown
//! names, tool errors and tool panics all come back as error-flagged output.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use futures::FutureExt;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::providers::ToolDefinition;

use super::{Tool, ToolContext, ToolOutput};

/// A registry that holds and manages tools.
///
/// # Example
///
/// ```rust
/// use tether::tools::{ToolRegistry, EchoTool};
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let mut registry = ToolRegistry::new();
/// registry.register(Box::new(EchoTool));
///
/// assert!(registry.has("ECHO"));
///
/// let output = registry.execute("echo", json!({"message": "hello"})).await;
/// assert_eq!(output.content, "hello");
/// # });
/// ```
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    /// Create a new empty tool registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool whose name matches case-insensitively.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let key = tool.name().to_lowercase();
        info!(tool = %tool.name(), "Registering tool");
        if self.tools.insert(key, tool).is_some() {
            warn!("Replaced an existing tool with the same name");
        }
    }

    /// Look up a tool by name, ignoring case.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(&name.to_lowercase()).map(|t| t.as_ref())
    }

    /// Execute a tool with a default context.
    pub async fn execute(&self, name: &str, args: Value) -> ToolOutput {
        self.execute_with_context(name, args, &ToolContext::default())
            .await
    }

    /// Execute a tool by name with a specific context.
    ///
    /// Always returns an output; failures are flagged with `is_error`.
    ///
    /// # Example
    /// ```
    /// use tether::tools::{ToolRegistry, ToolContext};
    /// use serde_json::json;
    ///
    /// # tokio_test::block_on(async {
    /// let registry = ToolRegistry::new();
    /// let ctx = ToolContext::new("/tmp");
    /// let output = registry.execute_with_context("missing", json!({}), &ctx).await;
    /// assert!(output.is_error);
    /// assert!(output.content.contains("missing"));
    /// # });
    /// ```
    pub async fn execute_with_context(
        &self,
        name: &str,
        args: Value,
        ctx: &ToolContext,
    ) -> ToolOutput {
        let Some(tool) = self.get(name) else {
            warn!(tool = name, "Unknown tool requested");
            return ToolOutput::error(format!("Error: unknown tool '{}'", name));
        };

        let start = Instant::now();
        let outcome = AssertUnwindSafe(tool.execute(args, ctx)).catch_unwind().await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(output)) => {
                info!(
                    tool = name,
                    duration_ms,
                    is_error = output.is_error,
                    "Tool executed"
                );
                output
            }
            Ok(Err(e)) => {
                error!(tool = name, error = %e, duration_ms, "Tool execution failed");
                ToolOutput::error(format!("Error: {}", e))
            }
            Err(_) => {
                error!(tool = name, duration_ms, "Tool panicked");
                ToolOutput::error(format!("Error: tool '{}' crashed", name))
            }
        }
    }

    /// Tool catalog for the provider, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|t| ToolDefinition::new(t.name(), t.description(), t.parameters()))
            .collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    /// Names of all registered tools, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.values().map(|t| t.name()).collect();
        names.sort_unstable();
        names
    }

    /// Check if a tool exists, ignoring case.
    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(&name.to_lowercase())
    }

    /// Get the number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

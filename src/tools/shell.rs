//! Shell tool for Tether
//!
//! Runs a command through `sh -c` in the workspace directory with a timeout.
//! The child is killed as soon as the run's cancellation token fires.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{Result, TetherError};

use super::{Tool, ToolContext, ToolOutput};

/// Default command timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Tool for executing shell commands.
///
/// Output combines stdout and stderr; a non-zero exit code is appended and
/// flags the result as an error.
///
/// # Parameters
/// - `command`: The shell command to execute (required)
/// - `timeout`: Timeout in seconds, defaults to 60 (optional)
///
/// # Example
/// ```rust
/// use tether::tools::{Tool, ToolContext};
/// use tether::tools::shell::ShellTool;
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let tool = ShellTool::new();
/// let output = tool.execute(json!({"command": "echo hi"}), &ToolContext::default()).await.unwrap();
/// assert_eq!(output.content.trim(), "hi");
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct ShellTool {
    default_timeout: Duration,
}

impl ShellTool {
    /// Create a shell tool with the default timeout.
    pub fn new() -> Self {
        Self {
            default_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Override the timeout used when the model does not pass one.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }
}

impl Default for ShellTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Execute a shell command in the workspace and return its output"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                },
                "timeout": {
                    "type": "integer",
                    "description": "Timeout in seconds (default: 60)"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutput> {
        let command = args
            .get("command")
            .and_then(|v| v.as_str())
            .ok_or_else(|| TetherError::Tool("Missing 'command' argument".into()))?;

        let timeout = args
            .get("timeout")
            .and_then(|v| v.as_u64())
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout);

        debug!(command, timeout_secs = timeout.as_secs(), "Running shell command");

        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&ctx.workspace)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TetherError::Tool(format!("Failed to spawn shell: {}", e)))?;

        // Dropping the `wait_with_output` future drops the child, which kills it.
        let output = tokio::select! {
            result = tokio::time::timeout(timeout, child.wait_with_output()) => match result {
                Ok(output) => output?,
                Err(_) => {
                    warn!(command, "Shell command timed out");
                    return Err(TetherError::Tool(format!(
                        "Command timed out after {} seconds",
                        timeout.as_secs()
                    )));
                }
            },
            _ = ctx.cancel.cancelled() => {
                warn!(command, "Shell command cancelled");
                return Ok(ToolOutput::error("Command cancelled"));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        let mut text = stdout.into_owned();
        if !stderr.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str("--- stderr ---\n");
            text.push_str(&stderr);
        }

        match output.status.code() {
            Some(0) => Ok(ToolOutput::text(text)),
            Some(code) => {
                if !text.is_empty() && !text.ends_with('\n') {
                    text.push('\n');
                }
                text.push_str(&format!("[Exit code: {}]", code));
                Ok(ToolOutput::error(text))
            }
            None => {
                text.push_str("[Terminated by signal]");
                Ok(ToolOutput::error(text))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use tempfile::tempdir;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_shell_echo() {
        let output = ShellTool::new()
            .execute(json!({"command": "echo hello"}), &ToolContext::default())
            .await
            .unwrap();
        assert_eq!(output.content.trim(), "hello");
        assert!(!output.is_error);
    }

    #[tokio::test]
    async fn test_shell_runs_in_workspace() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "").unwrap();
        let ctx = ToolContext::new(dir.path());

        let output = ShellTool::new()
            .execute(json!({"command": "ls"}), &ctx)
            .await
            .unwrap();
        assert!(output.content.contains("marker.txt"));
    }

    #[tokio::test]
    async fn test_shell_combined_output() {
        let output = ShellTool::new()
            .execute(
                json!({"command": "echo stdout && echo stderr >&2"}),
                &ToolContext::default(),
            )
            .await
            .unwrap();
        assert!(output.content.contains("stdout"));
        assert!(output.content.contains("--- stderr ---"));
    }

    #[tokio::test]
    async fn test_shell_exit_code() {
        let output = ShellTool::new()
            .execute(json!({"command": "exit 42"}), &ToolContext::default())
            .await
            .unwrap();
        assert!(output.is_error);
        assert!(output.content.contains("[Exit code: 42]"));
    }

    #[tokio::test]
    async fn test_shell_missing_command() {
        let result = ShellTool::new()
            .execute(json!({}), &ToolContext::default())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_shell_timeout() {
        let result = ShellTool::new()
            .execute(json!({"command": "sleep 10", "timeout": 1}), &ToolContext::default())
            .await;
        let err = result.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_shell_cancellation_stops_command() {
        let token = CancellationToken::new();
        let ctx = ToolContext::default().with_cancel(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            token.cancel();
        });

        let started = Instant::now();
        let output = ShellTool::new()
            .execute(json!({"command": "sleep 10"}), &ctx)
            .await
            .unwrap();
        canceller.await.unwrap();

        assert!(output.is_error);
        assert!(output.content.contains("cancelled"));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}

//! Filesystem tools for Tether
//!
//! Read-only file access for the model. Paths may be absolute or relative to
//! the workspace in the tool context, but must resolve inside the workspace.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{Result, TetherError};

use super::{Tool, ToolContext, ToolOutput};

/// Files larger than this are truncated before being handed to the model.
const MAX_READ_BYTES: usize = 256 * 1024;

/// Resolve `path` against the workspace and reject anything that escapes it.
///
/// Both sides are canonicalized, so `..` segments and symlinks pointing
/// outside the workspace are caught.
pub(crate) async fn resolve_in_workspace(path: &str, workspace: &Path) -> Result<PathBuf> {
    let root = tokio::fs::canonicalize(workspace).await.map_err(|e| {
        TetherError::Tool(format!(
            "Workspace '{}' is not accessible: {}",
            workspace.display(),
            e
        ))
    })?;

    let candidate = if Path::new(path).is_absolute() {
        PathBuf::from(path)
    } else {
        root.join(path)
    };

    let resolved = tokio::fs::canonicalize(&candidate)
        .await
        .map_err(|e| TetherError::Tool(format!("Cannot access '{}': {}", path, e)))?;

    if !resolved.starts_with(&root) {
        return Err(TetherError::SecurityViolation(format!(
            "Path '{}' is outside the workspace",
            path
        )));
    }
    Ok(resolved)
}

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| TetherError::Tool(format!("Missing '{}' argument", key)))
}

/// Tool for reading file contents.
///
/// # Parameters
/// - `path`: The path to the file to read (required)
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file at the specified path"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The path to the file to read, relative to the workspace"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutput> {
        let path = required_str(&args, "path")?;
        let full_path = resolve_in_workspace(path, &ctx.workspace).await?;

        let bytes = tokio::fs::read(&full_path).await.map_err(|e| {
            TetherError::Tool(format!(
                "Failed to read file '{}': {}",
                full_path.display(),
                e
            ))
        })?;

        let mut content = String::from_utf8_lossy(&bytes[..bytes.len().min(MAX_READ_BYTES)])
            .into_owned();
        if bytes.len() > MAX_READ_BYTES {
            content.push_str(&format!(
                "\n... [truncated, {} of {} bytes shown]",
                MAX_READ_BYTES,
                bytes.len()
            ));
        }
        Ok(ToolOutput::text(content))
    }
}

/// Tool for listing directory contents.
///
/// Directories are suffixed with `/`; entries are sorted by name.
///
/// # Parameters
/// - `path`: The directory to list (optional, defaults to the workspace root)
pub struct ListDirTool;

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "List the contents of a directory"
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The directory to list, relative to the workspace"
                }
            }
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutput> {
        let path = args.get("path").and_then(|v| v.as_str()).unwrap_or(".");
        let full_path = resolve_in_workspace(path, &ctx.workspace).await?;

        let mut entries = tokio::fs::read_dir(&full_path).await.map_err(|e| {
            TetherError::Tool(format!(
                "Failed to list directory '{}': {}",
                full_path.display(),
                e
            ))
        })?;

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let mut name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type().await?.is_dir() {
                name.push('/');
            }
            names.push(name);
        }
        names.sort();

        if names.is_empty() {
            return Ok(ToolOutput::text("(empty directory)"));
        }
        Ok(ToolOutput::text(names.join("\n")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn workspace() -> (TempDir, ToolContext) {
        let dir = TempDir::new().unwrap();
        let ctx = ToolContext::new(dir.path());
        (dir, ctx)
    }

    #[tokio::test]
    async fn test_read_file_relative() {
        let (dir, ctx) = workspace();
        std::fs::write(dir.path().join("notes.txt"), "hello").unwrap();

        let output = ReadFileTool
            .execute(json!({"path": "notes.txt"}), &ctx)
            .await
            .unwrap();
        assert_eq!(output.content, "hello");
        assert!(!output.is_error);
    }

    #[tokio::test]
    async fn test_read_file_missing_argument() {
        let (_dir, ctx) = workspace();
        let err = ReadFileTool.execute(json!({}), &ctx).await.unwrap_err();
        assert!(err.to_string().contains("Missing 'path'"));
    }

    #[tokio::test]
    async fn test_read_file_missing_file() {
        let (_dir, ctx) = workspace();
        let result = ReadFileTool
            .execute(json!({"path": "nope.txt"}), &ctx)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_read_file_rejects_escape() {
        let outer = TempDir::new().unwrap();
        let inner = outer.path().join("ws");
        std::fs::create_dir(&inner).unwrap();
        std::fs::write(outer.path().join("secret.txt"), "x").unwrap();
        let ctx = ToolContext::new(&inner);

        let err = ReadFileTool
            .execute(json!({"path": "../secret.txt"}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, TetherError::SecurityViolation(_)));

        let absolute = outer.path().join("secret.txt");
        let err = ReadFileTool
            .execute(json!({"path": absolute.to_string_lossy()}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, TetherError::SecurityViolation(_)));
    }

    #[tokio::test]
    async fn test_read_file_truncates_large_files() {
        let (dir, ctx) = workspace();
        std::fs::write(dir.path().join("big.txt"), "a".repeat(MAX_READ_BYTES + 10)).unwrap();

        let output = ReadFileTool
            .execute(json!({"path": "big.txt"}), &ctx)
            .await
            .unwrap();
        assert!(output.content.contains("[truncated"));
    }

    #[tokio::test]
    async fn test_list_dir_sorted_with_markers() {
        let (dir, ctx) = workspace();
        std::fs::write(dir.path().join("b.txt"), "").unwrap();
        std::fs::write(dir.path().join("a.txt"), "").unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();

        let output = ListDirTool.execute(json!({}), &ctx).await.unwrap();
        assert_eq!(output.content, "a.txt\nb.txt\nsrc/");
    }

    #[tokio::test]
    async fn test_list_dir_empty() {
        let (_dir, ctx) = workspace();
        let output = ListDirTool.execute(json!({"path": "."}), &ctx).await.unwrap();
        assert_eq!(output.content, "(empty directory)");
    }
}

//! Session module - Conversation persistence
//!
//! The orchestrator reads a conversation once when a run starts and writes it
//! once when the run ends. How and where it is stored is up to the
//! [`SessionStore`] implementation:
//!
//! - [`MemorySessionStore`]: process-local, for tests and ephemeral use
//! - [`FileSessionStore`]: one pretty-printed JSON file per conversation key
//!
//! # Example
//!
//! ```
//! use tether::session::{Conversation, MemorySessionStore, Message, SessionStore};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = MemorySessionStore::new();
//!     assert!(store.load("cli:main").await.unwrap().is_none());
//!
//!     let mut conversation = Conversation::new("cli:main");
//!     conversation.add_message(Message::user("Hello!"));
//!     store.save(&conversation).await.unwrap();
//!
//!     let loaded = store.load("cli:main").await.unwrap().unwrap();
//!     assert_eq!(loaded.messages.len(), 1);
//! }
//! ```

pub mod types;

pub use types::{Conversation, Message, Role, ToolCall, ToolResult};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::Config;
use crate::error::{Result, TetherError};

/// Persistence collaborator for conversations.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load a conversation. `Ok(None)` means it has never been saved.
    async fn load(&self, key: &str) -> Result<Option<Conversation>>;

    /// Persist a conversation, replacing any previous version.
    async fn save(&self, conversation: &Conversation) -> Result<()>;
}

/// In-memory conversation store.
///
/// Cloning shares the underlying map.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    conversations: Arc<RwLock<HashMap<String, Conversation>>>,
}

impl MemorySessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored conversations.
    pub async fn len(&self) -> usize {
        self.conversations.read().await.len()
    }

    /// Whether nothing has been saved yet.
    pub async fn is_empty(&self) -> bool {
        self.conversations.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, key: &str) -> Result<Option<Conversation>> {
        Ok(self.conversations.read().await.get(key).cloned())
    }

    async fn save(&self, conversation: &Conversation) -> Result<()> {
        self.conversations
            .write()
            .await
            .insert(conversation.key.clone(), conversation.clone());
        Ok(())
    }
}

/// JSON-file conversation store.
///
/// Each conversation lives in `<dir>/<sanitized key>.json`.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    storage_path: PathBuf,
}

impl FileSessionStore {
    /// Create a store under `~/.tether/sessions`, creating the directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the sessions directory cannot be created.
    pub fn new() -> Result<Self> {
        Self::with_path(Config::dir().join("sessions"))
    }

    /// Create a store rooted at a custom directory, creating it if needed.
    ///
    /// # Example
    /// ```no_run
    /// use tether::session::FileSessionStore;
    /// use std::path::PathBuf;
    ///
    /// let store = FileSessionStore::with_path(PathBuf::from("/tmp/sessions")).unwrap();
    /// ```
    pub fn with_path(path: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&path)?;
        Ok(Self { storage_path: path })
    }

    /// The directory conversations are written to.
    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }

    fn file_path(&self, key: &str) -> PathBuf {
        self.storage_path
            .join(format!("{}.json", sanitize_key(key)))
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self, key: &str) -> Result<Option<Conversation>> {
        let file_path = self.file_path(key);
        if !tokio::fs::try_exists(&file_path).await? {
            return Ok(None);
        }
        let content = tokio::fs::read_to_string(&file_path).await?;
        let conversation: Conversation = serde_json::from_str(&content).map_err(|e| {
            TetherError::Session(format!(
                "{} is not a valid conversation: {}",
                file_path.display(),
                e
            ))
        })?;
        debug!(key, messages = conversation.messages.len(), "Loaded conversation");
        Ok(Some(conversation))
    }

    async fn save(&self, conversation: &Conversation) -> Result<()> {
        let file_path = self.file_path(&conversation.key);
        let content = serde_json::to_string_pretty(conversation)?;
        // Write-then-rename so a crash mid-write never truncates history.
        let tmp_path = file_path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, content).await?;
        tokio::fs::rename(&tmp_path, &file_path).await?;
        debug!(
            key = %conversation.key,
            messages = conversation.messages.len(),
            "Saved conversation"
        );
        Ok(())
    }
}

/// Percent-encode characters that are unsafe in filenames.
///
/// The mapping is one-to-one, so distinct keys never share a file:
/// - "cli:main" → "cli%3Amain"
/// - "team/alpha" → "team%2Falpha"
fn sanitize_key(key: &str) -> String {
    let mut result = String::with_capacity(key.len() * 3);
    for c in key.chars() {
        match c {
            '/' => result.push_str("%2F"),
            '\\' => result.push_str("%5C"),
            ':' => result.push_str("%3A"),
            '*' => result.push_str("%2A"),
            '?' => result.push_str("%3F"),
            '"' => result.push_str("%22"),
            '<' => result.push_str("%3C"),
            '>' => result.push_str("%3E"),
            '|' => result.push_str("%7C"),
            '%' => result.push_str("%25"),
            c => result.push(c),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemorySessionStore::new();
        assert!(store.is_empty().await);
        assert!(store.load("a").await.unwrap().is_none());

        let mut conversation = Conversation::new("a");
        conversation.add_message(Message::user("Hello"));
        store.save(&conversation).await.unwrap();

        let loaded = store.load("a").await.unwrap().unwrap();
        assert_eq!(loaded.messages.len(), 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_memory_store_clones_share_state() {
        let store = MemorySessionStore::new();
        let other = store.clone();
        store.save(&Conversation::new("shared")).await.unwrap();
        assert!(other.load("shared").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_file_store_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = FileSessionStore::with_path(dir.path().to_path_buf()).unwrap();

        assert!(store.load("cli:main").await.unwrap().is_none());

        let mut conversation = Conversation::new("cli:main");
        conversation.add_message(Message::user("Hello"));
        conversation.add_message(Message::assistant("Hi"));
        store.save(&conversation).await.unwrap();

        assert!(dir.path().join("cli%3Amain.json").exists());
        assert!(!dir.path().join("cli%3Amain.json.tmp").exists());

        let loaded = store.load("cli:main").await.unwrap().unwrap();
        assert_eq!(loaded.key, "cli:main");
        assert_eq!(loaded.messages.len(), 2);
    }

    #[tokio::test]
    async fn test_file_store_overwrites() {
        let dir = TempDir::new().unwrap();
        let store = FileSessionStore::with_path(dir.path().to_path_buf()).unwrap();

        let mut conversation = Conversation::new("k");
        store.save(&conversation).await.unwrap();
        conversation.add_message(Message::user("later"));
        store.save(&conversation).await.unwrap();

        let loaded = store.load("k").await.unwrap().unwrap();
        assert_eq!(loaded.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_file_store_corrupt_file_is_error() {
        let dir = TempDir::new().unwrap();
        let store = FileSessionStore::with_path(dir.path().to_path_buf()).unwrap();
        std::fs::write(dir.path().join("bad.json"), "{not json").unwrap();
        let err = store.load("bad").await.unwrap_err();
        assert!(matches!(err, TetherError::Session(_)));
        assert!(err.to_string().contains("bad.json"));
    }

    #[test]
    fn test_sanitize_key() {
        assert_eq!(sanitize_key("cli:main"), "cli%3Amain");
        assert_eq!(sanitize_key("a/b\\c"), "a%2Fb%5Cc");
        assert_eq!(sanitize_key("100%"), "100%25");
        assert_ne!(sanitize_key("a:b"), sanitize_key("a%3Ab"));
    }
}

//! Conversation types for Tether
//!
//! This module defines the canonical conversation model shared by the
//! tool-calling loop, the provider adapters and the session stores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A persisted conversation: ordered messages plus bookkeeping.
///
/// Conversations are identified by a key (normally the session id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique identifier for this conversation (e.g., "cli:3f2a")
    pub key: String,
    /// Ordered list of messages
    pub messages: Vec<Message>,
    /// When this conversation was created
    pub created_at: DateTime<Utc>,
    /// When this conversation was last modified
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a new empty conversation with the given key.
    ///
    /// # Example
    /// ```
    /// use tether::session::Conversation;
    ///
    /// let conversation = Conversation::new("cli:main");
    /// assert!(conversation.messages.is_empty());
    /// ```
    pub fn new(key: &str) -> Self {
        let now = Utc::now();
        Self {
            key: key.to_string(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a message and bump `updated_at`.
    pub fn add_message(&mut self, message: Message) {
        self.messages.push(message);
        self.updated_at = Utc::now();
    }

    /// Append several messages in order and bump `updated_at` once.
    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.messages.extend(messages);
        self.updated_at = Utc::now();
    }

    /// Get the number of messages.
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Check if the conversation has no messages.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Get the last message, if any.
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}

/// A single message in a conversation.
///
/// Assistant messages may carry tool calls. Tool results travel back to the
/// model inside a user-role carrier message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// The role of the message sender
    pub role: Role,
    /// The text content of the message
    pub content: String,
    /// Tool calls requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Tool results being returned to the model (user-role carrier only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_results: Option<Vec<ToolResult>>,
}

impl Message {
    /// Create a new user message.
    ///
    /// # Example
    /// ```
    /// use tether::session::{Message, Role};
    ///
    /// let msg = Message::user("Hello, assistant!");
    /// assert_eq!(msg.role, Role::User);
    /// ```
    pub fn user(content: &str) -> Self {
        Self {
            role: Role::User,
            content: content.to_string(),
            tool_calls: None,
            tool_results: None,
        }
    }

    /// Create a new assistant message.
    pub fn assistant(content: &str) -> Self {
        Self {
            role: Role::Assistant,
            content: content.to_string(),
            tool_calls: None,
            tool_results: None,
        }
    }

    /// Create a new system message.
    pub fn system(content: &str) -> Self {
        Self {
            role: Role::System,
            content: content.to_string(),
            tool_calls: None,
            tool_results: None,
        }
    }

    /// Create an assistant message with tool calls.
    ///
    /// # Example
    /// ```
    /// use tether::session::{Message, ToolCall};
    /// use serde_json::json;
    ///
    /// let call = ToolCall::new("call_1", "read_file", json!({"path": "src/lib.rs"}));
    /// let msg = Message::assistant_with_tools("Let me look.", vec![call]);
    /// assert!(msg.has_tool_calls());
    /// ```
    pub fn assistant_with_tools(content: &str, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.to_string(),
            tool_calls: Some(tool_calls),
            tool_results: None,
        }
    }

    /// Create the user-role carrier for a batch of tool results.
    pub fn tool_results(results: Vec<ToolResult>) -> Self {
        Self {
            role: Role::User,
            content: String::new(),
            tool_calls: None,
            tool_results: Some(results),
        }
    }

    /// Check if this message has tool calls.
    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls
            .as_ref()
            .map(|tc| !tc.is_empty())
            .unwrap_or(false)
    }

    /// Check if this message carries tool results.
    pub fn has_tool_results(&self) -> bool {
        self.tool_results
            .as_ref()
            .map(|tr| !tr.is_empty())
            .unwrap_or(false)
    }
}

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompts and instructions
    System,
    /// Messages from the user, and tool-result carriers
    User,
    /// Messages from the AI assistant
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A tool call requested by the assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Backend-assigned identifier, opaque to Tether
    pub id: String,
    /// Name of the tool to call
    pub name: String,
    /// Structured arguments
    pub arguments: Value,
}

impl ToolCall {
    /// Create a new tool call.
    pub fn new(id: &str, name: &str, arguments: Value) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            arguments,
        }
    }

    /// Deserialize the arguments into a concrete type.
    pub fn parse_arguments<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        T::deserialize(&self.arguments)
    }
}

/// The outcome of one tool call. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    tool_call_id: String,
    content: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    is_error: bool,
}

impl ToolResult {
    /// A successful result.
    pub fn success(tool_call_id: &str, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.to_string(),
            content: content.into(),
            is_error: false,
        }
    }

    /// An error-flagged result.
    pub fn error(tool_call_id: &str, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.to_string(),
            content: content.into(),
            is_error: true,
        }
    }

    /// The id of the `ToolCall` this result answers.
    pub fn tool_call_id(&self) -> &str {
        &self.tool_call_id
    }

    /// The text returned to the model.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Whether the tool failed.
    pub fn is_error(&self) -> bool {
        self.is_error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_conversation_new() {
        let conversation = Conversation::new("test-session");
        assert_eq!(conversation.key, "test-session");
        assert!(conversation.is_empty());
        assert!(conversation.created_at <= conversation.updated_at);
    }

    #[test]
    fn test_conversation_helpers() {
        let mut conversation = Conversation::new("test");
        assert!(conversation.last_message().is_none());

        conversation.add_message(Message::user("Hello"));
        conversation.extend(vec![Message::assistant("Hi!"), Message::user("Thanks")]);

        assert_eq!(conversation.message_count(), 3);
        assert_eq!(conversation.last_message().unwrap().content, "Thanks");
    }

    #[test]
    fn test_message_constructors() {
        assert_eq!(Message::user("a").role, Role::User);
        assert_eq!(Message::assistant("b").role, Role::Assistant);
        assert_eq!(Message::system("c").role, Role::System);
    }

    #[test]
    fn test_tool_result_carrier_is_user_role() {
        let msg = Message::tool_results(vec![ToolResult::success("call_1", "ok")]);
        assert_eq!(msg.role, Role::User);
        assert!(msg.has_tool_results());
        assert!(!msg.has_tool_calls());
    }

    #[test]
    fn test_tool_result_accessors() {
        let ok = ToolResult::success("call_1", "done");
        assert_eq!(ok.tool_call_id(), "call_1");
        assert_eq!(ok.content(), "done");
        assert!(!ok.is_error());

        let err = ToolResult::error("call_2", "boom");
        assert!(err.is_error());
    }

    #[test]
    fn test_tool_call_parse_arguments() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct ReadArgs {
            path: String,
        }

        let call = ToolCall::new("call_1", "read_file", json!({"path": "README.md"}));
        let args: ReadArgs = call.parse_arguments().unwrap();
        assert_eq!(args.path, "README.md");
    }

    #[test]
    fn test_role_display() {
        assert_eq!(Role::System.to_string(), "system");
        assert_eq!(Role::User.to_string(), "user");
        assert_eq!(Role::Assistant.to_string(), "assistant");
    }

    #[test]
    fn test_message_serialization_skips_none() {
        let json = serde_json::to_string(&Message::user("Hello")).unwrap();
        assert!(!json.contains("tool_calls"));
        assert!(!json.contains("tool_results"));
    }

    #[test]
    fn test_tool_result_serialization_omits_false_error_flag() {
        let json = serde_json::to_string(&ToolResult::success("c", "x")).unwrap();
        assert!(!json.contains("is_error"));
        let json = serde_json::to_string(&ToolResult::error("c", "x")).unwrap();
        assert!(json.contains("\"is_error\":true"));
    }

    #[test]
    fn test_conversation_serialization() {
        let mut conversation = Conversation::new("s");
        conversation.add_message(Message::assistant_with_tools(
            "",
            vec![ToolCall::new("call_1", "echo", json!({"message": "hi"}))],
        ));
        conversation.add_message(Message::tool_results(vec![ToolResult::success(
            "call_1", "hi",
        )]));

        let json = serde_json::to_string(&conversation).unwrap();
        let parsed: Conversation = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.messages, conversation.messages);
    }
}

//! Provider types for Tether
//!
//! This module defines the dispatch contract every backend adapter
//! satisfies: the `LLMProvider` trait, chat options, and the normalized
//! stream events the tool-calling loop consumes.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{ProviderError, Result};
use crate::session::Message;

/// Definition of a tool that can be called by the LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The name of the tool (must be unique)
    pub name: String,
    /// Human-readable description of what the tool does
    pub description: String,
    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// Create a new tool definition.
    ///
    /// # Example
    /// ```
    /// use tether::providers::ToolDefinition;
    /// use serde_json::json;
    ///
    /// let tool = ToolDefinition::new(
    ///     "read_file",
    ///     "Read a file",
    ///     json!({
    ///         "type": "object",
    ///         "properties": {
    ///             "path": { "type": "string" }
    ///         },
    ///         "required": ["path"]
    ///     }),
    /// );
    /// assert_eq!(tool.name, "read_file");
    /// ```
    pub fn new(name: &str, description: &str, parameters: serde_json::Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        }
    }
}

// ============================================================================
// Streaming
// ============================================================================

/// Token accounting for one or more model calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens in the prompt
    pub input_tokens: u64,
    /// Tokens generated
    pub output_tokens: u64,
}

impl Usage {
    /// Create a usage record.
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    /// Add another record into this one.
    pub fn add(&mut self, other: Usage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
    }

    /// Input plus output tokens.
    pub fn total(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// Why the model stopped generating, normalized across dialects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The model finished its turn
    EndTurn,
    /// The model wants tool results before continuing
    ToolUse,
    /// Output hit the token limit
    MaxTokens,
    /// A caller-supplied stop sequence matched
    StopSequence,
    /// A stop string this crate does not know
    Other(String),
}

impl StopReason {
    /// Whether the model considers its turn complete.
    pub fn is_natural_end(&self) -> bool {
        matches!(self, StopReason::EndTurn | StopReason::StopSequence)
    }

    /// Map an Anthropic `stop_reason` string.
    pub fn from_anthropic(reason: &str) -> Self {
        match reason {
            "end_turn" => StopReason::EndTurn,
            "tool_use" => StopReason::ToolUse,
            "max_tokens" => StopReason::MaxTokens,
            "stop_sequence" => StopReason::StopSequence,
            other => StopReason::Other(other.to_string()),
        }
    }

    /// Map an OpenAI `finish_reason` string.
    pub fn from_openai(reason: &str) -> Self {
        match reason {
            "stop" => StopReason::EndTurn,
            "tool_calls" | "function_call" => StopReason::ToolUse,
            "length" => StopReason::MaxTokens,
            other => StopReason::Other(other.to_string()),
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::EndTurn => f.write_str("end_turn"),
            StopReason::ToolUse => f.write_str("tool_use"),
            StopReason::MaxTokens => f.write_str("max_tokens"),
            StopReason::StopSequence => f.write_str("stop_sequence"),
            StopReason::Other(s) => f.write_str(s),
        }
    }
}

/// One normalized event from a streaming model call.
///
/// Adapters emit these in arrival order; the channel closing without a
/// `Done` or `Error` means the stream was cut short.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A chunk of assistant text
    TextDelta(String),
    /// A fragment of a tool call. `id` and `name` usually arrive only on the
    /// first fragment for an index; `arguments` is a raw JSON text fragment.
    ToolCallDelta {
        index: usize,
        id: Option<String>,
        name: Option<String>,
        arguments: String,
    },
    /// Token usage reported by the backend; may arrive more than once
    Usage(Usage),
    /// The model call finished
    Done { stop_reason: Option<StopReason> },
    /// The backend failed mid-stream
    Error(ProviderError),
}

/// Receiving end of a streaming model call.
pub type EventStream = mpsc::Receiver<StreamEvent>;

// ============================================================================
// Provider Trait
// ============================================================================

/// Trait for LLM providers (OpenAI, Anthropic, etc.).
///
/// Implement this trait to add support for a new backend. The provider is
/// responsible for translating between Tether's message format and the
/// backend's wire format, and for decoding the backend's stream into
/// [`StreamEvent`]s.
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Start a streaming chat completion.
    ///
    /// Failures before the stream starts (connection, HTTP status) are
    /// returned as `Err`; failures after are sent as [`StreamEvent::Error`].
    async fn chat_stream(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
        model: Option<&str>,
        options: ChatOptions,
    ) -> Result<EventStream>;

    /// Get the default model for this provider.
    fn default_model(&self) -> &str;

    /// Get the provider name (e.g., "claude", "openai").
    fn name(&self) -> &str;
}

/// Options for chat completion requests.
///
/// Use the builder pattern to construct options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatOptions {
    /// Maximum number of tokens to generate
    pub max_tokens: Option<u32>,
    /// Temperature for sampling (0.0 = deterministic)
    pub temperature: Option<f32>,
    /// Nucleus sampling parameter
    pub top_p: Option<f32>,
    /// Stop sequences that halt generation
    pub stop: Option<Vec<String>>,
}

impl ChatOptions {
    /// Create new default chat options.
    ///
    /// # Example
    /// ```
    /// use tether::providers::ChatOptions;
    ///
    /// let options = ChatOptions::new().with_max_tokens(1000).with_temperature(0.7);
    /// assert_eq!(options.max_tokens, Some(1000));
    /// assert_eq!(options.temperature, Some(0.7));
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of tokens to generate.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the temperature for sampling.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the top_p (nucleus sampling) parameter.
    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    /// Set stop sequences that will halt generation.
    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = Some(stop);
        self
    }
}

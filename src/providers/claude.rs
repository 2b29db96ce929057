//! Claude (Anthropic) LLM provider implementation
//!
//! This module implements the `LLMProvider` trait for Anthropic's Messages
//! API, handling message conversion, tool calls, and SSE stream decoding.
//!
//! # Example
//!
//! ```rust,ignore
//! use tether::providers::{claude::ClaudeProvider, ChatOptions, LLMProvider, StreamEvent};
//! use tether::session::Message;
//!
//! async fn example() {
//!     let provider = ClaudeProvider::new("your-api-key");
//!     let messages = vec![Message::user("Hello!")];
//!
//!     let mut events = provider
//!         .chat_stream(messages, vec![], None, ChatOptions::default())
//!         .await
//!         .unwrap();
//!     while let Some(event) = events.recv().await {
//!         if let StreamEvent::TextDelta(text) = event {
//!             print!("{}", text);
//!         }
//!     }
//! }
//! ```

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::session::{Message, Role};

use super::sse::{spawn_sse_pump, SseDecoder};
use super::{
    classify_error_message, parse_provider_error, ChatOptions, EventStream, LLMProvider,
    StopReason, StreamEvent, ToolDefinition, Usage,
};

/// The Claude API base URL.
const CLAUDE_API_BASE: &str = "https://api.anthropic.com";

/// The default Claude model to use.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";

/// The Anthropic API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Claude/Anthropic LLM provider.
pub struct ClaudeProvider {
    /// API key for authentication
    api_key: String,
    /// API base URL, without the `/v1/messages` suffix
    api_base: String,
    /// Model used when the caller passes none
    default_model: String,
    /// HTTP client for making requests
    client: Client,
}

impl ClaudeProvider {
    /// Create a new Claude provider with the given API key.
    ///
    /// # Example
    /// ```
    /// use tether::providers::claude::ClaudeProvider;
    /// use tether::providers::LLMProvider;
    ///
    /// let provider = ClaudeProvider::new("sk-ant-api03-xxx");
    /// assert_eq!(provider.name(), "anthropic");
    /// ```
    pub fn new(api_key: &str) -> Self {
        Self::with_client(
            api_key,
            Client::builder()
                .connect_timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| Client::new()),
        )
    }

    /// Create a new Claude provider with a custom HTTP client.
    pub fn with_client(api_key: &str, client: Client) -> Self {
        Self {
            api_key: api_key.to_string(),
            api_base: CLAUDE_API_BASE.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            client,
        }
    }

    /// Point the provider at a different base URL (proxies, gateways).
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    /// Change the model used when the caller passes none.
    pub fn with_default_model(mut self, model: &str) -> Self {
        self.default_model = model.to_string();
        self
    }
}

#[async_trait]
impl LLMProvider for ClaudeProvider {
    async fn chat_stream(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
        model: Option<&str>,
        options: ChatOptions,
    ) -> Result<EventStream> {
        let model = model.unwrap_or(&self.default_model);
        let request = build_request(model, messages, tools, options);
        let url = format!("{}/v1/messages", self.api_base);

        debug!(model, url = %url, "Starting Claude stream");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response.text().await.unwrap_or_default();
            let body = match serde_json::from_str::<ClaudeErrorResponse>(&error_text) {
                Ok(error_response) => format!(
                    "Claude API error: {} - {}",
                    error_response.error.r#type, error_response.error.message
                ),
                Err(_) => format!("Claude API error: {}", error_text),
            };
            return Err(parse_provider_error(status, &body).into());
        }

        Ok(spawn_sse_pump(
            response.bytes_stream(),
            ClaudeStreamDecoder::default(),
        ))
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

// ============================================================================
// Claude API Request Types
// ============================================================================

/// Claude API request body.
#[derive(Debug, Serialize)]
struct ClaudeRequest {
    model: String,
    max_tokens: u32,
    /// Conversation messages (excluding system)
    messages: Vec<ClaudeMessage>,
    /// System prompt (separate from messages in Claude API)
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ClaudeTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
    stream: bool,
}

/// A message in Claude's format.
#[derive(Debug, Clone, Serialize)]
struct ClaudeMessage {
    /// Role: "user" or "assistant"
    role: &'static str,
    content: ClaudeContent,
}

/// Claude message content - can be simple text or content blocks.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
enum ClaudeContent {
    Text(String),
    Blocks(Vec<ClaudeContentBlock>),
}

/// A content block within a message.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
enum ClaudeContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    /// Tool use (assistant requesting to call a tool)
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    /// Tool result (user providing result of tool execution)
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

/// Claude tool definition.
#[derive(Debug, Serialize)]
struct ClaudeTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

/// Claude API error response.
#[derive(Debug, Deserialize)]
struct ClaudeErrorResponse {
    error: ClaudeError,
}

/// Claude API error details.
#[derive(Debug, Deserialize)]
struct ClaudeError {
    r#type: String,
    message: String,
}

// ============================================================================
// Claude SSE Streaming Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct SseEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    index: Option<usize>,
    #[serde(default)]
    delta: Option<SseDelta>,
    #[serde(default)]
    content_block: Option<SseContentBlock>,
    #[serde(default)]
    usage: Option<SseUsage>,
    #[serde(default)]
    message: Option<SseMessage>,
    #[serde(default)]
    error: Option<ClaudeError>,
}

#[derive(Debug, Deserialize)]
struct SseDelta {
    #[serde(rename = "type")]
    #[serde(default)]
    delta_type: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    partial_json: Option<String>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SseContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SseUsage {
    #[serde(default)]
    input_tokens: Option<u64>,
    #[serde(default)]
    output_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SseMessage {
    #[serde(default)]
    usage: Option<SseUsage>,
}

// ============================================================================
// Conversion Functions
// ============================================================================

fn build_request(
    model: &str,
    messages: Vec<Message>,
    tools: Vec<ToolDefinition>,
    options: ChatOptions,
) -> ClaudeRequest {
    let (system, messages) = convert_messages(messages);
    ClaudeRequest {
        model: model.to_string(),
        max_tokens: options.max_tokens.unwrap_or(8192),
        messages,
        system,
        tools: if tools.is_empty() {
            None
        } else {
            Some(convert_tools(tools))
        },
        temperature: options.temperature,
        top_p: options.top_p,
        stop_sequences: options.stop,
        stream: true,
    }
}

/// Convert Tether messages to Claude API format.
///
/// System messages are joined into the separate `system` field. Tool results
/// ride in a user message as `tool_result` blocks.
fn convert_messages(messages: Vec<Message>) -> (Option<String>, Vec<ClaudeMessage>) {
    let mut system_parts: Vec<String> = Vec::new();
    let mut claude_messages: Vec<ClaudeMessage> = Vec::new();

    for msg in messages {
        match msg.role {
            Role::System => system_parts.push(msg.content),
            Role::User => {
                let Some(results) = msg.tool_results else {
                    claude_messages.push(ClaudeMessage {
                        role: "user",
                        content: ClaudeContent::Text(msg.content),
                    });
                    continue;
                };

                let mut blocks: Vec<ClaudeContentBlock> = results
                    .into_iter()
                    .map(|r| ClaudeContentBlock::ToolResult {
                        tool_use_id: r.tool_call_id().to_string(),
                        content: r.content().to_string(),
                        is_error: r.is_error().then_some(true),
                    })
                    .collect();
                if !msg.content.is_empty() {
                    blocks.push(ClaudeContentBlock::Text { text: msg.content });
                }
                claude_messages.push(ClaudeMessage {
                    role: "user",
                    content: ClaudeContent::Blocks(blocks),
                });
            }
            Role::Assistant => {
                let Some(calls) = msg.tool_calls.filter(|c| !c.is_empty()) else {
                    // The Messages API rejects empty assistant turns.
                    if msg.content.is_empty() {
                        continue;
                    }
                    claude_messages.push(ClaudeMessage {
                        role: "assistant",
                        content: ClaudeContent::Text(msg.content),
                    });
                    continue;
                };

                let mut blocks: Vec<ClaudeContentBlock> = Vec::new();
                if !msg.content.is_empty() {
                    blocks.push(ClaudeContentBlock::Text { text: msg.content });
                }
                blocks.extend(calls.into_iter().map(|tc| ClaudeContentBlock::ToolUse {
                    id: tc.id,
                    name: tc.name,
                    input: tc.arguments,
                }));
                claude_messages.push(ClaudeMessage {
                    role: "assistant",
                    content: ClaudeContent::Blocks(blocks),
                });
            }
        }
    }

    let system = if system_parts.is_empty() {
        None
    } else {
        Some(system_parts.join("\n\n"))
    };
    (system, claude_messages)
}

/// Convert Tether tool definitions to Claude API format.
fn convert_tools(tools: Vec<ToolDefinition>) -> Vec<ClaudeTool> {
    tools
        .into_iter()
        .map(|t| ClaudeTool {
            name: t.name,
            description: t.description,
            input_schema: t.parameters,
        })
        .collect()
}

// ============================================================================
// Stream Decoding
// ============================================================================

/// Decodes Anthropic Messages SSE payloads.
///
/// Content block indices are passed through as tool-call indices; text
/// blocks never produce tool-call fragments, so gaps are harmless.
#[derive(Debug, Default)]
pub(crate) struct ClaudeStreamDecoder {
    stop_reason: Option<StopReason>,
    done: bool,
}

impl SseDecoder for ClaudeStreamDecoder {
    fn decode(&mut self, data: &str) -> Vec<StreamEvent> {
        if self.done {
            return Vec::new();
        }
        let event: SseEvent = match serde_json::from_str(data) {
            Ok(event) => event,
            Err(e) => {
                debug!(error = %e, "Skipping unparseable Claude SSE payload");
                return Vec::new();
            }
        };

        match event.event_type.as_str() {
            "message_start" => {
                // Output tokens are reported cumulatively by message_delta.
                let input = event
                    .message
                    .and_then(|m| m.usage)
                    .and_then(|u| u.input_tokens)
                    .unwrap_or(0);
                vec![StreamEvent::Usage(Usage::new(input, 0))]
            }
            "content_block_start" => match event.content_block {
                Some(block) if block.block_type == "tool_use" => {
                    vec![StreamEvent::ToolCallDelta {
                        index: event.index.unwrap_or(0),
                        id: block.id,
                        name: block.name,
                        arguments: String::new(),
                    }]
                }
                _ => Vec::new(),
            },
            "content_block_delta" => {
                let Some(delta) = event.delta else {
                    return Vec::new();
                };
                match delta.delta_type.as_deref() {
                    Some("text_delta") => delta
                        .text
                        .filter(|t| !t.is_empty())
                        .map(|t| vec![StreamEvent::TextDelta(t)])
                        .unwrap_or_default(),
                    Some("input_json_delta") => delta
                        .partial_json
                        .map(|json| {
                            vec![StreamEvent::ToolCallDelta {
                                index: event.index.unwrap_or(0),
                                id: None,
                                name: None,
                                arguments: json,
                            }]
                        })
                        .unwrap_or_default(),
                    _ => Vec::new(),
                }
            }
            "message_delta" => {
                if let Some(reason) = event.delta.and_then(|d| d.stop_reason) {
                    self.stop_reason = Some(StopReason::from_anthropic(&reason));
                }
                event
                    .usage
                    .and_then(|u| u.output_tokens)
                    .map(|output| vec![StreamEvent::Usage(Usage::new(0, output))])
                    .unwrap_or_default()
            }
            "message_stop" => {
                self.done = true;
                vec![StreamEvent::Done {
                    stop_reason: self.stop_reason.take(),
                }]
            }
            "error" => {
                self.done = true;
                let text = match event.error {
                    Some(err) => format!("Claude API error: {} - {}", err.r#type, err.message),
                    None => format!("Claude API error: {}", data),
                };
                vec![StreamEvent::Error(classify_error_message(&text))]
            }
            _ => Vec::new(),
        }
    }

    fn finish(&mut self) -> Vec<StreamEvent> {
        if self.done {
            return Vec::new();
        }
        // Some proxies drop message_stop; a seen stop reason still marks completion.
        match self.stop_reason.take() {
            Some(reason) => {
                self.done = true;
                vec![StreamEvent::Done {
                    stop_reason: Some(reason),
                }]
            }
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::session::{ToolCall, ToolResult};
    use serde_json::json;

    fn decode_all(payloads: &[&str]) -> Vec<StreamEvent> {
        let mut decoder = ClaudeStreamDecoder::default();
        let mut events: Vec<StreamEvent> =
            payloads.iter().flat_map(|p| decoder.decode(p)).collect();
        events.extend(decoder.finish());
        events
    }

    #[test]
    fn test_provider_defaults() {
        let provider = ClaudeProvider::new("key");
        assert_eq!(provider.name(), "anthropic");
        assert_eq!(provider.default_model(), DEFAULT_MODEL);
        let provider = provider.with_default_model("claude-haiku").with_api_base("http://x/");
        assert_eq!(provider.default_model(), "claude-haiku");
        assert_eq!(provider.api_base, "http://x");
    }

    #[test]
    fn test_convert_messages_system_and_tools() {
        let messages = vec![
            Message::system("Be brief."),
            Message::user("list files"),
            Message::assistant_with_tools(
                "Looking",
                vec![ToolCall::new("toolu_1", "list_dir", json!({"path": "."}))],
            ),
            Message::tool_results(vec![ToolResult::error("toolu_1", "denied")]),
        ];
        let (system, converted) = convert_messages(messages);
        assert_eq!(system.as_deref(), Some("Be brief."));
        assert_eq!(converted.len(), 3);

        let value = serde_json::to_value(&converted).unwrap();
        assert_eq!(value[0], json!({"role": "user", "content": "list files"}));
        assert_eq!(value[1]["content"][0], json!({"type": "text", "text": "Looking"}));
        assert_eq!(
            value[1]["content"][1],
            json!({"type": "tool_use", "id": "toolu_1", "name": "list_dir", "input": {"path": "."}})
        );
        assert_eq!(
            value[2]["content"][0],
            json!({"type": "tool_result", "tool_use_id": "toolu_1", "content": "denied", "is_error": true})
        );
    }

    #[test]
    fn test_convert_messages_skips_empty_assistant_text() {
        let messages = vec![
            Message::user("first"),
            Message::assistant(""),
            Message::user("second"),
        ];
        let (_, converted) = convert_messages(messages);
        let value = serde_json::to_value(&converted).unwrap();
        assert_eq!(
            value,
            json!([
                {"role": "user", "content": "first"},
                {"role": "user", "content": "second"}
            ])
        );
    }

    #[test]
    fn test_successful_tool_result_omits_is_error() {
        let (_, converted) =
            convert_messages(vec![Message::tool_results(vec![ToolResult::success("t", "ok")])]);
        let value = serde_json::to_value(&converted).unwrap();
        assert!(value[0]["content"][0].get("is_error").is_none());
    }

    #[test]
    fn test_build_request_shape() {
        let tools = vec![ToolDefinition::new("echo", "Echo", json!({"type": "object"}))];
        let request = build_request(
            "claude-x",
            vec![Message::user("hi")],
            tools,
            ChatOptions::new().with_max_tokens(100),
        );
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["model"], "claude-x");
        assert_eq!(value["max_tokens"], 100);
        assert_eq!(value["stream"], true);
        assert_eq!(value["tools"][0]["input_schema"], json!({"type": "object"}));
        assert!(value.get("system").is_none());
        assert!(value.get("temperature").is_none());
    }

    #[test]
    fn test_decode_text_stream() {
        let events = decode_all(&[
            r#"{"type":"message_start","message":{"usage":{"input_tokens":12,"output_tokens":1}}}"#,
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hel"}}"#,
            r#"{"type":"ping"}"#,
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"lo"}}"#,
            r#"{"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":5}}"#,
            r#"{"type":"message_stop"}"#,
        ]);
        assert_eq!(
            events,
            vec![
                StreamEvent::Usage(Usage::new(12, 0)),
                StreamEvent::TextDelta("Hel".into()),
                StreamEvent::TextDelta("lo".into()),
                StreamEvent::Usage(Usage::new(0, 5)),
                StreamEvent::Done {
                    stop_reason: Some(StopReason::EndTurn)
                },
            ]
        );
    }

    #[test]
    fn test_decode_tool_use_stream() {
        let events = decode_all(&[
            r#"{"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"toolu_9","name":"read_file","input":{}}}"#,
            r#"{"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{\"path\":"}}"#,
            r#"{"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"\"a.txt\"}"}}"#,
            r#"{"type":"message_delta","delta":{"stop_reason":"tool_use"}}"#,
            r#"{"type":"message_stop"}"#,
        ]);
        assert_eq!(
            events[0],
            StreamEvent::ToolCallDelta {
                index: 1,
                id: Some("toolu_9".into()),
                name: Some("read_file".into()),
                arguments: String::new(),
            }
        );
        assert_eq!(
            events[2],
            StreamEvent::ToolCallDelta {
                index: 1,
                id: None,
                name: None,
                arguments: "\"a.txt\"}".into(),
            }
        );
        assert_eq!(
            events.last(),
            Some(&StreamEvent::Done {
                stop_reason: Some(StopReason::ToolUse)
            })
        );
    }

    #[test]
    fn test_decode_error_event_is_classified() {
        let events = decode_all(&[
            r#"{"type":"error","error":{"type":"rate_limit_error","message":"slow down"}}"#,
            r#"{"type":"message_stop"}"#,
        ]);
        assert_eq!(events.len(), 1);
        match &events[0] {
            StreamEvent::Error(err) => assert_eq!(err.kind(), FailureKind::RateLimit),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_truncated_stream_has_no_done() {
        let events = decode_all(&[
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"par"}}"#,
        ]);
        assert_eq!(events, vec![StreamEvent::TextDelta("par".into())]);
    }
}

//! OpenAI Provider Implementation
//!
//! This module implements the `LLMProvider` trait for OpenAI's Chat
//! Completions API and any server speaking the same dialect (vLLM, Ollama,
//! OpenRouter and friends) through a custom base URL.
//!
//! # Example
//!
//! ```rust,ignore
//! use tether::providers::{openai::OpenAIProvider, ChatOptions, LLMProvider};
//! use tether::session::Message;
//!
//! async fn example() {
//!     let provider = OpenAIProvider::with_base_url("key", "http://localhost:11434/v1");
//!     let mut events = provider
//!         .chat_stream(vec![Message::user("Hello!")], vec![], Some("llama3"), ChatOptions::default())
//!         .await
//!         .unwrap();
//!     while let Some(event) = events.recv().await {
//!         println!("{:?}", event);
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

/// The OpenAI API base URL.
const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// The default OpenAI model to use.
pub const DEFAULT_MODEL: &str = "gpt-4o";

// ============================================================================
// OpenAI API Request Types
// ============================================================================

/// OpenAI API request body.
#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    /// Conversation messages (including system)
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAITool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
    stream: bool,
    stream_options: StreamOptions,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

/// A message in OpenAI's format.
#[derive(Debug, Serialize)]
struct OpenAIMessage {
    /// Role: "system", "user", "assistant", or "tool"
    role: &'static str,
    /// Message content (null for assistant messages that only call tools)
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAIToolCallRequest>>,
    /// ID of the tool call this message is responding to
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl OpenAIMessage {
    fn text(role: &'static str, content: String) -> Self {
        Self {
            role,
            content: Some(content),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

/// A tool call in a request (assistant requesting tool execution).
#[derive(Debug, Serialize)]
struct OpenAIToolCallRequest {
    id: String,
    /// Always "function"
    r#type: &'static str,
    function: OpenAIFunctionCall,
}

/// Function call details.
#[derive(Debug, Serialize)]
struct OpenAIFunctionCall {
    name: String,
    /// JSON-encoded arguments
    arguments: String,
}

/// OpenAI tool definition.
#[derive(Debug, Serialize)]
struct OpenAITool {
    r#type: &'static str,
    function: OpenAIFunctionDef,
}

/// OpenAI function definition.
#[derive(Debug, Serialize)]
struct OpenAIFunctionDef {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

// ============================================================================
// OpenAI Streaming Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<OpenAIUsage>,
    #[serde(default)]
    error: Option<OpenAIError>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCall>>,
}

#[derive(Debug, Deserialize)]
struct StreamToolCall {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamFunction>,
}

#[derive(Debug, Deserialize)]
struct StreamFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

/// OpenAI API error response.
#[derive(Debug, Deserialize)]
struct OpenAIErrorResponse {
    error: OpenAIError,
}

/// OpenAI API error details.
#[derive(Debug, Deserialize)]
struct OpenAIError {
    message: String,
    #[serde(default)]
    r#type: Option<String>,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

impl OpenAIError {
    fn describe(&self) -> String {
        let mut text = format!("OpenAI API error: {}", self.message);
        if let Some(kind) = &self.r#type {
            text.push_str(&format!(" (type: {})", kind));
        }
        if let Some(code) = &self.code {
            text.push_str(&format!(" (code: {})", code));
        }
        text
    }
}

// ============================================================================
// OpenAI Provider
// ============================================================================

/// OpenAI (and compatible) LLM provider.
pub struct OpenAIProvider {
    /// API key for authentication
    api_key: String,
    /// Base URL, e.g. `https://api.openai.com/v1`
    api_base: String,
    /// Model used when the caller passes none
    default_model: String,
    /// HTTP client for making requests
    client: Client,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider with the given API key.
    ///
    /// # Example
    /// ```
    /// use tether::providers::openai::OpenAIProvider;
    /// use tether::providers::LLMProvider;
    ///
    /// let provider = OpenAIProvider::new("sk-xxx");
    /// assert_eq!(provider.name(), "openai");
    /// assert_eq!(provider.default_model(), "gpt-4o");
    /// ```
    pub fn new(api_key: &str) -> Self {
        Self::with_base_url(api_key, OPENAI_API_URL)
    }

    /// Create a provider for an OpenAI-compatible server.
    pub fn with_base_url(api_key: &str, api_base: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            client: Client::builder()
                .connect_timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    /// Change the model used when the caller passes none.
    pub fn with_default_model(mut self, model: &str) -> Self {
        self.default_model = model.to_string();
        self
    }

    /// Base URL requests are sent to.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    async fn chat_stream(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
        model: Option<&str>,
        options: ChatOptions,
    ) -> Result<EventStream> {
        let model = model.unwrap_or(&self.default_model);
        let request = build_request(model, messages, tools, options);
        let url = format!("{}/chat/completions", self.api_base);

        debug!(model, url = %url, "Starting OpenAI stream");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response.text().await.unwrap_or_default();
            let body = match serde_json::from_str::<OpenAIErrorResponse>(&error_text) {
                Ok(error_response) => error_response.error.describe(),
                Err(_) => format!("OpenAI API error: {}", error_text),
            };
            return Err(parse_provider_error(status, &body).into());
        }

        Ok(spawn_sse_pump(
            response.bytes_stream(),
            OpenAIStreamDecoder::default(),
        ))
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn name(&self) -> &str {
        "openai"
    }
}

// ============================================================================
// Conversion Functions
// ============================================================================

fn build_request(
    model: &str,
    messages: Vec<Message>,
    tools: Vec<ToolDefinition>,
    options: ChatOptions,
) -> OpenAIRequest {
    OpenAIRequest {
        model: model.to_string(),
        messages: convert_messages(messages),
        tools: if tools.is_empty() {
            None
        } else {
            Some(convert_tools(tools))
        },
        max_tokens: options.max_tokens,
        temperature: options.temperature,
        top_p: options.top_p,
        stop: options.stop,
        stream: true,
        stream_options: StreamOptions {
            include_usage: true,
        },
    }
}

/// Convert Tether messages to OpenAI format.
///
/// A tool-result carrier expands into one `tool` message per result.
fn convert_messages(messages: Vec<Message>) -> Vec<OpenAIMessage> {
    let mut converted = Vec::with_capacity(messages.len());

    for msg in messages {
        match msg.role {
            Role::System => converted.push(OpenAIMessage::text("system", msg.content)),
            Role::User => {
                let results = msg.tool_results.unwrap_or_default();
                let carrier = !results.is_empty();
                for result in results {
                    converted.push(OpenAIMessage {
                        role: "tool",
                        content: Some(result.content().to_string()),
                        tool_calls: None,
                        tool_call_id: Some(result.tool_call_id().to_string()),
                    });
                }
                if !carrier || !msg.content.is_empty() {
                    converted.push(OpenAIMessage::text("user", msg.content));
                }
            }
            Role::Assistant => {
                let calls: Vec<OpenAIToolCallRequest> = msg
                    .tool_calls
                    .unwrap_or_default()
                    .into_iter()
                    .map(|tc| OpenAIToolCallRequest {
                        id: tc.id,
                        r#type: "function",
                        function: OpenAIFunctionCall {
                            name: tc.name,
                            arguments: tc.arguments.to_string(),
                        },
                    })
                    .collect();

                if calls.is_empty() {
                    converted.push(OpenAIMessage::text("assistant", msg.content));
                } else {
                    converted.push(OpenAIMessage {
                        role: "assistant",
                        content: (!msg.content.is_empty()).then_some(msg.content),
                        tool_calls: Some(calls),
                        tool_call_id: None,
                    });
                }
            }
        }
    }

    converted
}

/// Convert Tether tool definitions to OpenAI format.
fn convert_tools(tools: Vec<ToolDefinition>) -> Vec<OpenAITool> {
    tools
        .into_iter()
        .map(|t| OpenAITool {
            r#type: "function",
            function: OpenAIFunctionDef {
                name: t.name,
                description: t.description,
                parameters: t.parameters,
            },
        })
        .collect()
}

// ============================================================================
// Stream Decoding
// ============================================================================

/// Decodes Chat Completions SSE chunks.
#[derive(Debug, Default)]
pub(crate) struct OpenAIStreamDecoder {
    stop_reason: Option<StopReason>,
    done: bool,
}

impl SseDecoder for OpenAIStreamDecoder {
    fn decode(&mut self, data: &str) -> Vec<StreamEvent> {
        if self.done {
            return Vec::new();
        }
        if data == "[DONE]" {
            self.done = true;
            return vec![StreamEvent::Done {
                stop_reason: self.stop_reason.take(),
            }];
        }

        let chunk: StreamChunk = match serde_json::from_str(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                debug!(error = %e, "Skipping unparseable OpenAI SSE payload");
                return Vec::new();
            }
        };

        if let Some(error) = chunk.error {
            self.done = true;
            return vec![StreamEvent::Error(classify_error_message(&error.describe()))];
        }

        let mut events = Vec::new();
        for choice in chunk.choices {
            if let Some(delta) = choice.delta {
                if let Some(text) = delta.content.filter(|t| !t.is_empty()) {
                    events.push(StreamEvent::TextDelta(text));
                }
                for call in delta.tool_calls.unwrap_or_default() {
                    let (name, arguments) = match call.function {
                        Some(f) => (f.name, f.arguments.unwrap_or_default()),
                        None => (None, String::new()),
                    };
                    events.push(StreamEvent::ToolCallDelta {
                        index: call.index,
                        id: call.id,
                        name,
                        arguments,
                    });
                }
            }
            if let Some(reason) = choice.finish_reason {
                self.stop_reason = Some(StopReason::from_openai(&reason));
            }
        }

        if let Some(usage) = chunk.usage {
            events.push(StreamEvent::Usage(Usage::new(
                usage.prompt_tokens,
                usage.completion_tokens,
            )));
        }
        events
    }

    fn finish(&mut self) -> Vec<StreamEvent> {
        if self.done {
            return Vec::new();
        }
        // Some compatible servers never send [DONE]; a finish_reason is enough.
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
        let mut decoder = OpenAIStreamDecoder::default();
        let mut events: Vec<StreamEvent> =
            payloads.iter().flat_map(|p| decoder.decode(p)).collect();
        events.extend(decoder.finish());
        events
    }

    #[test]
    fn test_with_base_url_trims_slash() {
        let provider = OpenAIProvider::with_base_url("k", "http://localhost:8000/v1/");
        assert_eq!(provider.api_base(), "http://localhost:8000/v1");
    }

    #[test]
    fn test_convert_messages_tool_roundtrip_shape() {
        let messages = vec![
            Message::system("sys"),
            Message::user("hi"),
            Message::assistant_with_tools(
                "",
                vec![ToolCall::new("call_1", "echo", json!({"message": "x"}))],
            ),
            Message::tool_results(vec![
                ToolResult::success("call_1", "x"),
                ToolResult::error("call_2", "boom"),
            ]),
        ];
        let value = serde_json::to_value(convert_messages(messages)).unwrap();
        let arr = value.as_array().unwrap();
        assert_eq!(arr.len(), 5);
        assert_eq!(arr[0], json!({"role": "system", "content": "sys"}));
        assert_eq!(arr[2]["content"], serde_json::Value::Null);
        assert_eq!(arr[2]["tool_calls"][0]["type"], "function");
        assert_eq!(
            arr[2]["tool_calls"][0]["function"]["arguments"],
            r#"{"message":"x"}"#
        );
        assert_eq!(
            arr[3],
            json!({"role": "tool", "content": "x", "tool_call_id": "call_1"})
        );
        assert_eq!(arr[4]["tool_call_id"], "call_2");
    }

    #[test]
    fn test_build_request_requests_usage() {
        let request = build_request(
            "gpt-4o",
            vec![Message::user("hi")],
            vec![],
            ChatOptions::new(),
        );
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["stream"], true);
        assert_eq!(value["stream_options"]["include_usage"], true);
        assert!(value.get("tools").is_none());
    }

    #[test]
    fn test_decode_text_and_done() {
        let events = decode_all(&[
            r#"{"choices":[{"index":0,"delta":{"role":"assistant","content":"Hi"}}]}"#,
            r#"{"choices":[{"index":0,"delta":{"content":" there"},"finish_reason":null}]}"#,
            r#"{"choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#,
            r#"{"choices":[],"usage":{"prompt_tokens":9,"completion_tokens":2}}"#,
            "[DONE]",
        ]);
        assert_eq!(
            events,
            vec![
                StreamEvent::TextDelta("Hi".into()),
                StreamEvent::TextDelta(" there".into()),
                StreamEvent::Usage(Usage::new(9, 2)),
                StreamEvent::Done {
                    stop_reason: Some(StopReason::EndTurn)
                },
            ]
        );
    }

    #[test]
    fn test_decode_parallel_tool_call_fragments() {
        let events = decode_all(&[
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_a","type":"function","function":{"name":"echo","arguments":""}}]}}]}"#,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":1,"id":"call_b","type":"function","function":{"name":"list_dir","arguments":"{}"}}]}}]}"#,
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"message\":\"hi\"}"}}]}}]}"#,
            r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#,
            "[DONE]",
        ]);
        assert_eq!(events.len(), 4);
        assert_eq!(
            events[2],
            StreamEvent::ToolCallDelta {
                index: 0,
                id: None,
                name: None,
                arguments: "{\"message\":\"hi\"}".into(),
            }
        );
        assert_eq!(
            events[3],
            StreamEvent::Done {
                stop_reason: Some(StopReason::ToolUse)
            }
        );
    }

    #[test]
    fn test_finish_without_done_marker() {
        let events = decode_all(&[
            r#"{"choices":[{"delta":{"content":"x"},"finish_reason":"length"}]}"#,
        ]);
        assert_eq!(
            events.last(),
            Some(&StreamEvent::Done {
                stop_reason: Some(StopReason::MaxTokens)
            })
        );
    }

    #[test]
    fn test_decode_inline_error() {
        let events = decode_all(&[
            r#"{"error":{"message":"This model's maximum context length is 8192 tokens","type":"invalid_request_error","code":"context_length_exceeded"}}"#,
        ]);
        match &events[..] {
            [StreamEvent::Error(err)] => assert_eq!(err.kind(), FailureKind::ContextOverflow),
            other => panic!("unexpected events {:?}", other),
        }
    }
}

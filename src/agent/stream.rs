//! Stream accumulation for one model call.
//!
//! Text deltas are appended whole. Tool-call fragments are keyed by their
//! stream index and concatenated in arrival order; argument JSON is parsed
//! only once, in [`StreamAccumulator::finish`].

use std::collections::BTreeMap;

use serde_json::{json, Value};
use tracing::warn;

use crate::providers::{StopReason, StreamEvent, Usage};
use crate::session::ToolCall;

#[derive(Debug, Default)]
struct PartialCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// What one model call produced once its stream ended.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    /// Full assistant text
    pub text: String,
    /// Tool calls in stream-index order
    pub tool_calls: Vec<ToolCall>,
    /// Usage reported during this call
    pub usage: Usage,
    /// Stop indicator, if the backend sent one
    pub stop_reason: Option<StopReason>,
}

impl Completion {
    /// Whether the loop should stop after this call.
    pub fn is_final(&self) -> bool {
        self.tool_calls.is_empty()
            || self
                .stop_reason
                .as_ref()
                .map(StopReason::is_natural_end)
                .unwrap_or(false)
    }
}

/// Accumulates [`StreamEvent`]s for a single model call.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    text: String,
    calls: BTreeMap<usize, PartialCall>,
    usage: Usage,
    stop_reason: Option<StopReason>,
    done: bool,
}

impl StreamAccumulator {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into the accumulator.
    ///
    /// Returns the text delta, if any, so the caller can forward it without
    /// cloning the whole buffer. `Error` events are not handled here.
    pub fn push<'a>(&mut self, event: &'a StreamEvent) -> Option<&'a str> {
        match event {
            StreamEvent::TextDelta(text) => {
                self.text.push_str(text);
                return Some(text.as_str());
            }
            StreamEvent::ToolCallDelta {
                index,
                id,
                name,
                arguments,
            } => {
                let call = self.calls.entry(*index).or_default();
                if call.id.is_none() {
                    call.id = id.clone();
                }
                if call.name.is_none() {
                    call.name = name.clone();
                }
                call.arguments.push_str(arguments);
            }
            StreamEvent::Usage(usage) => self.usage.add(*usage),
            StreamEvent::Done { stop_reason } => {
                self.stop_reason = stop_reason.clone();
                self.done = true;
            }
            StreamEvent::Error(_) => {}
        }
        None
    }

    /// Whether a `Done` event has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Usage seen so far.
    pub fn usage(&self) -> Usage {
        self.usage
    }

    /// Text seen so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Finalize into a [`Completion`].
    ///
    /// Empty argument text becomes `{}`. Unparseable or non-object argument
    /// text becomes `{"_parse_error": ..., "_raw": ...}` so the tool can
    /// report the problem back to the model. Calls without a name are dropped.
    pub fn finish(self) -> Completion {
        let mut tool_calls = Vec::with_capacity(self.calls.len());

        for (index, call) in self.calls {
            let Some(name) = call.name.filter(|n| !n.is_empty()) else {
                warn!(index, "Dropping tool call fragment without a name");
                continue;
            };
            let id = call
                .id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| format!("call_{}", index));
            let arguments = parse_arguments(&call.arguments);
            tool_calls.push(ToolCall {
                id,
                name,
                arguments,
            });
        }

        Completion {
            text: self.text,
            tool_calls,
            usage: self.usage,
            stop_reason: self.stop_reason,
        }
    }
}

fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return json!({});
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => value,
        Ok(other) => json!({
            "_parse_error": format!("expected a JSON object, got {}", type_name(&other)),
            "_raw": raw,
        }),
        Err(e) => {
            warn!(error = %e, "Tool call arguments are not valid JSON");
            json!({
                "_parse_error": e.to_string(),
                "_raw": raw,
            })
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

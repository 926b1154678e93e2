use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use inteliome_core::errors::GatewayError;
use inteliome_core::ids::ToolCallId;
use inteliome_core::messages::{
    AssistantContent, AssistantMessage, StopReason, TokenUsage, ToolCallBlock,
};
use inteliome_core::stream::StreamEvent;

/// The payload OpenAI sends as the final `data:` line.
pub const DONE_MARKER: &str = "[DONE]";

/// State machine turning chat-completions chunks into [`StreamEvent`]s.
#[derive(Default)]
pub struct SseParser {
    started: bool,
    finished: bool,
    text: Option<String>,
    tools: Vec<ToolBlock>,
    finish_reason: Option<String>,
    usage: Option<TokenUsage>,
}

struct ToolBlock {
    index: usize,
    id: String,
    name: String,
    arguments_json: String,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Whether the model reported why it stopped, even if `[DONE]` never came.
    pub fn saw_finish_reason(&self) -> bool {
        self.finish_reason.is_some()
    }

    /// Parse one `data:` payload.
    pub fn parse_data(&mut self, data: &str) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }
        if data.trim() == DONE_MARKER {
            return self.finish();
        }

        let chunk: ChunkPayload = match serde_json::from_str(data) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "skipping unparseable completion chunk");
                return Vec::new();
            }
        };

        let mut events = Vec::new();

        if let Some(err) = chunk.error {
            self.finished = true;
            events.push(StreamEvent::Error {
                error: classify_error(&err),
            });
            return events;
        }

        if !self.started {
            self.started = true;
            events.push(StreamEvent::Start);
        }

        if let Some(usage) = chunk.usage {
            self.usage = Some(TokenUsage {
                input_tokens: usage.prompt_tokens.unwrap_or(0),
                output_tokens: usage.completion_tokens.unwrap_or(0),
            });
        }

        for choice in chunk.choices {
            if let Some(delta) = choice.delta {
                if let Some(content) = delta.content.filter(|c| !c.is_empty()) {
                    let text = self.text.get_or_insert_with(|| {
                        events.push(StreamEvent::TextStart);
                        String::new()
                    });
                    text.push_str(&content);
                    events.push(StreamEvent::TextDelta { delta: content });
                }
                for call in delta.tool_calls.unwrap_or_default() {
                    self.apply_tool_delta(call, &mut events);
                }
            }
            if let Some(reason) = choice.finish_reason {
                self.finish_reason = Some(reason);
            }
        }

        events
    }

    fn apply_tool_delta(&mut self, call: ToolCallDelta, events: &mut Vec<StreamEvent>) {
        let function = call.function.unwrap_or_default();
        let pos = match self.tools.iter().position(|t| t.index == call.index) {
            Some(pos) => pos,
            None => {
                let id = call.id.clone().unwrap_or_default();
                let name = function.name.clone().unwrap_or_default();
                events.push(StreamEvent::ToolCallStart {
                    tool_call_id: ToolCallId::from_raw(&id),
                    name: name.clone(),
                });
                self.tools.push(ToolBlock {
                    index: call.index,
                    id,
                    name,
                    arguments_json: String::new(),
                });
                self.tools.len() - 1
            }
        };

        let block = &mut self.tools[pos];
        if let Some(partial) = function.arguments.filter(|a| !a.is_empty()) {
            block.arguments_json.push_str(&partial);
            events.push(StreamEvent::ToolCallDelta {
                tool_call_id: ToolCallId::from_raw(&block.id),
                arguments_delta: partial,
            });
        }
    }

    /// Close open blocks and emit `Done`.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;

        let mut events = Vec::new();
        if !self.started {
            events.push(StreamEvent::Start);
        }
        if let Some(text) = &self.text {
            events.push(StreamEvent::TextEnd { text: text.clone() });
        }
        for block in &self.tools {
            events.push(StreamEvent::ToolCallEnd {
                tool_call: block.to_tool_call(),
            });
        }

        let message = self.build_assistant_message();
        let stop_reason = message
            .stop_reason
            .clone()
            .unwrap_or(StopReason::EndTurn);
        events.push(StreamEvent::Done {
            message,
            stop_reason,
        });
        events
    }

    fn build_assistant_message(&self) -> AssistantMessage {
        let mut content = Vec::new();
        if let Some(text) = &self.text {
            content.push(AssistantContent::Text { text: text.clone() });
        }
        for block in &self.tools {
            content.push(AssistantContent::ToolCall(block.to_tool_call()));
        }

        let stop_reason = match self.finish_reason.as_deref() {
            Some(reason) => StopReason::from_finish_reason(reason),
            None if !self.tools.is_empty() => StopReason::ToolUse,
            None => StopReason::EndTurn,
        };

        AssistantMessage {
            content,
            usage: self.usage.clone(),
            stop_reason: Some(stop_reason),
        }
    }
}

impl ToolBlock {
    fn to_tool_call(&self) -> ToolCallBlock {
        let arguments: Value = serde_json::from_str(&self.arguments_json)
            .unwrap_or(Value::Object(serde_json::Map::new()));
        ToolCallBlock {
            id: ToolCallId::from_raw(&self.id),
            name: self.name.clone(),
            arguments,
        }
    }
}

fn classify_error(err: &ErrorPayload) -> GatewayError {
    let message = err.message.clone().unwrap_or_default();
    match err.code.as_deref().or(err.error_type.as_deref()) {
        Some("rate_limit_exceeded") | Some("rate_limit_error") => {
            GatewayError::RateLimited { retry_after: None }
        }
        Some("invalid_api_key") | Some("authentication_error") | Some("insufficient_quota") => {
            GatewayError::AuthenticationFailed(message)
        }
        Some("invalid_request_error") => GatewayError::InvalidRequest(message),
        Some("model_not_found") => GatewayError::ModelNotFound(message),
        _ => GatewayError::ServerError {
            status: 500,
            body: message,
        },
    }
}

/// Extract `data:` payloads from a block of complete SSE events.
///
/// Multiple `data:` lines inside one event are joined with `\n`. Comments
/// and other fields are ignored.
pub fn parse_sse_data(raw: &str) -> Vec<String> {
    let mut payloads = Vec::new();
    let mut current: Option<String> = None;

    for line in raw.lines() {
        if line.is_empty() {
            if let Some(data) = current.take() {
                payloads.push(data);
            }
            continue;
        }
        let Some(rest) = line.strip_prefix("data:") else {
            continue;
        };
        let rest = rest.strip_prefix(' ').unwrap_or(rest);
        match &mut current {
            Some(data) => {
                data.push('\n');
                data.push_str(rest);
            }
            None => current = Some(rest.to_string()),
        }
    }

    if let Some(data) = current {
        payloads.push(data);
    }
    payloads
}

// --- Deserialization types for chat-completions chunks ---

#[derive(Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    choices: Vec<ChoicePayload>,
    usage: Option<UsagePayload>,
    error: Option<ErrorPayload>,
}

#[derive(Deserialize)]
struct ChoicePayload {
    delta: Option<DeltaPayload>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct DeltaPayload {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    index: usize,
    id: Option<String>,
    function: Option<FunctionDelta>,
}

#[derive(Default, Deserialize)]
struct FunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Deserialize)]
struct UsagePayload {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ErrorPayload {
    message: Option<String>,
    #[serde(rename = "type")]
    error_type: Option<String>,
    code: Option<String>,
}

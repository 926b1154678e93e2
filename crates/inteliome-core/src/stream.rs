use serde::{Deserialize, Serialize};

use crate::errors::GatewayError;
use crate::ids::ToolCallId;
use crate::messages::{AssistantMessage, StopReason, ToolCallBlock};

/// Events emitted while a completion streams. Ordering contract:
///
/// Start → (TextStart → TextDelta* → TextEnd | ToolCallStart → ToolCallDelta* → ToolCallEnd)* → Done
///
/// Error or Retry can appear at any point.
#[derive(Clone, Debug)]
pub enum StreamEvent {
    Start,

    TextStart,
    TextDelta { delta: String },
    TextEnd { text: String },

    ToolCallStart { tool_call_id: ToolCallId, name: String },
    ToolCallDelta { tool_call_id: ToolCallId, arguments_delta: String },
    ToolCallEnd { tool_call: ToolCallBlock },

    Done { message: AssistantMessage, stop_reason: StopReason },
    Error { error: GatewayError },
    Retry { attempt: u32, max_retries: u32, delay_ms: u64, error: GatewayErrorInfo },
}

/// Lightweight error info for retry events.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GatewayErrorInfo {
    pub kind: String,
    pub message: String,
}

impl From<&GatewayError> for GatewayErrorInfo {
    fn from(e: &GatewayError) -> Self {
        Self {
            kind: e.error_kind().to_string(),
            message: e.to_string(),
        }
    }
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}

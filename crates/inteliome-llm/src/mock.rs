use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use parking_lot::Mutex;

use inteliome_core::context::LlmContext;
use inteliome_core::errors::GatewayError;
use inteliome_core::ids::ToolCallId;
use inteliome_core::messages::{AssistantContent, AssistantMessage, StopReason, ToolCallBlock};
use inteliome_core::provider::{EventStream, LlmProvider, StreamOptions};
use inteliome_core::stream::StreamEvent;

/// Pre-programmed responses for deterministic testing without API calls.
pub enum MockResponse {
    /// Yield a sequence of StreamEvents.
    Stream(Vec<StreamEvent>),
    /// Return an error from the stream() call itself.
    Error(GatewayError),
    /// Wait a duration, then yield the inner response.
    Delay(Duration, Box<MockResponse>),
}

impl MockResponse {
    /// A single text block.
    pub fn stream_text(text: &str) -> Self {
        Self::Stream(vec![
            StreamEvent::Start,
            StreamEvent::TextStart,
            StreamEvent::TextDelta {
                delta: text.to_string(),
            },
            StreamEvent::TextEnd {
                text: text.to_string(),
            },
            StreamEvent::Done {
                message: AssistantMessage::text(text),
                stop_reason: StopReason::EndTurn,
            },
        ])
    }

    /// A reply split into several text blocks.
    pub fn multi_text(parts: &[&str]) -> Self {
        let message = AssistantMessage {
            content: parts
                .iter()
                .map(|p| AssistantContent::Text {
                    text: (*p).to_string(),
                })
                .collect(),
            usage: None,
            stop_reason: Some(StopReason::EndTurn),
        };
        Self::done_with(message, StopReason::EndTurn)
    }

    /// A structured tool-call reply with no text.
    pub fn tool_call(name: &str, arguments: serde_json::Value) -> Self {
        let message = AssistantMessage {
            content: vec![AssistantContent::ToolCall(ToolCallBlock {
                id: ToolCallId::new(),
                name: name.to_string(),
                arguments,
            })],
            usage: None,
            stop_reason: Some(StopReason::ToolUse),
        };
        Self::done_with(message, StopReason::ToolUse)
    }

    /// A stream that ends with an error event.
    pub fn stream_error(error: GatewayError) -> Self {
        Self::Stream(vec![StreamEvent::Start, StreamEvent::Error { error }])
    }

    pub fn delayed(delay: Duration, inner: MockResponse) -> Self {
        Self::Delay(delay, Box::new(inner))
    }

    fn done_with(message: AssistantMessage, stop_reason: StopReason) -> Self {
        Self::Stream(vec![
            StreamEvent::Start,
            StreamEvent::Done {
                message,
                stop_reason,
            },
        ])
    }
}

/// Mock provider that returns pre-programmed responses in sequence and
/// records every context it was asked to complete.
pub struct MockProvider {
    responses: Mutex<VecDeque<MockResponse>>,
    contexts: Mutex<Vec<LlmContext>>,
    call_count: AtomicUsize,
}

impl MockProvider {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            contexts: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
        }
    }

    /// Replies to text in order.
    pub fn with_texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| MockResponse::stream_text(t)).collect())
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Contexts received so far, in call order.
    pub fn contexts(&self) -> Vec<LlmContext> {
        self.contexts.lock().clone()
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().len()
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    fn context_window(&self) -> usize {
        128_000
    }

    async fn stream(
        &self,
        context: &LlmContext,
        _options: &StreamOptions,
    ) -> Result<EventStream, GatewayError> {
        let idx = self.call_count.fetch_add(1, Ordering::Relaxed);
        self.contexts.lock().push(context.clone());

        let Some(mut response) = self.responses.lock().pop_front() else {
            return Err(GatewayError::InvalidRequest(format!(
                "MockProvider: no response configured for call {idx}"
            )));
        };

        loop {
            match response {
                MockResponse::Stream(events) => return Ok(Box::pin(stream::iter(events))),
                MockResponse::Error(e) => return Err(e),
                MockResponse::Delay(duration, inner) => {
                    tokio::time::sleep(duration).await;
                    response = *inner;
                }
            }
        }
    }
}

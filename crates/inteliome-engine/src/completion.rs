//! Single-shot text completion on top of the streaming provider interface.

use futures::StreamExt;
use tracing::debug;

use inteliome_core::context::LlmContext;
use inteliome_core::messages::AssistantMessage;
use inteliome_core::provider::{LlmProvider, StreamOptions};
use inteliome_core::stream::StreamEvent;

use crate::error::EngineError;

/// Which pipeline step a model call belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelCall {
    LanguageGate,
    IntentClassifier,
    Answer,
    Summarizer,
}

impl ModelCall {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LanguageGate => "language_gate",
            Self::IntentClassifier => "intent_classifier",
            Self::Answer => "answer",
            Self::Summarizer => "summarizer",
        }
    }
}

/// Drive one completion to its `Done` event and return the final message.
pub async fn complete(
    provider: &dyn LlmProvider,
    context: &LlmContext,
    options: &StreamOptions,
) -> Result<AssistantMessage, EngineError> {
    let mut stream = provider.stream(context, options).await?;

    let mut message = None;
    while let Some(event) = stream.next().await {
        match event {
            StreamEvent::Done { message: m, .. } => {
                message = Some(m);
            }
            StreamEvent::Error { error } => {
                return Err(EngineError::Gateway(error));
            }
            StreamEvent::Retry {
                attempt,
                max_retries,
                delay_ms,
                ..
            } => {
                debug!(attempt, max_retries, delay_ms, "provider retrying");
            }
            _ => {}
        }
    }

    message.ok_or_else(|| EngineError::Internal("Stream ended without Done event".into()))
}

/// Like [`complete`], but the reply must be exactly one text block.
pub async fn complete_text(
    provider: &dyn LlmProvider,
    context: &LlmContext,
    options: &StreamOptions,
    call: ModelCall,
) -> Result<String, EngineError> {
    let message = complete(provider, context, options).await?;
    match message.single_text() {
        Some(text) => {
            debug!(call = call.as_str(), chars = text.len(), "completion");
            Ok(text.to_string())
        }
        None => Err(EngineError::ContractViolation {
            call: call.as_str(),
            shape: message.shape(),
        }),
    }
}

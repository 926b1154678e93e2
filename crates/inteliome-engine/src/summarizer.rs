//! Rolling one-line summary of a conversation, optionally pruning the
//! transcript down to its last two turns.

use tracing::{debug, instrument};

use inteliome_core::context::LlmContext;
use inteliome_core::messages::ChatMessage;
use inteliome_core::provider::{LlmProvider, StreamOptions};
use inteliome_core::state::ConversationState;

use crate::completion::{complete_text, ModelCall};
use crate::error::EngineError;

pub const FRESH_SUMMARY_INSTRUCTION: &str =
    "Create a one liner summary to summarize the conversation above:";

/// Turns kept after pruning.
pub const RETAINED_TURNS: usize = 2;

pub fn summary_instruction(existing: &str) -> String {
    if existing.is_empty() {
        FRESH_SUMMARY_INSTRUCTION.to_string()
    } else {
        format!(
            "This is summary of the conversation to date: {existing}\n\n\
             Extend the summary by taking into account the new messages above, but keep the summary one line"
        )
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Summarizer {
    prune: bool,
}

impl Summarizer {
    pub fn new(prune: bool) -> Self {
        Self { prune }
    }

    /// Replace `state.running_summary` with a fresh model-written summary.
    ///
    /// `state` is only touched once the model has replied with text.
    #[instrument(skip_all, fields(turns = state.transcript.len()))]
    pub async fn summarize(
        &self,
        provider: &dyn LlmProvider,
        options: &StreamOptions,
        state: &mut ConversationState,
    ) -> Result<(), EngineError> {
        let mut messages = state.chat_messages();
        messages.push(ChatMessage::user(summary_instruction(&state.running_summary)));
        let context = LlmContext {
            messages,
            system_blocks: Vec::new(),
        };

        let summary = complete_text(provider, &context, options, ModelCall::Summarizer).await?;

        state.running_summary = summary;
        if self.prune {
            let excess = state.transcript.len().saturating_sub(RETAINED_TURNS);
            let _ = state.transcript.drain(..excess);
        }
        debug!(kept = state.transcript.len(), "summarized");
        Ok(())
    }
}

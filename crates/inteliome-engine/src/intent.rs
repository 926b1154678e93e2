use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use inteliome_core::context::{LlmContext, SystemBlock, SystemBlockLabel};
use inteliome_core::messages::{ChatMessage, Turn};
use inteliome_core::provider::{LlmProvider, StreamOptions};

use crate::completion::{complete_text, ModelCall};
use crate::error::EngineError;
use crate::gate::normalize_reply;
use crate::template;

const INTENT_PROMPT: &str = include_str!("../prompts/intent.txt");

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Conversational,
    Metadata,
    NeedClarification,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Conversational => "conversational",
            Self::Metadata => "metadata",
            Self::NeedClarification => "need_clarification",
        }
    }

    pub fn all() -> [Category; 3] {
        [Self::Conversational, Self::Metadata, Self::NeedClarification]
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exact vocabulary match after normalization.
pub fn try_parse_category(reply: &str) -> Option<Category> {
    match normalize_reply(reply).as_str() {
        "conversational" => Some(Category::Conversational),
        "metadata" => Some(Category::Metadata),
        "need_clarification" | "needclarification" => Some(Category::NeedClarification),
        _ => None,
    }
}

/// Anything outside the vocabulary falls back to asking the user.
pub fn parse_category(reply: &str) -> Category {
    try_parse_category(reply).unwrap_or_else(|| {
        warn!(reply, "unrecognized intent category, defaulting to need_clarification");
        Category::NeedClarification
    })
}

pub fn classifier_instruction(catalog: &str, input: &str) -> String {
    template::fill(INTENT_PROMPT, &[("catalog", catalog), ("input", input)])
}

/// Classify `input`. `transcript` already ends with the user turn for it.
#[instrument(skip_all)]
pub async fn classify_intent(
    provider: &dyn LlmProvider,
    options: &StreamOptions,
    catalog: &str,
    input: &str,
    transcript: &[Turn],
) -> Result<Category, EngineError> {
    let context = LlmContext {
        messages: transcript.iter().map(ChatMessage::from).collect(),
        system_blocks: vec![SystemBlock::new(
            SystemBlockLabel::Instruction,
            classifier_instruction(catalog, input),
        )],
    };

    let reply = complete_text(provider, &context, options, ModelCall::IntentClassifier).await?;
    let category = parse_category(&reply);
    debug!(%category, "intent");
    Ok(category)
}

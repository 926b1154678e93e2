//! Language gate: one constrained model call deciding whether the newest
//! user input is English.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use inteliome_core::context::{LlmContext, SystemBlock, SystemBlockLabel};
use inteliome_core::messages::Turn;
use inteliome_core::provider::{LlmProvider, StreamOptions};

use crate::completion::{complete_text, ModelCall};
use crate::error::EngineError;
use crate::template;

/// Fixed assistant reply for rejected input.
pub const REFUSAL_SENTINEL: &str =
    "System accepts only English queries and it cannot be changed yet.";

const GATE_PROMPT: &str = include_str!("../prompts/language_gate.txt");

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageVerdict {
    English,
    Gibberish,
}

/// The newest assistant turn that is not a refusal. Earlier refusals must not
/// become the context for judging the next input.
pub fn find_last_non_sentinel_assistant_turn(transcript: &[Turn]) -> Option<&Turn> {
    transcript
        .iter()
        .rev()
        .find(|t| t.is_assistant() && t.content != REFUSAL_SENTINEL)
}

/// Gate instruction with input and context lowercased.
pub fn gate_instruction(input: &str, context: &str) -> String {
    let input = input.to_lowercase();
    let context = context.to_lowercase();
    template::fill(GATE_PROMPT, &[("context", &context), ("input", &input)])
}

/// Reduce a short label reply to `snake_case` words, dropping quotes,
/// markdown emphasis and trailing punctuation.
pub(crate) fn normalize_reply(reply: &str) -> String {
    reply
        .trim_matches(|c: char| {
            c.is_whitespace() || matches!(c, '"' | '\'' | '`' | '*' | '.' | ',' | '!' | ';' | ':')
        })
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

pub fn parse_language_verdict(reply: &str) -> Result<LanguageVerdict, EngineError> {
    match normalize_reply(reply).as_str() {
        "english" => Ok(LanguageVerdict::English),
        "gibberish" => Ok(LanguageVerdict::Gibberish),
        _ => Err(EngineError::UnrecognizedLanguageVerdict(reply.to_string())),
    }
}

/// Judge `input` against the transcript that precedes it.
#[instrument(skip_all)]
pub async fn check_language(
    provider: &dyn LlmProvider,
    options: &StreamOptions,
    input: &str,
    history: &[Turn],
) -> Result<LanguageVerdict, EngineError> {
    let context = find_last_non_sentinel_assistant_turn(history)
        .map(|t| t.content.as_str())
        .unwrap_or_default();

    let llm_context = LlmContext {
        messages: Vec::new(),
        system_blocks: vec![SystemBlock::new(
            SystemBlockLabel::Instruction,
            gate_instruction(input, context),
        )],
    };

    let reply = complete_text(provider, &llm_context, options, ModelCall::LanguageGate).await?;
    let verdict = parse_language_verdict(&reply)?;
    debug!(?verdict, "language gate");
    Ok(verdict)
}

//! Answer prompt assembly. Pure string work; never calls the model.

use inteliome_core::context::{LlmContext, SystemBlock, SystemBlockLabel, SYSTEM_BLOCK_SEPARATOR};
use inteliome_core::messages::ChatMessage;
use inteliome_store::FactValue;

use crate::intent::Category;
use crate::template;

const RULES: &str = include_str!("../prompts/rules.txt");
const RULES_METADATA: &str = include_str!("../prompts/rules_metadata.txt");
const RULES_CONVERSATIONAL: &str = include_str!("../prompts/rules_conversational.txt");
const RULES_NEED_CLARIFICATION: &str = include_str!("../prompts/rules_need_clarification.txt");
const CLOSING: &str = include_str!("../prompts/closing.txt");

/// Ordered system blocks for the answer call: catalog, recalled facts,
/// running summary, behavior rules.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComposedPrompt {
    blocks: Vec<SystemBlock>,
}

impl ComposedPrompt {
    pub fn compose(catalog: &str, facts: &[FactValue], summary: &str, category: Category) -> Self {
        let recalled = facts
            .iter()
            .map(|f| f.data.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        let blocks = vec![
            SystemBlock::new(
                SystemBlockLabel::Catalog,
                format!(
                    "You are a helpful assistant with access to the following database schema and metadata:\n{catalog}"
                ),
            ),
            SystemBlock::new(
                SystemBlockLabel::RecalledFacts,
                format!("User queries so far:\n{recalled}"),
            ),
            SystemBlock::new(SystemBlockLabel::RunningSummary, format!("Summary: {summary}")),
            SystemBlock::new(SystemBlockLabel::BehaviorRules, behavior_rules(category)),
        ];
        Self { blocks }
    }

    pub fn blocks(&self) -> &[SystemBlock] {
        &self.blocks
    }

    /// The exact system message text a provider sends.
    pub fn render(&self) -> String {
        self.blocks
            .iter()
            .map(|b| b.content.as_str())
            .collect::<Vec<_>>()
            .join(SYSTEM_BLOCK_SEPARATOR)
    }

    pub fn into_context(self, messages: Vec<ChatMessage>) -> LlmContext {
        LlmContext {
            messages,
            system_blocks: self.blocks,
        }
    }
}

/// Static rules text; the category is the only parameter.
pub fn behavior_rules(category: Category) -> String {
    let specific = match category {
        Category::Metadata => RULES_METADATA,
        Category::Conversational => RULES_CONVERSATIONAL,
        Category::NeedClarification => RULES_NEED_CLARIFICATION,
    };
    let header = template::fill(RULES, &[("category", category.as_str())]);
    format!("{}\n\n{}\n\n{}", header.trim_end(), specific.trim_end(), CLOSING.trim_end())
}

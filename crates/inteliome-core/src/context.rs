use serde::{Deserialize, Serialize};

use crate::messages::ChatMessage;

/// Everything sent to a provider for one completion.
#[derive(Clone, Debug, Default)]
pub struct LlmContext {
    pub messages: Vec<ChatMessage>,
    pub system_blocks: Vec<SystemBlock>,
}

impl LlmContext {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The system blocks joined into the single system-role message that is
    /// prepended ahead of the transcript. `None` when there are no blocks.
    pub fn system_prompt(&self) -> Option<String> {
        if self.system_blocks.is_empty() {
            return None;
        }
        Some(
            self.system_blocks
                .iter()
                .map(|b| b.content.as_str())
                .collect::<Vec<_>>()
                .join(SYSTEM_BLOCK_SEPARATOR),
        )
    }

    pub fn block(&self, label: &SystemBlockLabel) -> Option<&SystemBlock> {
        self.system_blocks.iter().find(|b| &b.label == label)
    }
}

pub const SYSTEM_BLOCK_SEPARATOR: &str = "\n\n";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SystemBlock {
    pub content: String,
    pub label: SystemBlockLabel,
}

impl SystemBlock {
    pub fn new(label: SystemBlockLabel, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            label,
        }
    }
}

/// Labels for what a system block carries (debugging, test assertions).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SystemBlockLabel {
    Catalog,
    RecalledFacts,
    RunningSummary,
    BehaviorRules,
    Instruction,
}

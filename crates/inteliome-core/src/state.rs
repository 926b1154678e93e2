use serde::{Deserialize, Serialize};

use crate::ids::{ThreadId, UserId};
use crate::messages::{ChatMessage, Turn};

/// Everything carried between turns of one conversation thread.
///
/// `transcript` only grows during a turn; the summarizer is the one place
/// allowed to drop older turns. `running_summary` is replaced wholesale.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationState {
    pub thread_id: ThreadId,
    pub user_id: UserId,
    #[serde(default)]
    pub transcript: Vec<Turn>,
    #[serde(default)]
    pub running_summary: String,
}

impl ConversationState {
    pub fn new(thread_id: ThreadId, user_id: UserId) -> Self {
        Self {
            thread_id,
            user_id,
            transcript: Vec::new(),
            running_summary: String::new(),
        }
    }

    pub fn last_turn(&self) -> Option<&Turn> {
        self.transcript.last()
    }

    /// The transcript as model messages, oldest first.
    pub fn chat_messages(&self) -> Vec<ChatMessage> {
        self.transcript.iter().map(ChatMessage::from).collect()
    }

    pub fn has_summary(&self) -> bool {
        !self.running_summary.is_empty()
    }
}

use serde::{Deserialize, Serialize};

/// Turn pipeline behavior.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConversationSettings {
    /// Prefix printed before every assistant reply.
    pub assistant_name: String,
    /// Summarize once the transcript holds more turns than this.
    pub summarize_after_turns: usize,
    /// Drop all but the last two turns after summarizing.
    pub prune_transcript: bool,
    /// Case-insensitive phrases that end the session.
    pub closing_phrases: Vec<String>,
    /// Printed when the session ends on a closing phrase.
    pub farewell: String,
    /// User identity used when none is given on the command line.
    pub default_user_id: String,
}

impl Default for ConversationSettings {
    fn default() -> Self {
        Self {
            assistant_name: "Inteliome".into(),
            summarize_after_turns: 6,
            prune_transcript: true,
            closing_phrases: vec!["thank you".into(), "that's all".into()],
            farewell: "Thank you for using Inteliome. Have a nice day!".into(),
            default_user_id: "1".into(),
        }
    }
}

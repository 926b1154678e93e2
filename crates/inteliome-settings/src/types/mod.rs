//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so partial JSON
//! files are accepted: missing fields keep their compiled default.

mod conversation;
mod model;
mod runtime;

pub use conversation::*;
pub use model::*;
pub use runtime::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "model": { "model": "gpt-4o-mini" },
///   "conversation": { "summarizeAfterTurns": 6 },
///   "storage": { "backend": "sqlite" }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InteliomeSettings {
    /// Model provider selection.
    pub model: ModelSettings,
    /// Retry wrapper around the provider.
    pub retry: RetrySettings,
    /// Turn pipeline behavior.
    pub conversation: ConversationSettings,
    /// Fact store and checkpoint backend.
    pub storage: StorageSettings,
    /// Log level and format.
    pub logging: LoggingSettings,
    /// File whose contents replace the built-in catalog.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog_path: Option<String>,
}

impl Default for InteliomeSettings {
    fn default() -> Self {
        Self {
            model: ModelSettings::default(),
            retry: RetrySettings::default(),
            conversation: ConversationSettings::default(),
            storage: StorageSettings::default(),
            logging: LoggingSettings::default(),
            catalog_path: None,
        }
    }
}

impl InteliomeSettings {
    /// Reject combinations that cannot drive a session.
    pub fn validate(&self) -> Result<()> {
        if self.conversation.summarize_after_turns < 2 {
            return Err(SettingsError::InvalidValue(format!(
                "conversation.summarizeAfterTurns must be at least 2, got {}",
                self.conversation.summarize_after_turns
            )));
        }
        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err(SettingsError::InvalidValue(format!(
                "model.temperature must be within 0.0..=2.0, got {}",
                self.model.temperature
            )));
        }
        if self.model.model.trim().is_empty() {
            return Err(SettingsError::InvalidValue("model.model is empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_deterministic_and_in_memory() {
        let s = InteliomeSettings::default();
        assert_eq!(s.model.model, "gpt-4o-mini");
        assert_eq!(s.model.temperature, 0.0);
        assert_eq!(s.conversation.summarize_after_turns, 6);
        assert!(s.conversation.prune_transcript);
        assert_eq!(s.conversation.closing_phrases, vec!["thank you", "that's all"]);
        assert_eq!(s.storage.backend, StorageBackend::Memory);
        assert_eq!(s.retry.max_retries, 0);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let s: InteliomeSettings =
            serde_json::from_str(r#"{"conversation": {"summarizeAfterTurns": 10}}"#).unwrap();
        assert_eq!(s.conversation.summarize_after_turns, 10);
        assert!(s.conversation.prune_transcript);
        assert_eq!(s.model.model, "gpt-4o-mini");
    }

    #[test]
    fn camel_case_wire_format() {
        let json = serde_json::to_value(InteliomeSettings::default()).unwrap();
        assert!(json["conversation"]["summarizeAfterTurns"].is_number());
        assert!(json["model"]["apiKeyEnv"].is_string());
        assert!(json.get("catalogPath").is_none());
    }

    #[test]
    fn validate_rejects_tiny_threshold() {
        let mut s = InteliomeSettings::default();
        s.conversation.summarize_after_turns = 1;
        assert!(matches!(s.validate(), Err(SettingsError::InvalidValue(_))));
    }

    #[test]
    fn validate_rejects_out_of_range_temperature() {
        let mut s = InteliomeSettings::default();
        s.model.temperature = 3.5;
        assert!(s.validate().is_err());
    }
}

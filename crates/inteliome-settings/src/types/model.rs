use serde::{Deserialize, Serialize};

/// Which model backs the pipeline and how to reach it.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelSettings {
    /// Provider id (`openai` for any OpenAI-compatible endpoint).
    pub provider: String,
    /// Model id sent with every request.
    pub model: String,
    /// Base URL of the chat completions API.
    pub base_url: String,
    /// Name of the environment variable holding the API key. The key itself
    /// never lives in the settings file.
    pub api_key_env: String,
    /// Sampling temperature; the pipeline expects the deterministic minimum.
    pub temperature: f64,
    /// Optional cap on completion length.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            model: "gpt-4o-mini".into(),
            base_url: "https://api.openai.com/v1".into(),
            api_key_env: "OPENAI_API_KEY".into(),
            temperature: 0.0,
            max_tokens: None,
        }
    }
}

/// Retry policy applied at the provider boundary. Off by default.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

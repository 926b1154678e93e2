/// Capabilities of a known chat-completions model.
#[derive(Clone, Debug)]
pub struct OpenAiModelInfo {
    pub name: &'static str,
    pub display_name: &'static str,
    pub context_window: usize,
    pub max_output: usize,
}

pub static GPT_4O_MINI: OpenAiModelInfo = OpenAiModelInfo {
    name: "gpt-4o-mini",
    display_name: "GPT-4o mini",
    context_window: 128_000,
    max_output: 16_384,
};

pub static GPT_4O: OpenAiModelInfo = OpenAiModelInfo {
    name: "gpt-4o",
    display_name: "GPT-4o",
    context_window: 128_000,
    max_output: 16_384,
};

pub static GPT_4_1_MINI: OpenAiModelInfo = OpenAiModelInfo {
    name: "gpt-4.1-mini",
    display_name: "GPT-4.1 mini",
    context_window: 1_047_576,
    max_output: 32_768,
};

pub static GPT_4_1: OpenAiModelInfo = OpenAiModelInfo {
    name: "gpt-4.1",
    display_name: "GPT-4.1",
    context_window: 1_047_576,
    max_output: 32_768,
};

static ALL_MODELS: &[&OpenAiModelInfo] = &[&GPT_4O_MINI, &GPT_4O, &GPT_4_1_MINI, &GPT_4_1];

/// Context window assumed for models served by compatible endpoints that
/// are not in the registry.
pub const FALLBACK_CONTEXT_WINDOW: usize = 128_000;

pub fn find_model(name: &str) -> Option<&'static OpenAiModelInfo> {
    ALL_MODELS.iter().find(|m| m.name == name).copied()
}

pub fn default_model() -> &'static OpenAiModelInfo {
    &GPT_4O_MINI
}

pub fn all_models() -> &'static [&'static OpenAiModelInfo] {
    ALL_MODELS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_known_models() {
        assert!(find_model("gpt-4o-mini").is_some());
        assert!(find_model("gpt-4.1").is_some());
        assert!(find_model("llama3").is_none());
    }

    #[test]
    fn default_model_is_4o_mini() {
        assert_eq!(default_model().name, "gpt-4o-mini");
        assert_eq!(default_model().context_window, 128_000);
    }

    #[test]
    fn registry_names_are_unique() {
        let mut names: Vec<_> = all_models().iter().map(|m| m.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), all_models().len());
    }
}

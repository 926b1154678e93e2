//! One conversational turn:
//!
//! ```text
//! START → LANGUAGE_CHECK → (REFUSED | CLASSIFY) → MEMORY_WRITE
//!       → COMPOSE → ANSWER → (MAYBE_SUMMARIZE) → END
//! ```

use std::sync::Arc;

use tracing::{info, instrument, warn};

use inteliome_core::ids::FactKey;
use inteliome_core::messages::Turn;
use inteliome_core::provider::{LlmProvider, StreamOptions};
use inteliome_core::state::ConversationState;
use inteliome_settings::InteliomeSettings;
use inteliome_store::{FactStore, FactValue, Namespace};

use crate::catalog::Catalog;
use crate::completion::{complete_text, ModelCall};
use crate::composer::ComposedPrompt;
use crate::error::EngineError;
use crate::gate::{check_language, LanguageVerdict, REFUSAL_SENTINEL};
use crate::intent::{classify_intent, Category};
use crate::summarizer::Summarizer;

#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// Summarize once the transcript holds more turns than this.
    pub summarize_after_turns: usize,
    pub prune_transcript: bool,
    pub stream_options: StreamOptions,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            summarize_after_turns: 6,
            prune_transcript: true,
            stream_options: StreamOptions::deterministic(),
        }
    }
}

impl ControllerConfig {
    pub fn from_settings(settings: &InteliomeSettings) -> Self {
        Self {
            summarize_after_turns: settings.conversation.summarize_after_turns,
            prune_transcript: settings.conversation.prune_transcript,
            stream_options: StreamOptions {
                max_tokens: settings.model.max_tokens,
                temperature: Some(settings.model.temperature),
                stop_sequences: Vec::new(),
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnKind {
    /// The gate rejected the input; the reply is the refusal sentinel.
    Refused,
    Answered { category: Category, summarized: bool },
}

#[derive(Clone, Debug)]
pub struct TurnOutcome {
    pub state: ConversationState,
    pub reply: String,
    pub kind: TurnKind,
}

pub struct TurnController {
    provider: Arc<dyn LlmProvider>,
    facts: Option<Arc<dyn FactStore>>,
    catalog: Catalog,
    summarizer: Summarizer,
    config: ControllerConfig,
}

impl TurnController {
    pub fn new(provider: Arc<dyn LlmProvider>, catalog: Catalog, config: ControllerConfig) -> Self {
        Self {
            provider,
            facts: None,
            catalog,
            summarizer: Summarizer::new(config.prune_transcript),
            config,
        }
    }

    pub fn with_fact_store(mut self, facts: Arc<dyn FactStore>) -> Self {
        self.facts = Some(facts);
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Run one turn for `input` against `state`.
    ///
    /// Works on a copy: on error the caller keeps `state` as it was, with no
    /// partial assistant turn and no summary change.
    #[instrument(skip_all, fields(thread_id = %state.thread_id, user_id = %state.user_id))]
    pub async fn run_turn(
        &self,
        state: &ConversationState,
        input: &str,
    ) -> Result<TurnOutcome, EngineError> {
        let facts = self.facts.as_deref().ok_or_else(|| {
            EngineError::Configuration("no fact store attached to the turn controller".into())
        })?;
        if state.user_id.is_blank() {
            return Err(EngineError::Configuration(
                "user id is required to address the memory namespace".into(),
            ));
        }

        let provider = self.provider.as_ref();
        let options = &self.config.stream_options;
        let mut working = state.clone();

        let verdict = check_language(provider, options, input, &working.transcript).await?;
        working.transcript.push(Turn::user(input));

        if verdict == LanguageVerdict::Gibberish {
            info!("input refused by language gate");
            working.transcript.push(Turn::assistant(REFUSAL_SENTINEL));
            return Ok(TurnOutcome {
                state: working,
                reply: REFUSAL_SENTINEL.to_string(),
                kind: TurnKind::Refused,
            });
        }

        let category = classify_intent(
            provider,
            options,
            self.catalog.as_str(),
            input,
            &working.transcript,
        )
        .await?;

        let namespace = Namespace::memories(&working.user_id);
        facts
            .put(&namespace, &FactKey::new(), &FactValue::new(input))
            .await?;
        let recalled = facts.search(&namespace).await?;

        let prompt = ComposedPrompt::compose(
            self.catalog.as_str(),
            &recalled,
            &working.running_summary,
            category,
        );
        let context = prompt.into_context(working.chat_messages());
        let reply = complete_text(provider, &context, options, ModelCall::Answer).await?;
        working.transcript.push(Turn::assistant(reply.as_str()));

        let summarized = working.transcript.len() > self.config.summarize_after_turns;
        if summarized {
            self.summarizer
                .summarize(provider, options, &mut working)
                .await
                .inspect_err(|e| warn!(error = %e, "summarization failed, turn discarded"))?;
        }

        info!(%category, facts = recalled.len(), summarized, "turn answered");
        Ok(TurnOutcome {
            state: working,
            reply,
            kind: TurnKind::Answered {
                category,
                summarized,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inteliome_core::context::SystemBlockLabel;
    use inteliome_core::errors::GatewayError;
    use inteliome_core::ids::{ThreadId, UserId};
    use inteliome_core::messages::Role;
    use inteliome_llm::{MockProvider, MockResponse};
    use inteliome_store::InMemoryFactStore;

    struct Harness {
        controller: TurnController,
        mock: Arc<MockProvider>,
        facts: Arc<InMemoryFactStore>,
    }

    fn setup(responses: Vec<MockResponse>) -> Harness {
        setup_with(responses, ControllerConfig::default())
    }

    fn setup_with(responses: Vec<MockResponse>, config: ControllerConfig) -> Harness {
        let mock = Arc::new(MockProvider::new(responses));
        let facts = Arc::new(InMemoryFactStore::new());
        let controller = TurnController::new(mock.clone(), Catalog::builtin(), config)
            .with_fact_store(facts.clone());
        Harness {
            controller,
            mock,
            facts,
        }
    }

    fn texts(items: &[&str]) -> Vec<MockResponse> {
        items.iter().map(|t| MockResponse::stream_text(t)).collect()
    }

    fn fresh_state() -> ConversationState {
        ConversationState::new(ThreadId::from_raw("thread-1"), UserId::from_raw("1"))
    }

    fn namespace() -> Namespace {
        Namespace::memories(&UserId::from_raw("1"))
    }

    fn state_with_turns(n: usize) -> ConversationState {
        let mut s = fresh_state();
        for i in 0..n {
            s.transcript.push(if i % 2 == 0 {
                Turn::user(format!("question {i}"))
            } else {
                Turn::assistant(format!("answer {i}"))
            });
        }
        s
    }

    #[tokio::test]
    async fn gibberish_short_circuits() {
        let h = setup(texts(&["gibberish"]));
        let state = fresh_state();
        let out = h.controller.run_turn(&state, "asdkjh qwe").await.unwrap();

        assert_eq!(out.kind, TurnKind::Refused);
        assert_eq!(out.reply, REFUSAL_SENTINEL);
        assert_eq!(h.mock.call_count(), 1);
        assert!(h.facts.is_empty(&namespace()));
        assert_eq!(out.state.transcript.len(), 2);
        assert_eq!(out.state.transcript[0].content, "asdkjh qwe");
        assert_eq!(out.state.transcript[1].content, REFUSAL_SENTINEL);
    }

    #[tokio::test]
    async fn refusal_keeps_summary() {
        let h = setup(texts(&["gibberish"]));
        let mut state = fresh_state();
        state.running_summary = "user asked about profit".into();
        let out = h.controller.run_turn(&state, "zzzz").await.unwrap();
        assert_eq!(out.state.running_summary, "user asked about profit");
    }

    #[tokio::test]
    async fn accepted_turn_writes_exactly_one_fact() {
        let h = setup(texts(&["english", "metadata", "Profit is revenue minus cost."]));
        let out = h.controller.run_turn(&fresh_state(), "What is profit?").await.unwrap();

        assert_eq!(
            h.facts.search(&namespace()).await.unwrap(),
            vec![FactValue::new("What is profit?")]
        );
        assert_eq!(h.mock.call_count(), 3);
        assert_eq!(
            out.kind,
            TurnKind::Answered {
                category: Category::Metadata,
                summarized: false
            }
        );
        assert_eq!(out.reply, "Profit is revenue minus cost.");
        let last = out.state.last_turn().unwrap();
        assert_eq!(last.role, Role::Assistant);
        assert_eq!(last.content, out.reply);
    }

    #[tokio::test]
    async fn current_input_is_recalled_in_answer_prompt() {
        let h = setup(texts(&["english", "metadata", "AUC is area under the curve."]));
        h.controller.run_turn(&fresh_state(), "What is auc?").await.unwrap();

        let contexts = h.mock.contexts();
        let answer = &contexts[2];
        let recalled = answer.block(&SystemBlockLabel::RecalledFacts).unwrap();
        assert!(recalled.content.contains("What is auc?"));

        let prompt = answer.system_prompt().unwrap();
        let catalog = prompt.find("\"auc\"").unwrap();
        let fact = prompt.find("What is auc?").unwrap();
        let rules = prompt.find("classified as 'metadata'").unwrap();
        assert!(catalog < fact && fact < rules);
        assert_eq!(answer.messages.last().unwrap().content, "What is auc?");
    }

    #[tokio::test]
    async fn gate_is_not_fed_its_own_refusal() {
        let h = setup(texts(&[
            "english",
            "metadata",
            "Profit is revenue minus cost.",
            "gibberish",
            "english",
            "conversational",
            "You're welcome.",
        ]));
        let s1 = h.controller.run_turn(&fresh_state(), "what is profit").await.unwrap().state;
        let s2 = h.controller.run_turn(&s1, "xqzv").await.unwrap().state;
        h.controller.run_turn(&s2, "ok, great").await.unwrap();

        let gate_prompt = h.mock.contexts()[4].system_prompt().unwrap();
        assert!(gate_prompt.contains("\"profit is revenue minus cost.\""));
        assert!(!gate_prompt.contains(&REFUSAL_SENTINEL.to_lowercase()));
    }

    #[tokio::test]
    async fn summarizes_past_threshold_and_keeps_two_turns() {
        let h = setup(texts(&["english", "metadata", "A4", "S1"]));
        let state = state_with_turns(5);
        let out = h.controller.run_turn(&state, "question 5").await.unwrap();

        assert_eq!(
            out.kind,
            TurnKind::Answered {
                category: Category::Metadata,
                summarized: true
            }
        );
        assert_eq!(out.state.running_summary, "S1");
        assert_eq!(out.state.transcript.len(), 2);
        assert_eq!(out.state.transcript[0].content, "question 5");
        assert_eq!(out.state.transcript[1].content, "A4");
        assert_eq!(h.mock.call_count(), 4);
    }

    #[tokio::test]
    async fn no_summary_at_threshold() {
        let h = setup(texts(&["english", "metadata", "A"]));
        let out = h.controller.run_turn(&state_with_turns(4), "q").await.unwrap();
        assert_eq!(out.state.transcript.len(), 6);
        assert!(!out.state.has_summary());
        assert_eq!(h.mock.call_count(), 3);
    }

    #[tokio::test]
    async fn existing_summary_is_extended_and_replaced() {
        let h = setup(texts(&["english", "metadata", "A", "S2"]));
        let mut state = state_with_turns(5);
        state.running_summary = "S1".into();
        let out = h.controller.run_turn(&state, "q").await.unwrap();

        assert_eq!(out.state.running_summary, "S2");
        let summary_ctx = &h.mock.contexts()[3];
        let instruction = &summary_ctx.messages.last().unwrap().content;
        assert!(instruction.starts_with("This is summary of the conversation to date: S1"));
        assert!(!out.state.transcript.iter().any(|t| t.content == *instruction));
    }

    #[tokio::test]
    async fn pruning_can_be_disabled() {
        let config = ControllerConfig {
            prune_transcript: false,
            ..ControllerConfig::default()
        };
        let h = setup_with(texts(&["english", "metadata", "A", "S"]), config);
        let out = h.controller.run_turn(&state_with_turns(5), "q").await.unwrap();
        assert_eq!(out.state.transcript.len(), 7);
        assert_eq!(out.state.running_summary, "S");
    }

    #[tokio::test]
    async fn unrecognized_verdict_fails_without_side_effects() {
        let h = setup(texts(&["french"]));
        let state = fresh_state();
        let err = h.controller.run_turn(&state, "bonjour").await.unwrap_err();
        assert!(matches!(err, EngineError::UnrecognizedLanguageVerdict(_)));
        assert!(h.facts.is_empty(&namespace()));
        assert_eq!(h.mock.call_count(), 1);
    }

    #[tokio::test]
    async fn non_text_answer_is_contract_violation() {
        let h = setup(vec![
            MockResponse::stream_text("english"),
            MockResponse::stream_text("metadata"),
            MockResponse::multi_text(&["part one", "part two"]),
        ]);
        let err = h.controller.run_turn(&fresh_state(), "what is profit").await.unwrap_err();
        assert!(matches!(err, EngineError::ContractViolation { call: "answer", .. }));
    }

    #[tokio::test]
    async fn failed_summary_discards_the_turn() {
        let h = setup(vec![
            MockResponse::stream_text("english"),
            MockResponse::stream_text("metadata"),
            MockResponse::stream_text("A"),
            MockResponse::tool_call("summarize", serde_json::json!({})),
        ]);
        let state = state_with_turns(5);
        let err = h.controller.run_turn(&state, "q").await.unwrap_err();
        assert!(matches!(err, EngineError::ContractViolation { call: "summarizer", .. }));
        assert_eq!(state.transcript.len(), 5);
        assert!(!state.has_summary());
    }

    #[tokio::test]
    async fn gateway_error_propagates() {
        let h = setup(vec![MockResponse::Error(GatewayError::RateLimited {
            retry_after: None,
        })]);
        let err = h.controller.run_turn(&fresh_state(), "hi").await.unwrap_err();
        assert!(matches!(err, EngineError::Gateway(GatewayError::RateLimited { .. })));
    }

    #[tokio::test]
    async fn missing_fact_store_is_configuration_error() {
        let mock = Arc::new(MockProvider::with_texts(&["english"]));
        let controller =
            TurnController::new(mock.clone(), Catalog::builtin(), ControllerConfig::default());
        let err = controller.run_turn(&fresh_state(), "hi").await.unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn blank_user_id_is_configuration_error() {
        let h = setup(texts(&["english"]));
        let state = ConversationState::new(ThreadId::from_raw("t"), UserId::from_raw(" "));
        let err = h.controller.run_turn(&state, "hi").await.unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(h.mock.call_count(), 0);
    }

    #[tokio::test]
    async fn clarification_then_follow_up() {
        let h = setup(texts(&[
            "english",
            "need_clarification",
            "Do you mean 'Promotional Sales Cost' or 'total promotional sales'?",
            "english",
            "metadata",
            "Promotional Sales Cost is the cost of goods sold on promotion.",
        ]));
        let s1 = h.controller.run_turn(&fresh_state(), "how much did promos cost").await.unwrap();
        assert_eq!(
            s1.kind,
            TurnKind::Answered {
                category: Category::NeedClarification,
                summarized: false
            }
        );
        let s2 = h.controller.run_turn(&s1.state, "the first one").await.unwrap();
        assert_eq!(s2.state.transcript.len(), 4);
        assert_eq!(h.facts.len(&namespace()), 2);

        let answer = &h.mock.contexts()[5];
        let recalled = &answer.block(&SystemBlockLabel::RecalledFacts).unwrap().content;
        assert!(recalled.contains("how much did promos cost\nthe first one"));
        assert_eq!(answer.messages.len(), 3);
    }

    #[test]
    fn settings_drive_config() {
        let mut settings = InteliomeSettings::default();
        settings.conversation.summarize_after_turns = 10;
        settings.model.max_tokens = Some(512);
        let config = ControllerConfig::from_settings(&settings);
        assert_eq!(config.summarize_after_turns, 10);
        assert_eq!(config.stream_options.temperature, Some(0.0));
        assert_eq!(config.stream_options.max_tokens, Some(512));
    }
}

//! Line-oriented conversation loop: one input line per turn, checkpoint after
//! every successful turn.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{error, info, instrument};

use inteliome_core::ids::{ThreadId, UserId};
use inteliome_core::state::ConversationState;
use inteliome_engine::TurnController;
use inteliome_settings::ConversationSettings;
use inteliome_store::Checkpointer;

/// Written before every read.
pub const INPUT_PROMPT: &str = "\nUser: ";

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub assistant_name: String,
    pub closing_phrases: Vec<String>,
    pub farewell: String,
}

impl SessionConfig {
    pub fn from_settings(settings: &ConversationSettings) -> Self {
        Self {
            assistant_name: settings.assistant_name.clone(),
            closing_phrases: settings.closing_phrases.clone(),
            farewell: settings.farewell.clone(),
        }
    }

    /// True when `input` contains any closing phrase, ignoring case.
    pub fn is_closing(&self, input: &str) -> bool {
        let input = input.to_lowercase();
        self.closing_phrases
            .iter()
            .filter(|p| !p.trim().is_empty())
            .any(|p| input.contains(&p.to_lowercase()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEnd {
    Farewell,
    EndOfInput,
}

pub struct Session {
    controller: TurnController,
    checkpointer: Arc<dyn Checkpointer>,
    config: SessionConfig,
}

impl Session {
    pub fn new(
        controller: TurnController,
        checkpointer: Arc<dyn Checkpointer>,
        config: SessionConfig,
    ) -> Self {
        Self {
            controller,
            checkpointer,
            config,
        }
    }

    /// Drive turns until a closing phrase or end of input. Replies go to
    /// `output`; failed turns are reported on `errors` and the previous state
    /// is kept.
    #[instrument(skip_all, fields(thread_id = %thread_id, user_id = %user_id))]
    pub async fn run<R, W, E>(
        &self,
        thread_id: ThreadId,
        user_id: UserId,
        input: R,
        mut output: W,
        mut errors: E,
    ) -> anyhow::Result<SessionEnd>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
        E: AsyncWrite + Unpin,
    {
        let mut state = self
            .checkpointer
            .load(&thread_id, &user_id)
            .await?
            .unwrap_or_else(|| ConversationState::new(thread_id.clone(), user_id.clone()));
        info!(turns = state.transcript.len(), "session started");

        let name = &self.config.assistant_name;
        let mut lines = input.lines();
        loop {
            output.write_all(INPUT_PROMPT.as_bytes()).await?;
            output.flush().await?;
            let Some(line) = lines.next_line().await? else {
                break;
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if self.config.is_closing(trimmed) {
                output
                    .write_all(format!("{name}: {}\n", self.config.farewell).as_bytes())
                    .await?;
                output.flush().await?;
                return Ok(SessionEnd::Farewell);
            }

            match self.controller.run_turn(&state, &line).await {
                Ok(outcome) => {
                    output
                        .write_all(format!("{name}: {}\n", outcome.reply).as_bytes())
                        .await?;
                    output.flush().await?;
                    if let Err(e) = self.checkpointer.save(&outcome.state).await {
                        error!(error = %e, "failed to save checkpoint");
                        errors
                            .write_all(format!("warning: conversation not saved: {e}\n").as_bytes())
                            .await?;
                    }
                    state = outcome.state;
                }
                Err(e) => {
                    error!(error = %e, "turn failed");
                    errors.write_all(format!("error: {e}\n").as_bytes()).await?;
                    errors.flush().await?;
                    if e.is_configuration() {
                        return Err(e.into());
                    }
                }
            }
        }

        info!("input closed");
        Ok(SessionEnd::EndOfInput)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inteliome_engine::{Catalog, ControllerConfig, REFUSAL_SENTINEL};
    use inteliome_llm::{MockProvider, MockResponse};
    use inteliome_store::{InMemoryCheckpointer, InMemoryFactStore};

    fn config() -> SessionConfig {
        SessionConfig::from_settings(&ConversationSettings::default())
    }

    fn session(mock: Arc<MockProvider>, checkpointer: Arc<InMemoryCheckpointer>) -> Session {
        let controller = TurnController::new(mock, Catalog::builtin(), ControllerConfig::default())
            .with_fact_store(Arc::new(InMemoryFactStore::new()));
        Session::new(controller, checkpointer, config())
    }

    async fn drive(session: &Session, input: &str) -> (SessionEnd, String, String) {
        let mut out = Vec::new();
        let mut err = Vec::new();
        let end = session
            .run(
                ThreadId::from_raw("thread-1"),
                UserId::from_raw("1"),
                input.as_bytes(),
                &mut out,
                &mut err,
            )
            .await
            .unwrap();
        (
            end,
            String::from_utf8(out).unwrap(),
            String::from_utf8(err).unwrap(),
        )
    }

    #[test]
    fn closing_phrases_match_anywhere_ignoring_case() {
        let c = config();
        assert!(c.is_closing("Thank You!"));
        assert!(c.is_closing("ok that's all for now"));
        assert!(!c.is_closing("what is profit"));
    }

    #[tokio::test]
    async fn closing_phrase_ends_without_model_calls() {
        let mock = Arc::new(MockProvider::new(vec![]));
        let s = session(mock.clone(), Arc::new(InMemoryCheckpointer::new()));
        let (end, out, _) = drive(&s, "\n  \nthank you\nwhat is profit\n").await;
        assert_eq!(end, SessionEnd::Farewell);
        assert_eq!(
            out,
            format!(
                "{p}{p}{p}Inteliome: Thank you for using Inteliome. Have a nice day!\n",
                p = INPUT_PROMPT
            )
        );
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn replies_are_prefixed_and_state_is_saved() {
        let mock = Arc::new(MockProvider::with_texts(&[
            "english",
            "metadata",
            "Profit is revenue minus cost.",
            "gibberish",
        ]));
        let checkpointer = Arc::new(InMemoryCheckpointer::new());
        let s = session(mock, checkpointer.clone());
        let (end, out, err) = drive(&s, "What is profit?\nqwzx\n").await;

        assert_eq!(end, SessionEnd::EndOfInput);
        assert_eq!(
            out,
            format!(
                "{p}Inteliome: Profit is revenue minus cost.\n{p}Inteliome: {REFUSAL_SENTINEL}\n{p}",
                p = INPUT_PROMPT
            )
        );
        assert!(err.is_empty());

        let saved = checkpointer
            .load(&ThreadId::from_raw("thread-1"), &UserId::from_raw("1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(saved.transcript.len(), 4);
    }

    #[tokio::test]
    async fn failed_turn_is_reported_and_session_continues() {
        let mock = Arc::new(MockProvider::new(vec![
            MockResponse::stream_text("dunno"),
            MockResponse::stream_text("english"),
            MockResponse::stream_text("conversational"),
            MockResponse::stream_text("Hello!"),
        ]));
        let checkpointer = Arc::new(InMemoryCheckpointer::new());
        let s = session(mock, checkpointer.clone());
        let (_, out, err) = drive(&s, "hmm\nhello\n").await;

        assert!(err.starts_with("error: language gate replied"));
        assert_eq!(out, format!("{p}{p}Inteliome: Hello!\n{p}", p = INPUT_PROMPT));
        let saved = checkpointer
            .load(&ThreadId::from_raw("thread-1"), &UserId::from_raw("1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(saved.transcript.len(), 2);
        assert_eq!(saved.transcript[0].content, "hello");
    }

    #[tokio::test]
    async fn resumes_saved_thread() {
        let checkpointer = Arc::new(InMemoryCheckpointer::new());
        let mut earlier = ConversationState::new(ThreadId::from_raw("thread-1"), UserId::from_raw("1"));
        earlier.running_summary = "user asked about auc".into();
        checkpointer.save(&earlier).await.unwrap();

        let mock = Arc::new(MockProvider::with_texts(&["english", "metadata", "Yes."]));
        let s = session(mock.clone(), checkpointer);
        drive(&s, "and markup amount?\n").await;

        let answer = &mock.contexts()[2];
        assert!(answer.system_prompt().unwrap().contains("Summary: user asked about auc"));
    }

    #[tokio::test]
    async fn thread_of_another_user_is_rejected() {
        let checkpointer = Arc::new(InMemoryCheckpointer::new());
        let other = ConversationState::new(ThreadId::from_raw("thread-1"), UserId::from_raw("2"));
        checkpointer.save(&other).await.unwrap();

        let s = session(Arc::new(MockProvider::new(vec![])), checkpointer);
        let result = s
            .run(
                ThreadId::from_raw("thread-1"),
                UserId::from_raw("1"),
                "hi\n".as_bytes(),
                Vec::new(),
                Vec::new(),
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn raw_line_reaches_the_controller() {
        let mock = Arc::new(MockProvider::with_texts(&["english", "metadata", "Yes."]));
        let checkpointer = Arc::new(InMemoryCheckpointer::new());
        let s = session(mock.clone(), checkpointer.clone());
        drive(&s, "  What is profit?  \n").await;

        let saved = checkpointer
            .load(&ThreadId::from_raw("thread-1"), &UserId::from_raw("1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(saved.transcript[0].content, "  What is profit?  ");
        let answer = &mock.contexts()[2];
        assert!(answer
            .system_prompt()
            .unwrap()
            .contains("User queries so far:\n  What is profit?  "));
    }
}

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use futures::{Future, Stream};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::Client;
use tracing::{debug, instrument};

use inteliome_core::context::LlmContext;
use inteliome_core::errors::GatewayError;
use inteliome_core::provider::{EventStream, LlmProvider, StreamOptions};
use inteliome_core::security::ApiKey;
use inteliome_core::stream::StreamEvent;
use inteliome_settings::ModelSettings;

use crate::converter;
use crate::models::{self, OpenAiModelInfo, FALLBACK_CONTEXT_WINDOW};
use crate::sse::{self, SseParser};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const SSE_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Connection details for an OpenAI-compatible chat-completions endpoint.
#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    pub model: String,
    pub base_url: String,
    pub api_key: ApiKey,
    pub max_tokens: Option<u32>,
}

impl OpenAiConfig {
    pub fn from_settings(settings: &ModelSettings, api_key: ApiKey) -> Self {
        Self {
            model: settings.model.clone(),
            base_url: settings.base_url.clone(),
            api_key,
            max_tokens: settings.max_tokens,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

pub struct OpenAiProvider {
    client: Client,
    config: OpenAiConfig,
    model_info: Option<&'static OpenAiModelInfo>,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::NetworkError(format!("failed to build HTTP client: {e}")))?;
        let model_info = models::find_model(&config.model);
        if model_info.is_none() {
            debug!(model = %config.model, "model not in registry, using fallback limits");
        }
        Ok(Self {
            client,
            config,
            model_info,
        })
    }

    fn build_request(&self, context: &LlmContext, options: &StreamOptions) -> reqwest::RequestBuilder {
        let mut options = options.clone();
        if options.max_tokens.is_none() {
            options.max_tokens = self.config.max_tokens;
        }
        let body = converter::build_request_body(context, &options, &self.config.model);

        let mut req = self
            .client
            .post(self.config.endpoint())
            .header("accept", "text/event-stream")
            .header("content-type", "application/json");
        // Local compatible servers often run without a key.
        if !self.config.api_key.is_empty() {
            req = req.header("authorization", self.config.api_key.bearer());
        }
        req.json(&body)
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn context_window(&self) -> usize {
        self.model_info
            .map_or(FALLBACK_CONTEXT_WINDOW, |m| m.context_window)
    }

    #[instrument(skip(self, context, options), fields(model = %self.config.model))]
    async fn stream(
        &self,
        context: &LlmContext,
        options: &StreamOptions,
    ) -> Result<EventStream, GatewayError> {
        let resp = self
            .build_request(context, options)
            .send()
            .await
            .map_err(|e| GatewayError::NetworkError(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let retry_after = parse_retry_after(resp.headers());
            let body = resp.text().await.unwrap_or_default();
            return Err(GatewayError::from_status(
                status,
                extract_error_message(&body),
                retry_after,
            ));
        }

        Ok(Box::pin(SseStream::new(resp.bytes_stream())))
    }
}

/// `Retry-After` in whole seconds. HTTP-date values are ignored.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Pull `error.message` out of a JSON error body, falling back to the raw body.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

/// Wraps a byte stream from reqwest and yields StreamEvents.
/// Emits an error if no data arrives within the idle timeout.
struct SseStream {
    inner: Pin<Box<dyn Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send>>,
    parser: SseParser,
    /// Raw bytes not yet forming a complete event. Decoded only at event
    /// boundaries so multi-byte characters split across chunks stay intact.
    buffer: Vec<u8>,
    pending: VecDeque<StreamEvent>,
    idle_deadline: Pin<Box<tokio::time::Sleep>>,
    idle_duration: Duration,
    closed: bool,
}

impl SseStream {
    fn new(
        byte_stream: impl Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
    ) -> Self {
        Self::with_idle_timeout(byte_stream, SSE_IDLE_TIMEOUT)
    }

    fn with_idle_timeout(
        byte_stream: impl Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            inner: Box::pin(byte_stream),
            parser: SseParser::new(),
            buffer: Vec::new(),
            pending: VecDeque::new(),
            idle_deadline: Box::pin(tokio::time::sleep(idle_timeout)),
            idle_duration: idle_timeout,
            closed: false,
        }
    }

    /// Append a network chunk with `\r` dropped, so CRLF framing reads as LF.
    fn push_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend(bytes.iter().copied().filter(|b| *b != b'\r'));
    }

    fn drain_complete_events(&mut self) {
        while let Some(pos) = self.buffer.windows(2).position(|w| w == b"\n\n") {
            let chunk: Vec<u8> = self.buffer.drain(..pos + 2).collect();
            self.parse_event_bytes(&chunk);
        }
    }

    fn parse_event_bytes(&mut self, chunk: &[u8]) {
        let text = String::from_utf8_lossy(chunk);
        for data in sse::parse_sse_data(&text) {
            let events = self.parser.parse_data(&data);
            self.pending.extend(events);
        }
    }

    fn fail(&mut self, error: GatewayError) -> Poll<Option<StreamEvent>> {
        self.closed = true;
        self.pending.clear();
        Poll::Ready(Some(StreamEvent::Error { error }))
    }
}

impl Stream for SseStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(event) = self.pending.pop_front() {
            return Poll::Ready(Some(event));
        }
        if self.closed {
            return Poll::Ready(None);
        }

        loop {
            match self.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    let deadline = tokio::time::Instant::now() + self.idle_duration;
                    self.idle_deadline.as_mut().reset(deadline);

                    self.push_bytes(&bytes);
                    self.drain_complete_events();

                    if let Some(event) = self.pending.pop_front() {
                        return Poll::Ready(Some(event));
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    return self.fail(GatewayError::StreamInterrupted(e.to_string()));
                }
                Poll::Ready(None) => {
                    self.closed = true;
                    let remaining = std::mem::take(&mut self.buffer);
                    self.parse_event_bytes(&remaining);
                    if !self.parser.is_finished() {
                        if self.parser.saw_finish_reason() {
                            let events = self.parser.finish();
                            self.pending.extend(events);
                        } else {
                            self.pending.push_back(StreamEvent::Error {
                                error: GatewayError::StreamInterrupted(
                                    "stream ended before completion".into(),
                                ),
                            });
                        }
                    }
                    return Poll::Ready(self.pending.pop_front());
                }
                Poll::Pending => {
                    if self.idle_deadline.as_mut().poll(cx).is_ready() {
                        let secs = self.idle_duration.as_secs();
                        return self.fail(GatewayError::StreamInterrupted(format!(
                            "idle timeout after {secs}s"
                        )));
                    }
                    return Poll::Pending;
                }
            }
        }
    }
}

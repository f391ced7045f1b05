//! Completion relay: sends the composed message list to an OpenRouter-compatible
//! chat-completion API and returns the reply, either whole or as a stream of
//! deltas. A deterministic mock mode keeps the service usable offline and makes
//! the streaming/non-streaming equivalence testable.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::prompt::{ChatTurn, Role};

const ENV_LLM_MODE: &str = "COACH_LLM_MODE";
const ENV_LLM_API_URL: &str = "COACH_LLM_API_URL";
const ENV_LLM_API_KEY: &str = "COACH_LLM_API_KEY";
const ENV_OPENROUTER_API_KEY: &str = "OPENROUTER_API_KEY";
const ENV_LLM_MODEL: &str = "COACH_LLM_MODEL";
const DEFAULT_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
const DEFAULT_MODEL: &str = "meta-llama/llama-3.3-70b-instruct";
const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Returned when the upstream answers successfully but with no content.
pub const FALLBACK_REPLY: &str = "No reply generated. Try rephrasing your question.";

/// Mode for LLM invocation: mock (deterministic local reply) or live (external API).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RelayMode {
    #[default]
    Mock,
    Live,
}

impl RelayMode {
    fn from_env() -> Self {
        match std::env::var(ENV_LLM_MODE).as_deref() {
            Ok("live") => RelayMode::Live,
            _ => RelayMode::Mock,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("missing COACH_LLM_API_KEY or OPENROUTER_API_KEY")]
    MissingApiKey,
    #[error("completion request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("completion API error ({status}): {body}")]
    Api { status: u16, body: String },
}

// OpenAI-compatible request/response shapes.
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: String,
    messages: &'a [ChatTurn],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReplyMessage,
}

#[derive(Deserialize)]
struct ChatReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Streaming chunk from the SSE `data:` lines.
#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Seam for the completion upstream, so the gateway can run against any
/// backend (the real relay in production, a scripted one in tests).
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// One completion call; first choice's text, trimmed. No retry.
    async fn complete(
        &self,
        messages: &[ChatTurn],
        temperature: Option<f32>,
    ) -> Result<String, RelayError>;

    /// Streaming completion. Fragments arrive on the receiver in upstream
    /// order; a mid-stream failure delivers one `Err` frame and closes the
    /// channel. Not restartable.
    async fn stream(
        &self,
        messages: &[ChatTurn],
        temperature: Option<f32>,
    ) -> Result<mpsc::Receiver<Result<String, RelayError>>, RelayError>;
}

/// Relays a composed prompt to the mock generator or the live API.
pub struct CompletionRelay {
    mode: RelayMode,
    client: reqwest::Client,
}

impl CompletionRelay {
    pub fn new() -> Self {
        Self::with_mode(RelayMode::from_env())
    }

    pub fn with_mode(mode: RelayMode) -> Self {
        Self {
            mode,
            client: reqwest::Client::new(),
        }
    }

    /// API key resolution: COACH_LLM_API_KEY, then OPENROUTER_API_KEY.
    fn api_key() -> Result<String, RelayError> {
        let key = std::env::var(ENV_LLM_API_KEY)
            .or_else(|_| std::env::var(ENV_OPENROUTER_API_KEY))
            .map_err(|_| RelayError::MissingApiKey)?;
        let key = key.trim().to_string();
        if key.is_empty() {
            return Err(RelayError::MissingApiKey);
        }
        Ok(key)
    }

    fn api_url() -> String {
        std::env::var(ENV_LLM_API_URL).unwrap_or_else(|_| DEFAULT_API_URL.to_string())
    }

    fn model() -> String {
        std::env::var(ENV_LLM_MODEL).unwrap_or_else(|_| DEFAULT_MODEL.to_string())
    }

    /// One completion call; first choice's text, trimmed. No retry.
    pub async fn complete(
        &self,
        messages: &[ChatTurn],
        temperature: Option<f32>,
    ) -> Result<String, RelayError> {
        match self.mode {
            RelayMode::Mock => Ok(mock_reply(messages)),
            RelayMode::Live => self.live_complete(messages, temperature).await,
        }
    }

    async fn live_complete(
        &self,
        messages: &[ChatTurn],
        temperature: Option<f32>,
    ) -> Result<String, RelayError> {
        let key = Self::api_key()?;
        let model = Self::model();
        tracing::info!(target: "coach::relay", model = %model, "completion dispatch");

        let body = ChatRequest {
            model,
            messages,
            temperature: temperature.or(Some(DEFAULT_TEMPERATURE)),
            stream: None,
        };

        let response = self
            .client
            .post(Self::api_url())
            .bearer_auth(&key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(target: "coach::relay", status = %status, "completion API error: {}", body);
            return Err(RelayError::Api { status: status.as_u16(), body });
        }

        let parsed: ChatResponse = response.json().await?;
        Ok(reply_from_response(parsed))
    }

    /// Streaming completion. Fragments arrive on the receiver in upstream
    /// order; a mid-stream failure delivers one `Err` frame and closes the
    /// channel, and `[DONE]` closes it cleanly. Not restartable.
    pub async fn stream(
        &self,
        messages: &[ChatTurn],
        temperature: Option<f32>,
    ) -> Result<mpsc::Receiver<Result<String, RelayError>>, RelayError> {
        match self.mode {
            RelayMode::Mock => Ok(mock_stream(messages)),
            RelayMode::Live => self.live_stream(messages, temperature).await,
        }
    }

    async fn live_stream(
        &self,
        messages: &[ChatTurn],
        temperature: Option<f32>,
    ) -> Result<mpsc::Receiver<Result<String, RelayError>>, RelayError> {
        let key = Self::api_key()?;
        let model = Self::model();
        tracing::info!(target: "coach::relay", model = %model, "streaming session started");

        let body = ChatRequest {
            model,
            messages,
            temperature: temperature.or(Some(DEFAULT_TEMPERATURE)),
            stream: Some(true),
        };

        let response = self
            .client
            .post(Self::api_url())
            .bearer_auth(&key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(target: "coach::relay", status = %status, "completion API error: {}", body);
            return Err(RelayError::Api { status: status.as_u16(), body });
        }

        let (tx, rx) = mpsc::channel::<Result<String, RelayError>>(100);

        tokio::spawn(async move {
            use futures_util::StreamExt;
            let mut stream = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(next) = stream.next().await {
                let bytes = match next {
                    Ok(b) => b,
                    Err(e) => {
                        // Explicit error frame so the caller can tell a failure
                        // from a clean close.
                        let _ = tx.send(Err(RelayError::Http(e))).await;
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&bytes));

                // Process complete SSE lines; keep any partial tail buffered.
                while let Some(newline) = buffer.find('\n') {
                    let line = buffer[..newline].trim().to_string();
                    buffer.drain(..=newline);
                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    if data == "[DONE]" {
                        tracing::debug!(target: "coach::relay", "stream completed");
                        return;
                    }
                    match serde_json::from_str::<StreamChunk>(data) {
                        Ok(chunk) => {
                            let delta = chunk
                                .choices
                                .first()
                                .and_then(|c| c.delta.content.as_deref())
                                .unwrap_or("");
                            if !delta.is_empty() && tx.send(Ok(delta.to_string())).await.is_err() {
                                // Receiver dropped (client disconnected); stop
                                // reading the upstream.
                                return;
                            }
                        }
                        Err(e) => {
                            tracing::debug!(target: "coach::relay", "unparsed SSE chunk: {} ({})", data, e);
                        }
                    }
                }
            }
        });

        Ok(rx)
    }
}

impl Default for CompletionRelay {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionBackend for CompletionRelay {
    async fn complete(
        &self,
        messages: &[ChatTurn],
        temperature: Option<f32>,
    ) -> Result<String, RelayError> {
        CompletionRelay::complete(self, messages, temperature).await
    }

    async fn stream(
        &self,
        messages: &[ChatTurn],
        temperature: Option<f32>,
    ) -> Result<mpsc::Receiver<Result<String, RelayError>>, RelayError> {
        CompletionRelay::stream(self, messages, temperature).await
    }
}

fn reply_from_response(parsed: ChatResponse) -> String {
    let text = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|c| c.trim().to_string())
        .unwrap_or_default();
    if text.is_empty() {
        FALLBACK_REPLY.to_string()
    } else {
        text
    }
}

/// Deterministic local reply keyed off the last user turn.
fn mock_reply(messages: &[ChatTurn]) -> String {
    let question = messages
        .iter()
        .rev()
        .find(|t| t.role == Role::User)
        .map(|t| t.content.as_str())
        .unwrap_or("");
    let preview: String = question.chars().take(80).collect();
    format!(
        "[Coach, offline] On \"{preview}\": steady deposits beat perfect timing. \
Automate what you can, protect your streak, and check back in tomorrow."
    )
}

/// Mock streaming: the mock reply split on word boundaries, so concatenating
/// the fragments reproduces the non-streaming reply exactly.
fn mock_stream(messages: &[ChatTurn]) -> mpsc::Receiver<Result<String, RelayError>> {
    let (tx, rx) = mpsc::channel::<Result<String, RelayError>>(100);
    let reply = mock_reply(messages);
    tokio::spawn(async move {
        for word in reply.split_inclusive(' ') {
            if tx.send(Ok(word.to_string())).await.is_err() {
                break;
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::ChatTurn;

    fn messages(question: &str) -> Vec<ChatTurn> {
        vec![ChatTurn::system("base"), ChatTurn::user(question)]
    }

    #[tokio::test]
    async fn mock_stream_concatenates_to_mock_reply() {
        let relay = CompletionRelay::with_mode(RelayMode::Mock);
        let msgs = messages("should I pay off my card first?");

        let whole = relay.complete(&msgs, None).await.unwrap();

        let mut rx = relay.stream(&msgs, None).await.unwrap();
        let mut streamed = String::new();
        while let Some(frag) = rx.recv().await {
            streamed.push_str(&frag.unwrap());
        }
        assert_eq!(streamed, whole);
    }

    #[tokio::test]
    async fn mock_reply_is_deterministic() {
        let relay = CompletionRelay::with_mode(RelayMode::Mock);
        let msgs = messages("same question");
        let a = relay.complete(&msgs, None).await.unwrap();
        let b = relay.complete(&msgs, Some(0.2)).await.unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn empty_upstream_content_yields_fallback() {
        let parsed: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert_eq!(reply_from_response(parsed), FALLBACK_REPLY);

        let parsed: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":"   "}}]}"#).unwrap();
        assert_eq!(reply_from_response(parsed), FALLBACK_REPLY);
    }

    #[test]
    fn reply_is_trimmed() {
        let parsed: ChatResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":"  hi there \n"}}]}"#)
                .unwrap();
        assert_eq!(reply_from_response(parsed), "hi there");
    }
}

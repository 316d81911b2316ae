/// LLM Client — the single point of entry for all inference-service calls.
///
/// ARCHITECTURAL RULE: No other module may talk to the Ollama HTTP API directly.
/// Everything goes through the `InferenceService` trait so the matching pipeline
/// can be exercised against an in-memory fake.
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub mod prompts;

const TAGS_PATH: &str = "/api/tags";
const CHAT_PATH: &str = "/api/chat";
const CONNECT_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Inference service returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Inference stream failed: {0}")]
    Stream(String),
}

/// Assistant text deltas in arrival order. Ends after the first error.
pub type ChatStream = BoxStream<'static, Result<String, LlmError>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Generation parameters forwarded verbatim to the inference service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub top_p: f32,
    pub num_predict: u32,
    pub stop: Vec<String>,
}

/// Body of `POST /api/chat`. Non-streaming unless built with `streaming()`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<GenerationOptions>,
}

impl ChatRequest {
    /// A multi-turn conversation with the service's default generation settings.
    pub fn conversation(model: &str, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.to_string(),
            messages,
            stream: false,
            options: None,
        }
    }

    /// A single user turn with explicit generation settings.
    pub fn single_turn(model: &str, prompt: &str, options: GenerationOptions) -> Self {
        Self {
            model: model.to_string(),
            messages: vec![ChatMessage::user(prompt)],
            stream: false,
            options: Some(options),
        }
    }

    /// Same request with incremental delivery switched on.
    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<InstalledModel>,
}

#[derive(Debug, Deserialize)]
struct InstalledModel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: String,
}

/// One NDJSON line of a streaming `POST /api/chat` response.
#[derive(Debug, Deserialize)]
struct ChatStreamLine {
    #[serde(default)]
    message: Option<ChatResponseMessage>,
    #[serde(default)]
    error: Option<String>,
}

/// The operations the matching pipeline needs from an inference backend.
///
/// No method applies its own deadline: the resolver, the invoker and the
/// pipeline bound these calls with their own timers.
#[async_trait]
pub trait InferenceService: Send + Sync {
    /// Names of every installed model, in the order the service reports them.
    async fn list_models(&self) -> Result<Vec<String>, LlmError>;

    /// Sends one non-streaming chat request and returns the assistant's raw text.
    async fn chat(&self, request: &ChatRequest) -> Result<String, LlmError>;

    /// Sends a streaming chat request. Resolves once the response has started;
    /// deltas then arrive through the returned stream.
    ///
    /// Backends without incremental delivery can rely on this default, which
    /// yields the whole reply as a single delta.
    async fn chat_stream(&self, request: &ChatRequest) -> Result<ChatStream, LlmError> {
        let reply = self.chat(request).await?;
        Ok(stream::once(async move { Ok(reply) }).boxed())
    }
}

/// Ollama-compatible HTTP client.
#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(base_url: &str) -> Result<Self, LlmError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl InferenceService for OllamaClient {
    async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        let url = format!("{}{}", self.base_url, TAGS_PATH);
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        let tags: TagsResponse = serde_json::from_str(&body)?;
        debug!("Inference service reports {} installed models", tags.models.len());

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn chat(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let url = format!("{}{}", self.base_url, CHAT_PATH);
        let response = self.client.post(&url).json(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        let chat: ChatResponse = serde_json::from_str(&body)?;
        debug!(
            "Chat call to {} returned {} chars",
            request.model,
            chat.message.content.chars().count()
        );

        Ok(chat.message.content)
    }

    async fn chat_stream(&self, request: &ChatRequest) -> Result<ChatStream, LlmError> {
        let url = format!("{}{}", self.base_url, CHAT_PATH);
        let response = self.client.post(&url).json(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        debug!("Streaming chat from {}", request.model);
        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(LlmError::from))
            .boxed();
        Ok(stream_deltas(bytes))
    }
}

/// Splits an NDJSON byte stream into assistant text deltas.
///
/// Lines may span chunk boundaries. Lines that do not parse are skipped, and
/// empty deltas (such as the final `done` line) are dropped. An `error` line
/// or a transport failure is yielded once and ends the stream.
fn stream_deltas(bytes: BoxStream<'static, Result<Vec<u8>, LlmError>>) -> ChatStream {
    stream::unfold(
        (bytes, Vec::<u8>::new(), false),
        |(mut bytes, mut buffer, mut exhausted)| async move {
            loop {
                let newline = buffer.iter().position(|b| *b == b'\n');
                let line: Vec<u8> = if let Some(end) = newline {
                    buffer.drain(..=end).collect()
                } else if exhausted {
                    if buffer.is_empty() {
                        return None;
                    }
                    std::mem::take(&mut buffer)
                } else {
                    match bytes.next().await {
                        Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                        Some(Err(e)) => return Some((Err(e), (bytes, Vec::new(), true))),
                        None => exhausted = true,
                    }
                    continue;
                };

                match parse_stream_line(&line) {
                    Some(Ok(delta)) => return Some((Ok(delta), (bytes, buffer, exhausted))),
                    Some(Err(e)) => return Some((Err(e), (bytes, Vec::new(), true))),
                    None => {}
                }
            }
        },
    )
    .boxed()
}

fn parse_stream_line(line: &[u8]) -> Option<Result<String, LlmError>> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    match serde_json::from_str::<ChatStreamLine>(text) {
        Ok(ChatStreamLine {
            error: Some(message),
            ..
        }) => Some(Err(LlmError::Stream(message))),
        Ok(line) => line
            .message
            .map(|m| m.content)
            .filter(|content| !content.is_empty())
            .map(Ok),
        Err(e) => {
            debug!("Skipping unreadable stream line: {e}");
            None
        }
    }
}

//! Generation-service adapter.
//!
//! One trait, [`GenerationAdapter`], hides the provider wire formats from
//! the actors: `complete` for single-shot calls (fact-checking,
//! evaluation) and `stream` for live panel turns, which forwards text
//! increments over a channel and resolves to the full text. The HTTP
//! implementation speaks the Anthropic messages API and the
//! OpenAI-compatible chat-completions API, chosen per model by the
//! catalog's [`ProviderConfig`].

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::actors::model_config::{resolve_api_key, ModelConfigError, ProviderConfig};

const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum AdapterError {
    #[error("missing credential: {0} is not set")]
    MissingCredential(String),
    #[error("service error{}: {detail}", status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Service { status: Option<u16>, detail: String },
    #[error("parse error: {0}")]
    Parse(String),
}

impl AdapterError {
    /// Stable label for events and logs.
    pub fn category(&self) -> &'static str {
        match self {
            Self::MissingCredential(_) => "missing_credential",
            Self::Service { .. } => "service_error",
            Self::Parse(_) => "parse_error",
        }
    }
}

impl From<ModelConfigError> for AdapterError {
    fn from(err: ModelConfigError) -> Self {
        match err {
            ModelConfigError::MissingApiKey(env) => Self::MissingCredential(env),
            other => Self::Service {
                status: None,
                detail: other.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One role-tagged message in an outbound sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Per-call options: which provider/model to hit, system instructions,
/// and the token budget.
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    pub provider: ProviderConfig,
    pub system: Option<String>,
    pub max_tokens: u32,
}

impl GenerationOptions {
    pub fn new(provider: ProviderConfig) -> Self {
        Self {
            provider,
            system: None,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Uniform "produce text" capability over the provider zoo.
#[async_trait]
pub trait GenerationAdapter: Send + Sync {
    /// Single-shot completion.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<String, AdapterError>;

    /// Streaming completion. Increments are forwarded over `chunks` as
    /// they arrive; the resolved value is the full accumulated text. A
    /// dropped receiver never fails the call.
    async fn stream(
        &self,
        messages: &[ChatMessage],
        options: &GenerationOptions,
        chunks: mpsc::UnboundedSender<String>,
    ) -> Result<String, AdapterError>;
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    max_tokens: u32,
    stream: bool,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
}

#[derive(Deserialize)]
struct OpenAiChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

// ---------------------------------------------------------------------------
// HTTP adapter
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct HttpGenerationAdapter {
    client: reqwest::Client,
}

impl HttpGenerationAdapter {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    fn request_for(
        &self,
        messages: &[ChatMessage],
        options: &GenerationOptions,
        stream: bool,
    ) -> Result<reqwest::RequestBuilder, AdapterError> {
        let api_key = resolve_api_key(&options.provider)?;
        let (system, turns) = split_system(messages, options);

        match &options.provider {
            ProviderConfig::AnthropicCompatible {
                base_url, headers, model, ..
            } => {
                let body = AnthropicRequest {
                    model,
                    messages: turns
                        .iter()
                        .map(|(role, content)| WireMessage { role, content })
                        .collect(),
                    max_tokens: options.max_tokens,
                    system: system.as_deref(),
                    stream,
                };
                let url = format!("{}/v1/messages", base_url.trim_end_matches('/'));
                let mut request = self
                    .client
                    .post(url)
                    .header("x-api-key", api_key)
                    .header("anthropic-version", ANTHROPIC_VERSION)
                    .json(&body);
                for (name, value) in headers {
                    request = request.header(name, value);
                }
                Ok(request)
            }
            ProviderConfig::OpenAiGeneric {
                base_url, headers, model, ..
            } => {
                // OpenAI carries system instructions as a leading message
                let mut wire = Vec::with_capacity(turns.len() + 1);
                if let Some(system) = system.as_deref() {
                    wire.push(WireMessage {
                        role: "system",
                        content: system,
                    });
                }
                wire.extend(
                    turns
                        .iter()
                        .map(|(role, content)| WireMessage { role, content }),
                );
                let body = OpenAiRequest {
                    model,
                    messages: wire,
                    max_tokens: options.max_tokens,
                    stream,
                };
                let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));
                let mut request = self
                    .client
                    .post(url)
                    .bearer_auth(api_key)
                    .json(&body);
                for (name, value) in headers {
                    request = request.header(name, value);
                }
                Ok(request)
            }
        }
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, AdapterError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let detail = response.text().await.unwrap_or_default();
    Err(AdapterError::Service {
        status: Some(status.as_u16()),
        detail,
    })
}

fn send_error(err: reqwest::Error) -> AdapterError {
    AdapterError::Service {
        status: err.status().map(|s| s.as_u16()),
        detail: err.to_string(),
    }
}

#[async_trait]
impl GenerationAdapter for HttpGenerationAdapter {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<String, AdapterError> {
        let request = self.request_for(messages, options, false)?;
        let response = check_status(request.send().await.map_err(send_error)?).await?;

        match &options.provider {
            ProviderConfig::AnthropicCompatible { .. } => {
                let parsed: AnthropicResponse = response
                    .json()
                    .await
                    .map_err(|e| AdapterError::Parse(e.to_string()))?;
                Ok(parsed
                    .content
                    .iter()
                    .filter(|block| block.kind == "text")
                    .filter_map(|block| block.text.as_deref())
                    .collect::<Vec<_>>()
                    .join(""))
            }
            ProviderConfig::OpenAiGeneric { .. } => {
                let parsed: OpenAiResponse = response
                    .json()
                    .await
                    .map_err(|e| AdapterError::Parse(e.to_string()))?;
                parsed
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|choice| choice.message.content)
                    .ok_or_else(|| AdapterError::Parse("no completion choices returned".to_string()))
            }
        }
    }

    async fn stream(
        &self,
        messages: &[ChatMessage],
        options: &GenerationOptions,
        chunks: mpsc::UnboundedSender<String>,
    ) -> Result<String, AdapterError> {
        let request = self.request_for(messages, options, true)?;
        let response = check_status(request.send().await.map_err(send_error)?).await?;

        let anthropic = matches!(&options.provider, ProviderConfig::AnthropicCompatible { .. });
        let mut byte_stream = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();
        let mut seen_done = false;
        let mut full = String::new();

        'outer: while let Some(chunk) = byte_stream.next().await {
            let chunk = chunk.map_err(send_error)?;
            buffer.extend_from_slice(&chunk);
            for line in drain_sse_lines(&mut buffer) {
                let event = if anthropic {
                    parse_anthropic_sse(&line)
                } else {
                    parse_openai_sse(&line, &mut seen_done)
                };
                match event {
                    Some(SseEvent::Delta(text)) => {
                        full.push_str(&text);
                        let _ = chunks.send(text);
                    }
                    Some(SseEvent::Done) => break 'outer,
                    Some(SseEvent::ApiError(detail)) => {
                        return Err(AdapterError::Service {
                            status: None,
                            detail,
                        })
                    }
                    None => {}
                }
            }
        }

        Ok(full)
    }
}

// ---------------------------------------------------------------------------
// SSE parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum SseEvent {
    Delta(String),
    Done,
    ApiError(String),
}

/// Drain complete (newline-terminated) lines from the buffer, leaving any
/// partial tail for the next chunk. The buffer holds bytes, not text, so
/// a multi-byte character split across chunks stays intact until its line
/// completes.
fn drain_sse_lines(buffer: &mut Vec<u8>) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(newline_idx) = buffer.iter().position(|&b| b == b'\n') {
        let line = String::from_utf8_lossy(&buffer[..newline_idx])
            .trim()
            .to_string();
        buffer.drain(..=newline_idx);
        if !line.is_empty() {
            lines.push(line);
        }
    }
    lines
}

/// One line of the Anthropic SSE dialect: `content_block_delta` carries
/// text, `message_stop` ends the stream, `error` surfaces upstream
/// failures. Everything else is ignored.
fn parse_anthropic_sse(line: &str) -> Option<SseEvent> {
    let data = line.strip_prefix("data: ")?;
    let event: Value = serde_json::from_str(data).ok()?;
    match event.get("type").and_then(|v| v.as_str())? {
        "content_block_delta" => event
            .get("delta")
            .and_then(|d| d.get("text"))
            .and_then(|t| t.as_str())
            .map(|text| SseEvent::Delta(text.to_string())),
        "message_stop" => Some(SseEvent::Done),
        "error" => {
            let detail = event
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .unwrap_or("unknown stream error");
            Some(SseEvent::ApiError(detail.to_string()))
        }
        _ => None,
    }
}

/// One line of the OpenAI SSE dialect. Done can arrive twice (a
/// `finish_reason` followed by the `[DONE]` marker); `seen_done`
/// deduplicates.
fn parse_openai_sse(line: &str, seen_done: &mut bool) -> Option<SseEvent> {
    let data = line.strip_prefix("data: ")?;
    if data == "[DONE]" {
        if *seen_done {
            return None;
        }
        *seen_done = true;
        return Some(SseEvent::Done);
    }

    let event: Value = serde_json::from_str(data).ok()?;
    if let Some(error) = event.get("error") {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown stream error");
        return Some(SseEvent::ApiError(message.to_string()));
    }

    let choice = event.get("choices").and_then(|c| c.as_array())?.first()?;

    if let Some(content) = choice
        .get("delta")
        .and_then(|d| d.get("content"))
        .and_then(|c| c.as_str())
    {
        if !content.is_empty() {
            return Some(SseEvent::Delta(content.to_string()));
        }
    }

    if choice.get("finish_reason").and_then(|f| f.as_str()).is_some() && !*seen_done {
        *seen_done = true;
        return Some(SseEvent::Done);
    }

    None
}

/// Fold system-role messages and the per-call system option into one
/// instruction block, leaving only user/assistant turns on the wire.
fn split_system<'a>(
    messages: &'a [ChatMessage],
    options: &'a GenerationOptions,
) -> (Option<String>, Vec<(&'static str, &'a str)>) {
    let mut system_parts: Vec<&str> = Vec::new();
    if let Some(system) = options.system.as_deref() {
        system_parts.push(system);
    }

    let mut turns = Vec::with_capacity(messages.len());
    for message in messages {
        match message.role {
            ChatRole::System => system_parts.push(&message.content),
            role => turns.push((role.as_str(), message.content.as_str())),
        }
    }

    let system = if system_parts.is_empty() {
        None
    } else {
        Some(system_parts.join("\n\n"))
    };
    (system, turns)
}

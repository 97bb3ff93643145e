//! Chat-completion clients for the buyer generator.
//!
//! OpenAI and Ollama share the `/chat/completions` wire format; Anthropic uses its own
//! `/messages` endpoint. Callers only ever see plain text or an [`LlmError`].

use std::time::Duration;

use async_trait::async_trait;
use pitchsim_core::config::{LlmConfig, LlmProvider};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const RETRY_BACKOFF_MS: u64 = 250;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub top_p: Option<f32>,
    pub max_tokens: u32,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("provider `{0}` requires an api key")]
    MissingCredentials(&'static str),
    #[error("request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("upstream returned status {status}")]
    Status { status: u16, body: String },
    #[error("malformed completion payload: {0}")]
    Malformed(String),
    #[error("completion contained no text")]
    Empty,
}

impl LlmError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError>;
}

pub struct HttpLlmClient {
    client: Client,
    provider: LlmProvider,
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
    timeout: Duration,
    max_retries: u32,
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        if !config.has_credentials() {
            return Err(LlmError::MissingCredentials(provider_name(config.provider)));
        }

        let timeout = Duration::from_secs(config.timeout_secs);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| LlmError::Transport(error.to_string()))?;

        Ok(Self {
            client,
            provider: config.provider,
            base_url: config.endpoint_base().to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            timeout,
            max_retries: config.max_retries,
        })
    }

    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    async fn send_once(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let builder = match self.provider {
            LlmProvider::Anthropic => {
                let builder = self
                    .client
                    .post(format!("{}/messages", self.base_url))
                    .header("anthropic-version", ANTHROPIC_VERSION)
                    .json(&anthropic_body(&self.model, request));
                match &self.api_key {
                    Some(key) => builder.header("x-api-key", key.expose_secret()),
                    None => builder,
                }
            }
            LlmProvider::OpenAi | LlmProvider::Ollama => {
                let builder = self
                    .client
                    .post(format!("{}/chat/completions", self.base_url))
                    .json(&chat_completions_body(&self.model, request));
                match &self.api_key {
                    Some(key) => builder.bearer_auth(key.expose_secret()),
                    None => builder,
                }
            }
        };

        let response = builder.send().await.map_err(|error| {
            if error.is_timeout() {
                LlmError::Timeout { timeout_secs: self.timeout.as_secs() }
            } else {
                LlmError::Transport(error.to_string())
            }
        })?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status { status: status.as_u16(), body });
        }

        let payload = response
            .json::<Value>()
            .await
            .map_err(|error| LlmError::Malformed(error.to_string()))?;

        match self.provider {
            LlmProvider::Anthropic => extract_anthropic_text(&payload),
            LlmProvider::OpenAi | LlmProvider::Ollama => extract_chat_completion_text(&payload),
        }
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let mut attempt = 0;
        loop {
            match self.send_once(request).await {
                Ok(text) => return Ok(text),
                Err(error) if error.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    debug!(
                        event_name = "agent.llm.retry",
                        provider = provider_name(self.provider),
                        attempt,
                        error = %error,
                        "retrying completion request"
                    );
                    tokio::time::sleep(Duration::from_millis(RETRY_BACKOFF_MS * u64::from(attempt)))
                        .await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

pub fn provider_name(provider: LlmProvider) -> &'static str {
    match provider {
        LlmProvider::OpenAi => "openai",
        LlmProvider::Anthropic => "anthropic",
        LlmProvider::Ollama => "ollama",
    }
}

fn chat_completions_body(model: &str, request: &CompletionRequest) -> Value {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    messages.push(json!({ "role": ChatRole::System, "content": request.system }));
    messages.extend(
        request.messages.iter().map(|message| json!({ "role": message.role, "content": message.content })),
    );

    let mut body = json!({
        "model": model,
        "messages": messages,
        "temperature": request.temperature,
        "max_tokens": request.max_tokens,
    });
    if let Some(top_p) = request.top_p {
        body["top_p"] = json!(top_p);
    }
    body
}

fn anthropic_body(model: &str, request: &CompletionRequest) -> Value {
    json!({
        "model": model,
        "system": request.system,
        "messages": request.messages,
        // Anthropic rejects temperatures above 1.0.
        "temperature": request.temperature.min(1.0),
        "max_tokens": request.max_tokens,
    })
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

fn extract_chat_completion_text(payload: &Value) -> Result<String, LlmError> {
    let completion = ChatCompletion::deserialize(payload)
        .map_err(|error| LlmError::Malformed(error.to_string()))?;
    let text = completion
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .unwrap_or_default();
    non_empty(text)
}

fn extract_anthropic_text(payload: &Value) -> Result<String, LlmError> {
    let blocks = payload
        .get("content")
        .and_then(Value::as_array)
        .ok_or_else(|| LlmError::Malformed("missing `content` array".to_string()))?;
    let text = blocks
        .iter()
        .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|block| block.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join(" ");
    non_empty(text.trim().to_string())
}

fn non_empty(text: String) -> Result<String, LlmError> {
    if text.is_empty() {
        Err(LlmError::Empty)
    } else {
        Ok(text)
    }
}

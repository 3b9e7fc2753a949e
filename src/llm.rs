//! Chat completion client for OpenAI-compatible endpoints.
//!
//! [`OpenAiCompatibleChat`] posts to `{base_url}/chat/completions`; the
//! default targets Groq with `llama3-8b-8192` at temperature 0. Failures
//! surface as [`ChatError`] inside the returned `anyhow::Error`, classified
//! as transient (network, 429, 5xx) or permanent (anything else).
//!
//! [`RetryingChat`] wraps any [`ChatModel`] and retries transient failures
//! with exponential backoff. It is only installed when `llm.max_retries > 0`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use helpdesk_rag_core::llm::ChatModel;
use helpdesk_rag_core::Turn;

use crate::config::LlmConfig;

/// Classified chat backend failure.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Worth retrying: connection problems, rate limits, server errors.
    #[error("transient chat failure: {0}")]
    Transient(String),
    /// Not worth retrying: bad request, auth failure, malformed response.
    #[error("chat request failed: {0}")]
    Permanent(String),
}

impl ChatError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ChatError::Transient(_))
    }

    fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        let message = format!("API error {}: {}", status, body);
        if status.as_u16() == 429 || status.is_server_error() {
            ChatError::Transient(message)
        } else {
            ChatError::Permanent(message)
        }
    }
}

/// True when `err` carries a [`ChatError::Transient`].
pub fn is_transient(err: &anyhow::Error) -> bool {
    err.downcast_ref::<ChatError>()
        .map(ChatError::is_transient)
        .unwrap_or(false)
}

#[derive(Serialize)]
struct ChatCompletionsRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<WireMessage<'a>>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionsResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// HTTP chat model speaking the OpenAI chat completions protocol.
pub struct OpenAiCompatibleChat {
    base_url: String,
    model: String,
    temperature: f32,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAiCompatibleChat {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        temperature: f32,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            temperature,
            api_key,
            client,
        })
    }

    /// Build from config, reading the API key from `llm.api_key_env`.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).with_context(|| {
            format!("{} environment variable not set", config.api_key_env)
        })?;
        Self::new(
            &config.base_url,
            &config.model,
            config.temperature,
            Some(api_key),
            config.timeout(),
        )
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl ChatModel for OpenAiCompatibleChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system: &str, messages: &[Turn]) -> Result<String> {
        let mut wire = Vec::with_capacity(messages.len() + 1);
        wire.push(WireMessage {
            role: "system",
            content: system,
        });
        wire.extend(messages.iter().map(|turn| WireMessage {
            role: turn.role.as_str(),
            content: &turn.content,
        }));

        let request = ChatCompletionsRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: wire,
        };

        let mut builder = self
            .client
            .post(self.endpoint())
            .header("Content-Type", "application/json")
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ChatError::Transient(format!("{} unreachable: {}", self.base_url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::from_status(status, body).into());
        }

        let parsed: ChatCompletionsResponse = response
            .json()
            .await
            .map_err(|e| ChatError::Permanent(format!("malformed response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ChatError::Permanent("response has no message content".into()).into())
    }
}

/// Retries transient failures of the wrapped model with exponential backoff.
pub struct RetryingChat<M> {
    inner: M,
    max_retries: u32,
    base_delay: Duration,
}

impl<M: ChatModel> RetryingChat<M> {
    pub fn new(inner: M, max_retries: u32) -> Self {
        Self {
            inner,
            max_retries,
            base_delay: Duration::from_secs(1),
        }
    }

    /// Override the first backoff step (doubles per attempt, capped at 2^5).
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    fn delay(&self, attempt: u32) -> Duration {
        self.base_delay * (1u32 << (attempt - 1).min(5))
    }
}

#[async_trait]
impl<M: ChatModel> ChatModel for RetryingChat<M> {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    async fn complete(&self, system: &str, messages: &[Turn]) -> Result<String> {
        let mut attempt = 0;
        loop {
            match self.inner.complete(system, messages).await {
                Ok(text) => return Ok(text),
                Err(e) if is_transient(&e) && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.delay(attempt);
                    warn!(
                        model = self.inner.model_name(),
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "chat request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Build the configured chat model, adding the retry layer when enabled.
pub fn create_chat_model(config: &LlmConfig) -> Result<Arc<dyn ChatModel>> {
    let chat = OpenAiCompatibleChat::from_config(config)?;
    if config.max_retries > 0 {
        Ok(Arc::new(RetryingChat::new(chat, config.max_retries)))
    } else {
        Ok(Arc::new(chat))
    }
}

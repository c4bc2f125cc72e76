//! Async client for the remote reasoning backend
//!
//! Model-agnostic HTTP client for chat-completion APIs. Supports Anthropic
//! and OpenAI-compatible endpoints (DeepSeek, local servers, etc).
//! The backend only classifies and phrases; it never decides what gets logged.

use crate::core::error::{Result, VoiceError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Anything that can turn a system + user prompt into text
///
/// Implemented by [`LlmClient`]; tests and embedders supply their own.
#[async_trait]
pub trait ReasoningBackend: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

/// Run one backend completion bounded by `timeout` and `cancel`
///
/// Whichever finishes first wins; on timeout or cancellation the in-flight
/// request is dropped and an error is returned without further waiting.
pub async fn complete_within(
    backend: &dyn ReasoningBackend,
    system: &str,
    user: &str,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<String> {
    let call = backend.complete(system, user);

    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        reply = tokio::time::timeout(timeout, call) => Some(reply),
    };

    match outcome {
        None => Err(VoiceError::Cancelled),
        Some(Err(_elapsed)) => Err(VoiceError::Timeout(timeout.as_millis() as u64)),
        Some(Ok(reply)) => reply,
    }
}

/// API format type
#[derive(Debug, Clone, PartialEq)]
pub enum ApiFormat {
    Anthropic,
    OpenAI,
}

/// HTTP reasoning backend
pub struct LlmClient {
    client: Client,
    api_key: String,
    api_url: String,
    model: String,
    api_format: ApiFormat,
    max_tokens: u32,
}

impl LlmClient {
    /// Create a new LLM client with explicit configuration
    pub fn new(api_key: String, api_url: String, model: String) -> Self {
        let api_format = Self::detect_api_format(&api_url);
        Self {
            client: Client::new(),
            api_key,
            api_url,
            model,
            api_format,
            // Intent replies are a single small JSON object
            max_tokens: 512,
        }
    }

    fn detect_api_format(url: &str) -> ApiFormat {
        if url.contains("anthropic.com") {
            ApiFormat::Anthropic
        } else {
            ApiFormat::OpenAI
        }
    }

    /// Create a client from environment variables
    ///
    /// Required: LLM_API_KEY
    /// Optional: LLM_API_URL (defaults to Anthropic API)
    /// Optional: LLM_MODEL (defaults to claude-3-haiku-20240307)
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("LLM_API_KEY")
            .map_err(|_| VoiceError::Config("LLM_API_KEY not set".into()))?;
        let api_url = std::env::var("LLM_API_URL")
            .unwrap_or_else(|_| "https://api.anthropic.com/v1/messages".into());
        let model = std::env::var("LLM_MODEL").unwrap_or_else(|_| "claude-3-haiku-20240307".into());

        Ok(Self::new(api_key, api_url, model))
    }

    pub fn api_format(&self) -> &ApiFormat {
        &self.api_format
    }

    async fn complete_anthropic(&self, system: &str, user: &str) -> Result<String> {
        let request = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: system.into(),
            messages: vec![Message {
                role: "user".into(),
                content: user.into(),
            }],
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| VoiceError::Backend(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(VoiceError::Backend(format!("API error {}: {}", status, error_text)));
        }

        let completion: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| VoiceError::MalformedReply(e.to_string()))?;

        completion
            .content
            .first()
            .map(|c| c.text.clone())
            .ok_or_else(|| VoiceError::MalformedReply("Empty response".into()))
    }

    async fn complete_openai(&self, system: &str, user: &str) -> Result<String> {
        let request = OpenAIRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            messages: vec![
                Message {
                    role: "system".into(),
                    content: system.into(),
                },
                Message {
                    role: "user".into(),
                    content: user.into(),
                },
            ],
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| VoiceError::Backend(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(VoiceError::Backend(format!("API error {}: {}", status, error_text)));
        }

        let completion: OpenAIResponse = response
            .json()
            .await
            .map_err(|e| VoiceError::MalformedReply(e.to_string()))?;

        completion
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| VoiceError::MalformedReply("Empty response".into()))
    }
}

#[async_trait]
impl ReasoningBackend for LlmClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        match self.api_format {
            ApiFormat::Anthropic => self.complete_anthropic(system, user).await,
            ApiFormat::OpenAI => self.complete_openai(system, user).await,
        }
    }
}

// Anthropic API format
#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<Message>,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    text: String,
}

// OpenAI-compatible API format
#[derive(Serialize)]
struct OpenAIRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<Message>,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[derive(Serialize)]
struct Message {
    role: String,
    content: String,
}

//! LLM Client: the single point of entry for chat-completion calls.
//!
//! Speaks the OpenAI-compatible `/chat/completions` wire format (OpenAI, Azure
//! OpenAI, and any gateway that mirrors it). Retries transient failures with a
//! fixed backoff.

use std::time::Duration;

use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{AiConfig, AiProvider};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("AI response is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("AI response missing choices array")]
    MissingChoices,

    #[error("AI response content is not text")]
    NonTextContent,

    #[error("Empty response from AI provider")]
    EmptyContent,
}

impl LlmError {
    /// 429 and 5xx are retried. Any other 4xx (bad key, bad request) fails on the
    /// first attempt.
    fn is_retryable(&self) -> bool {
        match self {
            LlmError::Api { status, .. } => *status == 429 || *status >= 500,
            _ => true,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl ChatResponse {
    /// Text of the first choice.
    pub fn text(&self) -> Result<&str, LlmError> {
        let choice = self.choices.first().ok_or(LlmError::MissingChoices)?;
        match choice.message.as_ref().and_then(|m| m.content.as_ref()) {
            Some(serde_json::Value::String(text)) => Ok(text.as_str()),
            _ => Err(LlmError::NonTextContent),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    url: String,
    provider: AiProvider,
    api_key: String,
    org: Option<String>,
    model: String,
    temperature: f32,
    json_mode: bool,
    max_attempts: u32,
    backoff: Duration,
}

impl LlmClient {
    pub fn new(config: &AiConfig, api_key: String) -> Result<Self, LlmError> {
        Ok(Self {
            client: Client::builder().timeout(config.timeout).build()?,
            url: config.completions_url(),
            provider: config.provider.clone(),
            api_key,
            org: config.org.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            json_mode: config.response_format_json,
            max_attempts: config.max_retries.max(1),
            backoff: config.retry_backoff,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request(&self, body: &ChatRequest<'_>) -> reqwest::RequestBuilder {
        let builder = self.client.post(&self.url).json(body);
        let builder = match self.provider {
            AiProvider::Azure => builder.header("api-key", &self.api_key),
            AiProvider::OpenAi => builder.bearer_auth(&self.api_key),
        };
        match &self.org {
            Some(org) => builder.header("OpenAI-Organization", org),
            None => builder,
        }
    }

    async fn attempt<T: DeserializeOwned>(&self, body: &ChatRequest<'_>) -> Result<T, LlmError> {
        let response = self.request(body).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorEnvelope>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let chat: ChatResponse = response.json().await?;
        if let Some(usage) = &chat.usage {
            debug!(
                "LLM call succeeded: prompt_tokens={}, completion_tokens={}",
                usage.prompt_tokens, usage.completion_tokens
            );
        }

        let text = extract_json_block(chat.text()?)?;
        Ok(serde_json::from_str(text)?)
    }

    /// Sends `system` + `user` and deserializes the reply as JSON.
    /// Retries up to the configured attempt count; returns the last error on exhaustion.
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        system: &str,
        user: &str,
    ) -> Result<T, LlmError> {
        let mut messages = Vec::with_capacity(2);
        if !system.is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: user,
        });

        let body = ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
            response_format: self.json_mode.then_some(ResponseFormat {
                format_type: "json_object",
            }),
        };

        let mut attempt = 1;
        loop {
            match self.attempt(&body).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    warn!(
                        "AI enrichment attempt {}/{} failed: {}",
                        attempt, self.max_attempts, e
                    );
                    tokio::time::sleep(self.backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(
                        "AI enrichment attempt {}/{} failed: {}",
                        attempt, self.max_attempts, e
                    );
                    return Err(e);
                }
            }
        }
    }
}

/// Pulls the JSON object out of model output, tolerating ``` / ```json fences
/// anywhere in the text.
pub fn extract_json_block(text: &str) -> Result<&str, LlmError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(LlmError::EmptyContent);
    }
    if text.contains("```") {
        for segment in text.split("```") {
            let segment = segment.trim();
            let segment = segment.strip_prefix("json").map(str::trim).unwrap_or(segment);
            if segment.starts_with('{') && segment.ends_with('}') {
                return Ok(segment);
            }
        }
    }
    Ok(text)
}

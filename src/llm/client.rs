//! Chat completion client for OpenAI-compatible and Azure OpenAI endpoints.

use crate::config::LlmConfig;
use crate::error::{EvalError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Message role in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// A message in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Request body for chat completion.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

/// Response from chat completion.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

/// OpenAI API error response.
#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Response from an LLM call.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// The generated content (`choices[0].message.content`).
    pub content: String,
    /// The full response body, kept so it can be written to disk as-is.
    pub raw: serde_json::Value,
}

impl LlmResponse {
    /// Build a response around plain content, shaped like a real completion body.
    pub fn from_content(content: impl Into<String>) -> Self {
        let content = content.into();
        let raw = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }]
        });
        Self { content, raw }
    }
}

/// Anything that can answer a chat prompt.
///
/// [`LlmClient`] is the production implementation; the judge, the answer
/// generator and the pipeline only depend on this trait.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send a chat completion request.
    async fn chat(&self, messages: Vec<Message>) -> Result<LlmResponse>;

    /// Convenience method: single user message with optional system prompt.
    async fn complete(&self, system: Option<&str>, user: &str) -> Result<String> {
        let mut messages = Vec::new();

        if let Some(sys) = system {
            messages.push(Message::system(sys));
        }
        messages.push(Message::user(user));

        let response = self.chat(messages).await?;
        Ok(response.content)
    }
}

#[async_trait]
impl<T: ChatBackend + ?Sized> ChatBackend for Arc<T> {
    async fn chat(&self, messages: Vec<Message>) -> Result<LlmResponse> {
        (**self).chat(messages).await
    }
}

/// OpenAI-compatible / Azure OpenAI LLM client.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    config: LlmConfig,
}

impl LlmClient {
    /// Create a new LLM client with the given configuration.
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    /// The model (or Azure deployment) this client talks to.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Get the API endpoint URL for the configured request convention.
    fn endpoint(&self) -> String {
        let base = self.config.api_base.trim_end_matches('/');
        if self.config.is_azure {
            format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                base, self.config.model, self.config.api_version
            )
        } else if base.ends_with("/v1") {
            format!("{}/chat/completions", base)
        } else {
            format!("{}/v1/chat/completions", base)
        }
    }

    /// Test connectivity to the API.
    pub async fn test_connection(&self) -> Result<()> {
        let messages = vec![Message::user("Say 'hello' and nothing else.")];

        let response = self.chat(messages).await?;

        if response.content.to_lowercase().contains("hello") {
            Ok(())
        } else {
            Err(EvalError::LlmApi(format!(
                "Unexpected response: {}",
                response.content
            )))
        }
    }
}

#[async_trait]
impl ChatBackend for LlmClient {
    async fn chat(&self, messages: Vec<Message>) -> Result<LlmResponse> {
        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages,
            max_tokens: Some(self.config.max_tokens),
            temperature: Some(self.config.temperature),
        };

        let mut builder = self
            .client
            .post(self.endpoint())
            .header("Content-Type", "application/json");
        builder = if self.config.is_azure {
            builder.header("api-key", &self.config.api_key)
        } else {
            builder.header("Authorization", format!("Bearer {}", self.config.api_key))
        };

        let response = builder.json(&request).send().await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            // Try to parse as API error
            if let Ok(api_error) = serde_json::from_str::<ApiError>(&body) {
                return Err(EvalError::LlmApi(format!(
                    "API error ({}): {}",
                    status, api_error.error.message
                )));
            }
            return Err(EvalError::LlmApi(format!(
                "Request failed ({}): {}",
                status, body
            )));
        }

        let raw: serde_json::Value = serde_json::from_str(&body)?;
        let completion: ChatCompletionResponse = serde_json::from_value(raw.clone())?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| EvalError::LlmApi("No choices in response".to_string()))?;

        let content = choice
            .message
            .content
            .ok_or_else(|| EvalError::LlmApi("Response message has no content".to_string()))?;

        if let Some(usage) = &completion.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "chat completion finished"
            );
        }

        Ok(LlmResponse { content, raw })
    }
}

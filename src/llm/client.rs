//! OpenAI-compatible LLM client.
//!
//! Works with any OpenAI-compatible chat completions endpoint. The
//! chat pipeline uses it for query rewriting and answer generation.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::error::{RagBenchError, Result};
use crate::retry::{Backoff, RetryPolicy};

/// Message role in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
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

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Request body for chat completion.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
}

/// Response from chat completion.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
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

/// OpenAI-compatible LLM client.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    config: LlmConfig,
    retry: RetryPolicy,
}

impl LlmClient {
    /// Create a new LLM client with the given configuration.
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: Client::new(),
            config,
            retry: RetryPolicy::new(3, Backoff::Exponential(Duration::from_secs(1))),
        }
    }

    /// Get the API endpoint URL.
    fn endpoint(&self) -> String {
        let base = self.config.api_base.trim_end_matches('/');
        format!("{}/v1/chat/completions", base)
    }

    /// Send a chat completion request and return the first choice.
    pub async fn chat(&self, messages: Vec<Message>) -> Result<String> {
        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages,
            temperature: self.config.temperature,
        };

        self.retry.run(|| self.post_chat(&request)).await
    }

    /// Convenience method: single user message, trimmed response.
    pub async fn complete(&self, prompt: &str) -> Result<String> {
        let content = self.chat(vec![Message::user(prompt)]).await?;
        Ok(content.trim().to_string())
    }

    async fn post_chat(&self, request: &ChatCompletionRequest) -> Result<String> {
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| RagBenchError::transport("llm", e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RagBenchError::transport("llm", e.to_string()))?;

        if !status.is_success() {
            // Prefer the structured error message when the body has one
            let detail = match serde_json::from_str::<ApiError>(&body) {
                Ok(api_error) => api_error.error.message,
                Err(_) => body,
            };
            return Err(RagBenchError::Api {
                service: "llm",
                status: status.as_u16(),
                detail,
            });
        }

        let completion: ChatCompletionResponse =
            serde_json::from_str(&body).map_err(|e| RagBenchError::MalformedResponse {
                service: "llm",
                detail: e.to_string(),
            })?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| RagBenchError::MalformedResponse {
                service: "llm",
                detail: "no choices in response".to_string(),
            })
    }
}

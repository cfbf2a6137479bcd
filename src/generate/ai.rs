//! OpenAI-compatible chat completion client for sentence generation.
//!
//! The response is untrusted text; all structural validation happens in the
//! generator, never here.

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Error type for completion calls.
#[derive(Debug, Clone, Error)]
pub enum AiError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Request failed: {0}")]
    RequestFailed(String),
    #[error("Parse error: {0}")]
    ParseError(String),
}

/// A text-completion model that can produce one candidate sentence.
///
/// One request per generation, no retries; a failed call falls through to
/// the deterministic templates.
#[async_trait]
pub trait SentenceModel: Send + Sync + fmt::Debug {
    async fn complete(&self, system: &str, user: &str) -> Result<String, AiError>;
}

/// Chat-completions client for any OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct ChatCompletionClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    timeout: Duration,
}

impl ChatCompletionClient {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_key,
            model: model.into(),
            timeout,
        }
    }

    fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn auth_header(&self) -> Option<String> {
        self.api_key.as_ref().map(|k| format!("Bearer {}", k))
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: MessageResponse,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Option<String>,
}

#[async_trait]
impl SentenceModel for ChatCompletionClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String, AiError> {
        let chat_request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            max_tokens: 160,
            temperature: 0.7,
        };

        let mut http_request = self
            .client
            .post(self.chat_completions_url())
            .timeout(self.timeout);
        if let Some(auth) = self.auth_header() {
            http_request = http_request.header(header::AUTHORIZATION, auth);
        }

        let response = http_request
            .json(&chat_request)
            .send()
            .await
            .map_err(|e| AiError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AiError::RequestFailed(format!("HTTP {}: {}", status, body)));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| AiError::ParseError(e.to_string()))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AiError::ParseError("No choices in response".to_string()))
    }
}

/// Mock model that returns a canned response or a canned failure.
#[derive(Debug, Clone)]
pub struct MockSentenceModel {
    response: Result<String, String>,
}

impl MockSentenceModel {
    /// Always return the given text.
    pub fn returning(text: &str) -> Self {
        Self {
            response: Ok(text.to_string()),
        }
    }

    /// Always fail as if the service were down.
    pub fn failing(message: &str) -> Self {
        Self {
            response: Err(message.to_string()),
        }
    }
}

#[async_trait]
impl SentenceModel for MockSentenceModel {
    async fn complete(&self, _system: &str, _user: &str) -> Result<String, AiError> {
        self.response
            .clone()
            .map_err(AiError::RequestFailed)
    }
}

//! Text-generation responder interface
//!
//! A responder turns a chat request into a completion. The batch runner only
//! depends on the [`Responder`] trait; concrete adapters live in
//! [`crate::http`] and [`EchoResponder`] serves offline dry runs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::models::{Cost, TokenUsage};

/// Responder errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResponderError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("Connection refused to {0}")]
    ConnectionRefused(String),

    #[error("HTTP {code}: {body}")]
    Status { code: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Request cancelled")]
    Cancelled,
}

impl ResponderError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ResponderError::Cancelled)
    }
}

/// Role of a chat message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// One completion request
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub system_prompt: Option<String>,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: vec![ChatMessage::user(prompt)],
            temperature: None,
            max_tokens: None,
            system_prompt: None,
        }
    }

    /// Text of the last user message
    pub fn prompt(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("")
    }

    /// Messages with the system prompt, if any, prepended
    pub fn full_messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.messages.len() + 1);
        if let Some(system) = &self.system_prompt {
            messages.push(ChatMessage::system(system.clone()));
        }
        messages.extend(self.messages.iter().cloned());
        messages
    }
}

/// Call metadata reported alongside a completion
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub latency_ms: u64,
    pub provider: String,
    pub model: String,
    pub finish_reason: Option<String>,
}

/// One completion
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
    pub usage: TokenUsage,
    pub cost: Cost,
    pub metadata: ResponseMetadata,
}

/// A remote text-generation endpoint.
///
/// Implementations should return [`ResponderError::Cancelled`] promptly once
/// `cancel` fires; the runner records that as a cancelled run.
#[async_trait]
pub trait Responder: Send + Sync {
    /// Provider identifier used in logs and session records
    fn id(&self) -> &str;

    async fn call(
        &self,
        request: CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<CompletionResponse, ResponderError>;
}

/// Offline responder that answers with the prompt itself
#[derive(Clone, Debug, Default)]
pub struct EchoResponder {
    prefix: String,
}

impl EchoResponder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

#[async_trait]
impl Responder for EchoResponder {
    fn id(&self) -> &str {
        "echo"
    }

    async fn call(
        &self,
        request: CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<CompletionResponse, ResponderError> {
        if cancel.is_cancelled() {
            return Err(ResponderError::Cancelled);
        }

        let start = Instant::now();
        let content = format!("{}{}", self.prefix, request.prompt());
        let input_tokens = request
            .full_messages()
            .iter()
            .map(|m| m.content.split_whitespace().count() as u64)
            .sum();
        let output_tokens = content.split_whitespace().count() as u64;

        Ok(CompletionResponse {
            content,
            usage: TokenUsage::new(input_tokens, output_tokens),
            cost: Cost::default(),
            metadata: ResponseMetadata {
                latency_ms: start.elapsed().as_millis() as u64,
                provider: self.id().to_string(),
                model: request.model,
                finish_reason: Some("stop".to_string()),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_messages() {
        let mut request = CompletionRequest::new("m", "hello");
        assert_eq!(request.prompt(), "hello");
        assert_eq!(request.full_messages().len(), 1);

        request.system_prompt = Some("be terse".to_string());
        let messages = request.full_messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1], ChatMessage::user("hello"));
    }

    #[tokio::test]
    async fn test_echo_responder() {
        let responder = EchoResponder::with_prefix("echo: ");
        let response = tokio_test::assert_ok!(
            responder
                .call(
                    CompletionRequest::new("m", "two words"),
                    &CancellationToken::new()
                )
                .await
        );

        assert_eq!(response.content, "echo: two words");
        assert_eq!(response.usage.input_tokens, 2);
        assert_eq!(response.usage.output_tokens, 3);
        assert_eq!(response.usage.total_tokens, 5);
        assert_eq!(response.metadata.provider, "echo");
    }

    #[tokio::test]
    async fn test_echo_honours_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = EchoResponder::new()
            .call(CompletionRequest::new("m", "hi"), &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_error_display() {
        let err = ResponderError::Status {
            code: 429,
            body: "rate limited".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 429: rate limited");
        assert_eq!(ResponderError::Timeout(30).to_string(), "Timeout after 30 seconds");
    }
}

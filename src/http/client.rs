//! OpenAI-compatible chat completion client
//!
//! Sends one `/chat/completions` request per call and maps transport and
//! status failures onto [`ResponderError`].

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::models::{Cost, TokenUsage};
use crate::responder::{
    ChatMessage, CompletionRequest, CompletionResponse, Responder, ResponderError,
    ResponseMetadata,
};

/// Price per million tokens, in USD
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl Pricing {
    pub fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }

    pub fn cost(&self, usage: &TokenUsage) -> Cost {
        Cost::new(
            usage.input_tokens as f64 * self.input_per_million / 1_000_000.0,
            usage.output_tokens as f64 * self.output_per_million / 1_000_000.0,
        )
    }
}

#[derive(Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ChatCompletionReply {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

/// Responder for any endpoint speaking the OpenAI chat completions protocol
#[derive(Clone)]
pub struct OpenAiCompatibleResponder {
    id: String,
    client: Client,
    base_url: String,
    api_key: Option<String>,
    timeout_secs: u64,
    pricing: Pricing,
}

impl OpenAiCompatibleResponder {
    /// Create a responder with the default 60 second timeout
    pub fn new(id: impl Into<String>, base_url: impl Into<String>) -> Result<Self, ResponderError> {
        Self::with_timeout(id, base_url, 60)
    }

    /// Create a responder with a custom timeout
    pub fn with_timeout(
        id: impl Into<String>,
        base_url: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, ResponderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ResponderError::RequestFailed(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            id: id.into(),
            client,
            base_url: base_url.into(),
            api_key: None,
            timeout_secs,
            pricing: Pricing::default(),
        })
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn pricing(mut self, pricing: Pricing) -> Self {
        self.pricing = pricing;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    async fn send(&self, request: &CompletionRequest) -> Result<CompletionResponse, ResponderError> {
        let url = self.endpoint();
        let body = ChatCompletionBody {
            model: &request.model,
            messages: request.full_messages(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        debug!("Sending completion request to {} ({})", url, request.model);

        let mut builder = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let start = Instant::now();
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ResponderError::Timeout(self.timeout_secs)
            } else if e.is_connect() {
                ResponderError::ConnectionRefused(url.clone())
            } else {
                ResponderError::RequestFailed(e.to_string())
            }
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ResponderError::RequestFailed(format!("Failed to read response body: {e}")))?;
        let latency_ms = start.elapsed().as_millis() as u64;

        debug!(
            "Response: {} {} in {}ms",
            status.as_u16(),
            status.canonical_reason().unwrap_or(""),
            latency_ms
        );

        if !status.is_success() {
            return Err(ResponderError::Status {
                code: status.as_u16(),
                body: text,
            });
        }

        parse_reply(&text, request, &self.id, self.pricing, latency_ms)
    }
}

fn parse_reply(
    text: &str,
    request: &CompletionRequest,
    provider: &str,
    pricing: Pricing,
    latency_ms: u64,
) -> Result<CompletionResponse, ResponderError> {
    let reply: ChatCompletionReply =
        serde_json::from_str(text).map_err(|e| ResponderError::InvalidResponse(e.to_string()))?;

    let choice = reply
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ResponderError::InvalidResponse("no choices in response".to_string()))?;

    let usage = reply
        .usage
        .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
        .unwrap_or_default();

    Ok(CompletionResponse {
        content: choice.message.content.unwrap_or_default(),
        cost: pricing.cost(&usage),
        usage,
        metadata: ResponseMetadata {
            latency_ms,
            provider: provider.to_string(),
            model: reply.model.unwrap_or_else(|| request.model.clone()),
            finish_reason: choice.finish_reason,
        },
    })
}

#[async_trait]
impl Responder for OpenAiCompatibleResponder {
    fn id(&self) -> &str {
        &self.id
    }

    async fn call(
        &self,
        request: CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<CompletionResponse, ResponderError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ResponderError::Cancelled),
            result = self.send(&request) => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_trims_slash() {
        let responder = OpenAiCompatibleResponder::new("openai", "https://api.example.com/v1/").unwrap();
        assert_eq!(responder.endpoint(), "https://api.example.com/v1/chat/completions");
    }

    #[test]
    fn test_pricing_cost() {
        let cost = Pricing::new(2.0, 8.0).cost(&TokenUsage::new(1_000, 500));
        assert!((cost.input_cost - 0.002).abs() < 1e-12);
        assert!((cost.output_cost - 0.004).abs() < 1e-12);
        assert!((cost.total_cost - 0.006).abs() < 1e-12);
    }

    #[test]
    fn test_parse_reply() {
        let text = r#"{
            "model": "gpt-test-2024",
            "choices": [{"message": {"role": "assistant", "content": "Paris"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        }"#;
        let request = CompletionRequest::new("gpt-test", "Capital of France?");
        let response = parse_reply(text, &request, "openai", Pricing::new(1.0, 1.0), 42).unwrap();

        assert_eq!(response.content, "Paris");
        assert_eq!(response.usage.total_tokens, 15);
        assert_eq!(response.metadata.model, "gpt-test-2024");
        assert_eq!(response.metadata.latency_ms, 42);
        assert_eq!(response.metadata.finish_reason.as_deref(), Some("stop"));
        assert!((response.cost.total_cost - 15.0 / 1_000_000.0).abs() < 1e-12);
    }

    #[test]
    fn test_parse_reply_errors() {
        let request = CompletionRequest::new("m", "p");
        let err = parse_reply("not json", &request, "x", Pricing::default(), 0).unwrap_err();
        assert!(matches!(err, ResponderError::InvalidResponse(_)));

        let err = parse_reply(r#"{"choices": []}"#, &request, "x", Pricing::default(), 0).unwrap_err();
        assert_eq!(
            err,
            ResponderError::InvalidResponse("no choices in response".to_string())
        );
    }

    #[tokio::test]
    async fn test_call_returns_cancelled_when_token_fired() {
        let responder = OpenAiCompatibleResponder::new("local", "http://127.0.0.1:9").unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = responder
            .call(CompletionRequest::new("m", "p"), &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}

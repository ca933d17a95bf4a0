//! OpenAI-compatible chat completions provider.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use divcon_common::util::{single_line, truncate_with_ellipsis};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use super::{ChatRequest, ChatResponse, Provider, ProviderError, TokenUsage};

const PROVIDER_NAME: &str = "openai";
const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
const MAX_ERROR_BODY_CHARS: usize = 500;

/// OpenAI API provider.
pub struct OpenAIProvider {
    client: reqwest::Client,
    base_url: String,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider.
    pub fn new(api_key: &str) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL, DEFAULT_TIMEOUT)
    }

    /// Create with a custom base URL (Azure OpenAI or any compatible API).
    ///
    /// `timeout` bounds every request, including the time to read the body.
    pub fn with_base_url(api_key: &str, base_url: &str, timeout: Duration) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .unwrap_or_else(|_| HeaderValue::from_static("")),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn error(model: &str, message: impl Into<String>) -> ProviderError {
        ProviderError::new(PROVIDER_NAME, model, message)
    }
}

#[async_trait]
impl Provider for OpenAIProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let start = Instant::now();
        let url = format!("{}/v1/chat/completions", self.base_url);

        let mut messages: Vec<OpenAIMessage> = request
            .messages
            .iter()
            .map(|m| OpenAIMessage {
                role: m.role.clone(),
                content: m.content.clone(),
            })
            .collect();

        if let Some(system) = &request.system {
            messages.insert(
                0,
                OpenAIMessage {
                    role: "system".into(),
                    content: system.clone(),
                },
            );
        }

        let openai_request = OpenAIRequest {
            model: request.model.clone(),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            reasoning_effort: request.reasoning_effort.clone(),
            response_format: request.json_mode.then(ResponseFormat::json_object),
        };

        let response = self
            .client
            .post(&url)
            .json(&openai_request)
            .send()
            .await
            .map_err(|e| Self::error(&request.model, format!("Request failed: {}", e)))?;

        let status = response.status();
        let latency_ms = start.elapsed().as_millis() as u64;

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body = truncate_with_ellipsis(&single_line(&body), MAX_ERROR_BODY_CHARS);
            return Err(Self::error(&request.model, format!("API error: {}", body))
                .with_status(status.as_u16()));
        }

        let openai_response: OpenAIResponse = response.json().await.map_err(|e| {
            Self::error(&request.model, format!("Failed to parse response: {}", e))
        })?;

        let choice = openai_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Self::error(&request.model, "Response contained no choices"))?;

        let content = match (choice.message.content, choice.message.refusal) {
            (Some(content), _) => content,
            (None, Some(refusal)) => {
                return Err(Self::error(&request.model, format!("Model refused: {}", refusal)))
            }
            (None, None) => String::new(),
        };

        tracing::debug!(
            model = %openai_response.model,
            latency_ms,
            input_tokens = openai_response.usage.prompt_tokens,
            output_tokens = openai_response.usage.completion_tokens,
            finish_reason = ?choice.finish_reason,
            "Chat completion finished"
        );

        Ok(ChatResponse {
            provider: PROVIDER_NAME.into(),
            model: openai_response.model,
            content,
            usage: TokenUsage {
                input_tokens: openai_response.usage.prompt_tokens,
                output_tokens: openai_response.usage.completion_tokens,
                total_tokens: openai_response.usage.total_tokens,
            },
            finish_reason: choice.finish_reason,
            latency_ms,
        })
    }
}

// ============================================================================
// OpenAI API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_effort: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

impl ResponseFormat {
    fn json_object() -> Self {
        Self {
            kind: "json_object",
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    model: String,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: OpenAIUsage,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: i64,
    completion_tokens: i64,
    total_tokens: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Message;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> ChatRequest {
        ChatRequest {
            model: "gpt-5-mini".into(),
            messages: vec![Message::user("Classify these")],
            system: Some("You classify opinions".into()),
            reasoning_effort: Some("medium".into()),
            json_mode: true,
            ..Default::default()
        }
    }

    fn provider(server: &MockServer) -> OpenAIProvider {
        OpenAIProvider::with_base_url("sk-test", &format!("{}/", server.uri()), Duration::from_secs(5))
    }

    #[test]
    fn test_openai_request_serialization() {
        let request = OpenAIRequest {
            model: "gpt-5-mini".into(),
            messages: vec![OpenAIMessage {
                role: "user".into(),
                content: "Hello".into(),
            }],
            max_tokens: None,
            temperature: None,
            reasoning_effort: Some("high".into()),
            response_format: Some(ResponseFormat::json_object()),
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["response_format"]["type"], "json_object");
        assert_eq!(json["reasoning_effort"], "high");
        assert!(json.get("max_tokens").is_none());
    }

    #[tokio::test]
    async fn test_chat_sends_system_first_and_parses_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-5-mini",
                "reasoning_effort": "medium",
                "response_format": { "type": "json_object" },
                "messages": [
                    { "role": "system", "content": "You classify opinions" },
                    { "role": "user", "content": "Classify these" }
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "gpt-5-mini-2025-08-07",
                "choices": [{
                    "message": { "role": "assistant", "content": "{\"classifications\": []}" },
                    "finish_reason": "stop"
                }],
                "usage": { "prompt_tokens": 120, "completion_tokens": 8, "total_tokens": 128 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = provider(&server).chat(request()).await.unwrap();

        assert_eq!(response.provider, "openai");
        assert_eq!(response.model, "gpt-5-mini-2025-08-07");
        assert_eq!(response.content, "{\"classifications\": []}");
        assert_eq!(response.usage.total_tokens, 128);
        assert_eq!(response.finish_reason.as_deref(), Some("stop"));
    }

    #[tokio::test]
    async fn test_api_error_carries_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let err = provider(&server).chat(request()).await.unwrap_err();

        assert_eq!(err.status_code, Some(429));
        assert_eq!(err.to_string(), "[openai:gpt-5-mini] API error: rate limited");
    }

    #[tokio::test]
    async fn test_refusal_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "gpt-5-mini",
                "choices": [{
                    "message": { "role": "assistant", "content": null, "refusal": "cannot help" },
                    "finish_reason": "stop"
                }]
            })))
            .mount(&server)
            .await;

        let err = provider(&server).chat(request()).await.unwrap_err();
        assert!(err.message.contains("cannot help"));
    }

    #[tokio::test]
    async fn test_empty_choices_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let err = provider(&server).chat(request()).await.unwrap_err();
        assert!(err.message.contains("no choices"));
    }
}

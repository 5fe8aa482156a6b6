//! Anthropic (Claude) backend implementation.

use crate::backend::{
    AskRequest, AskResponse, Backend, BackendError, BackendState, MetricsCallback, TokenUsage,
};
use async_trait::async_trait;
use llmfs_common::config::BackendConfig;
use llmfs_common::{Error, Result};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

const PROVIDER: &str = "anthropic";

/// Anthropic Messages API backend.
pub struct AnthropicBackend {
    client: reqwest::Client,
    base_url: String,
    max_tokens: i64,
    max_thinking_tokens: i64,
    state: BackendState,
}

impl AnthropicBackend {
    /// Create a backend against the public API with default limits.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::from_parts(api_key.into(), &BackendConfig::default())
    }

    /// Create a backend from configuration. An API key is required.
    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                Error::Config("backend.api_key (or ANTHROPIC_API_KEY) is not set".into())
            })?;
        Ok(Self::from_parts(api_key.to_string(), config))
    }

    fn from_parts(api_key: String, config: &BackendConfig) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&api_key).unwrap_or_else(|_| HeaderValue::from_static("")),
        );
        headers.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_tokens: config.max_tokens,
            max_thinking_tokens: config.max_thinking_tokens,
            state: BackendState::new(config.system_prompt.clone()),
        }
    }

    /// Translate a session request into the Messages API shape.
    fn build_request(&self, request: &AskRequest) -> AnthropicRequest {
        let mut messages: Vec<AnthropicMessage> = request
            .history
            .iter()
            .map(|m| AnthropicMessage {
                role: m.role.as_str().to_string(),
                content: m.content.clone(),
            })
            .collect();
        messages.push(AnthropicMessage {
            role: "user".into(),
            content: request.prompt.clone(),
        });

        // The API rejects a final assistant turn ending in whitespace.
        let prefill = request.prefill.trim_end();
        if !prefill.is_empty() {
            messages.push(AnthropicMessage {
                role: "assistant".into(),
                content: prefill.to_string(),
            });
        }

        let budget = match request.thinking_tokens {
            0 => None,
            n if n < 0 => Some(self.max_thinking_tokens),
            n => Some(n),
        };

        AnthropicRequest {
            model: request.model.clone(),
            messages,
            max_tokens: self.max_tokens + budget.unwrap_or(0),
            system: self.state.effective_system_prompt(&request.system_prompt),
            // Sampling temperature is fixed by the API while thinking.
            temperature: budget.is_none().then_some(request.temperature),
            thinking: budget.map(|budget_tokens| ThinkingConfig {
                kind: "enabled",
                budget_tokens,
            }),
        }
    }

    fn error(&self, model: &str, message: String, status_code: Option<u16>) -> Error {
        BackendError {
            provider: PROVIDER.into(),
            model: model.to_string(),
            message,
            status_code,
        }
        .into()
    }

    async fn send(&self, body: &AnthropicRequest) -> Result<(reqwest::StatusCode, String)> {
        let url = format!("{}/v1/messages", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.error(&body.model, format!("Request failed: {}", e), None))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| self.error(&body.model, format!("Failed to read response: {}", e), None))?;
        Ok((status, text))
    }
}

#[async_trait]
impl Backend for AnthropicBackend {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn ask(&self, request: AskRequest, cancel: &CancellationToken) -> Result<AskResponse> {
        let body = self.build_request(&request);
        let start = Instant::now();

        tracing::debug!(
            model = %body.model,
            messages = body.messages.len(),
            thinking = body.thinking.is_some(),
            "Sending Anthropic request"
        );

        let (status, text) = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            result = self.send(&body) => result?,
        };
        let latency_ms = start.elapsed().as_millis() as u64;

        if !status.is_success() {
            return Err(self.error(
                &request.model,
                format!("API error: {}", text),
                Some(status.as_u16()),
            ));
        }

        let parsed: AnthropicResponse = serde_json::from_str(&text).map_err(|e| {
            self.error(&request.model, format!("Failed to parse response: {}", e), None)
        })?;

        let usage = TokenUsage {
            input_tokens: parsed.usage.input_tokens,
            output_tokens: parsed.usage.output_tokens,
        };
        self.state.record(usage, latency_ms);

        let mut content = request.prefill.trim_end().to_string();
        content.push_str(&parsed.text());

        Ok(AskResponse {
            content,
            usage,
            latency_ms,
        })
    }

    fn system_prompt(&self) -> String {
        self.state.system_prompt()
    }

    fn set_system_prompt(&self, prompt: &str) {
        self.state.set_system_prompt(prompt);
    }

    fn set_metrics_callback(&self, callback: MetricsCallback) {
        self.state.set_metrics_callback(callback);
    }
}

// ============================================================================
// Anthropic API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    max_tokens: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking: Option<ThinkingConfig>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ThinkingConfig {
    #[serde(rename = "type")]
    kind: &'static str,
    budget_tokens: i64,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    usage: AnthropicUsage,
}

impl AnthropicResponse {
    /// Concatenate text blocks; thinking blocks are dropped.
    fn text(&self) -> String {
        self.content
            .iter()
            .filter(|c| c.content_type == "text")
            .map(|c| c.text.as_str())
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: i64,
    output_tokens: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Message;

    fn request() -> AskRequest {
        AskRequest {
            history: vec![Message::user("hi"), Message::assistant("hello")],
            prompt: "how are you?".into(),
            model: "claude-sonnet-4".into(),
            temperature: 0.5,
            system_prompt: String::new(),
            thinking_tokens: 0,
            prefill: String::new(),
        }
    }

    #[test]
    fn test_build_request_plain() {
        let backend = AnthropicBackend::new("test-key");
        let body = backend.build_request(&request());

        assert_eq!(body.messages.len(), 3);
        assert_eq!(body.messages[2].role, "user");
        assert_eq!(body.messages[2].content, "how are you?");
        assert_eq!(body.max_tokens, 4096);
        assert_eq!(body.temperature, Some(0.5));
        assert!(body.thinking.is_none());
        assert!(body.system.is_none());
    }

    #[test]
    fn test_build_request_thinking_max() {
        let backend = AnthropicBackend::new("test-key");
        let mut req = request();
        req.thinking_tokens = -1;
        let body = backend.build_request(&req);

        let thinking = body.thinking.as_ref().expect("thinking enabled");
        assert_eq!(thinking.budget_tokens, 16000);
        assert_eq!(body.max_tokens, 4096 + 16000);
        assert!(body.temperature.is_none());

        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains(r#""thinking":{"type":"enabled","budget_tokens":16000}"#));
    }

    #[test]
    fn test_build_request_prefill_and_system() {
        let backend = AnthropicBackend::new("test-key");
        backend.set_system_prompt("global prompt");

        let mut req = request();
        req.prefill = "Sure, here is  ".into();
        let body = backend.build_request(&req);

        let last = body.messages.last().unwrap();
        assert_eq!(last.role, "assistant");
        assert_eq!(last.content, "Sure, here is");
        assert_eq!(body.system.as_deref(), Some("global prompt"));

        req.system_prompt = "session prompt".into();
        let body = backend.build_request(&req);
        assert_eq!(body.system.as_deref(), Some("session prompt"));
    }

    #[test]
    fn test_response_text_skips_thinking_blocks() {
        let body = r#"{
            "content": [
                {"type": "thinking", "thinking": "hmm"},
                {"type": "text", "text": "Hello"},
                {"type": "text", "text": " world"}
            ],
            "usage": {"input_tokens": 10, "output_tokens": 20}
        }"#;
        let parsed: AnthropicResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.text(), "Hello world");
        assert_eq!(parsed.usage.input_tokens + parsed.usage.output_tokens, 30);
    }

    #[test]
    fn test_from_config_requires_key() {
        let config = BackendConfig::default();
        assert!(matches!(
            AnthropicBackend::from_config(&config),
            Err(Error::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_ask_honours_cancellation() {
        let config = BackendConfig {
            api_key: Some("test-key".into()),
            base_url: "http://127.0.0.1:9".into(),
            ..BackendConfig::default()
        };
        let backend = AnthropicBackend::from_config(&config).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = backend.ask(request(), &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}

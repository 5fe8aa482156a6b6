//! Backend trait and request/response types.

use async_trait::async_trait;
use llmfs_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Backend Trait
// ============================================================================

/// Callback invoked once per completed backend call with
/// `(input_tokens, output_tokens, latency_ms)`.
pub type MetricsCallback = Arc<dyn Fn(i64, i64, u64) + Send + Sync>;

/// Interface for language-model backends.
///
/// Implementations are stateless with respect to conversations: the whole
/// history travels in every [`AskRequest`].
#[async_trait]
pub trait Backend: Send + Sync {
    /// Backend name (e.g., "anthropic").
    fn name(&self) -> &str;

    /// Send one prompt with its conversation history.
    ///
    /// Must return promptly with [`Error::Cancelled`] once `cancel` fires.
    async fn ask(&self, request: AskRequest, cancel: &CancellationToken) -> Result<AskResponse>;

    /// Process-wide system prompt, used when a request carries none.
    fn system_prompt(&self) -> String;

    /// Replace the process-wide system prompt.
    fn set_system_prompt(&self, prompt: &str);

    /// Register the callback fed after every completed call.
    fn set_metrics_callback(&self, callback: MetricsCallback);
}

/// Error from a backend call.
#[derive(Debug, Clone)]
pub struct BackendError {
    pub provider: String,
    pub model: String,
    pub message: String,
    pub status_code: Option<u16>,
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}:{}] {}", self.provider, self.model, self.message)
    }
}

impl std::error::Error for BackendError {}

impl From<BackendError> for Error {
    fn from(err: BackendError) -> Self {
        Error::BackendFailure(err.to_string())
    }
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Conversation role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A message in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
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

/// Everything a backend needs for one call.
#[derive(Debug, Clone)]
pub struct AskRequest {
    /// Prior turns, oldest first
    pub history: Vec<Message>,
    /// The new user prompt
    pub prompt: String,
    pub model: String,
    pub temperature: f64,
    /// Session system prompt; empty means "use the global one"
    pub system_prompt: String,
    /// -1 = unbounded, 0 = disabled, n > 0 = explicit budget
    pub thinking_tokens: i64,
    /// Seed for the assistant's reply; empty means none
    pub prefill: String,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: i64,
    pub output_tokens: i64,
}

impl TokenUsage {
    pub fn total(&self) -> i64 {
        self.input_tokens + self.output_tokens
    }
}

/// Result of a completed call.
#[derive(Debug, Clone)]
pub struct AskResponse {
    /// Full assistant text, prefill included
    pub content: String,
    pub usage: TokenUsage,
    pub latency_ms: u64,
}

// ============================================================================
// Shared Backend State
// ============================================================================

/// Process-wide settings every backend implementation carries.
#[derive(Default)]
pub struct BackendState {
    system_prompt: RwLock<String>,
    metrics: RwLock<Option<MetricsCallback>>,
}

impl BackendState {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: RwLock::new(system_prompt.into()),
            metrics: RwLock::new(None),
        }
    }

    pub fn system_prompt(&self) -> String {
        self.system_prompt
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn set_system_prompt(&self, prompt: &str) {
        *self.system_prompt.write().unwrap_or_else(|e| e.into_inner()) = prompt.to_string();
    }

    pub fn set_metrics_callback(&self, callback: MetricsCallback) {
        *self.metrics.write().unwrap_or_else(|e| e.into_inner()) = Some(callback);
    }

    /// Feed the registered callback, if any.
    pub fn record(&self, usage: TokenUsage, latency_ms: u64) {
        let callback = self
            .metrics
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(callback) = callback {
            callback(usage.input_tokens, usage.output_tokens, latency_ms);
        }
    }

    /// Pick the session prompt, falling back to the global one.
    pub fn effective_system_prompt(&self, session_prompt: &str) -> Option<String> {
        if !session_prompt.is_empty() {
            return Some(session_prompt.to_string());
        }
        let global = self.system_prompt();
        (!global.is_empty()).then_some(global)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    #[test]
    fn message_serializes_lowercase_role() {
        let json = serde_json::to_string(&Message::user("hi")).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"hi"}"#);
        assert_eq!(Role::Assistant.as_str(), "assistant");
    }

    #[test]
    fn backend_error_converts_to_backend_failure() {
        let err: Error = BackendError {
            provider: "anthropic".into(),
            model: "claude-sonnet-4".into(),
            message: "API error: overloaded".into(),
            status_code: Some(529),
        }
        .into();
        assert!(matches!(err, Error::BackendFailure(ref m) if m.contains("overloaded")));
        assert_eq!(err.status_code(), 502);
    }

    #[test]
    fn state_records_through_callback() {
        let state = BackendState::default();
        state.record(TokenUsage::default(), 5);

        let seen = Arc::new(AtomicI64::new(0));
        let sink = seen.clone();
        state.set_metrics_callback(Arc::new(move |input, output, _| {
            sink.fetch_add(input + output, Ordering::SeqCst);
        }));
        state.record(
            TokenUsage {
                input_tokens: 3,
                output_tokens: 4,
            },
            12,
        );
        assert_eq!(seen.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn system_prompt_fallback() {
        let state = BackendState::new("");
        assert_eq!(state.effective_system_prompt(""), None);

        state.set_system_prompt("be terse");
        assert_eq!(state.effective_system_prompt("").as_deref(), Some("be terse"));
        assert_eq!(
            state.effective_system_prompt("be verbose").as_deref(),
            Some("be verbose")
        );
    }
}

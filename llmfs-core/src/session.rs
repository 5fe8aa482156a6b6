//! A single conversation: history, settings, last result and counters.
//!
//! All fields sit behind one reader/writer lock owned by the session, so work
//! on one session never contends with the registry or with other sessions.
//! Once a session is closed every mutator fails with [`Error::Closed`];
//! getters keep answering from the frozen state.

use llmfs_backend::Message;
use llmfs_common::config::SessionConfig;
use llmfs_common::util::strip_one_newline;
use llmfs_common::{Error, Result};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Lowest accepted sampling temperature.
pub const MIN_TEMPERATURE: f64 = 0.0;
/// Highest accepted sampling temperature.
pub const MAX_TEMPERATURE: f64 = 2.0;

/// Thinking budget meaning "as much as the backend allows".
pub const THINKING_MAX: i64 = -1;
/// Thinking budget meaning "no extended thinking".
pub const THINKING_DISABLED: i64 = 0;

/// Per-session model settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub model: String,
    pub temperature: f64,
    pub system_prompt: String,
    /// -1 = unbounded, 0 = disabled, n > 0 = explicit budget
    pub thinking_tokens: i64,
    pub prefill: String,
}

impl From<&SessionConfig> for SessionSettings {
    fn from(config: &SessionConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            system_prompt: config.system_prompt.clone(),
            thinking_tokens: config.thinking_tokens,
            prefill: config.prefill.clone(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&SessionConfig::default())
    }
}

/// Session lifecycle. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Active,
    Closed,
}

struct SessionState {
    history: Vec<Message>,
    settings: SessionSettings,
    last_result: String,
    last_tokens: i64,
    total_tokens: i64,
    lifecycle: Lifecycle,
}

/// One isolated conversation.
pub struct Session {
    id: u64,
    state: RwLock<SessionState>,
}

impl Session {
    /// Create a session with the given id and default settings.
    pub fn new(id: u64, settings: SessionSettings) -> Self {
        Self {
            id,
            state: RwLock::new(SessionState {
                history: Vec::new(),
                settings,
                last_result: String::new(),
                last_tokens: 0,
                total_tokens: 0,
                lifecycle: Lifecycle::Active,
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Write access for mutators; refuses once the session is closed.
    fn write(&self) -> Result<RwLockWriteGuard<'_, SessionState>> {
        let guard = self.state.write().unwrap_or_else(|e| e.into_inner());
        if guard.lifecycle == Lifecycle::Closed {
            return Err(Error::Closed(self.id));
        }
        Ok(guard)
    }

    // ------------------------------------------------------------------
    // Lifecycle and conversation state
    // ------------------------------------------------------------------

    pub fn lifecycle(&self) -> Lifecycle {
        self.read().lifecycle
    }

    pub fn is_closed(&self) -> bool {
        self.lifecycle() == Lifecycle::Closed
    }

    /// Mark the session closed. Idempotent.
    pub(crate) fn close(&self) {
        self.state
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .lifecycle = Lifecycle::Closed;
    }

    /// Copy of the conversation history.
    pub fn history(&self) -> Vec<Message> {
        self.read().history.clone()
    }

    /// History as a pretty-printed JSON array.
    pub fn history_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.read().history)?)
    }

    pub fn last_result(&self) -> String {
        self.read().last_result.clone()
    }

    pub fn last_tokens(&self) -> i64 {
        self.read().last_tokens
    }

    pub fn total_tokens(&self) -> i64 {
        self.read().total_tokens
    }

    /// History and settings taken under a single read lock.
    pub fn snapshot(&self) -> (Vec<Message>, SessionSettings) {
        let state = self.read();
        (state.history.clone(), state.settings.clone())
    }

    /// Record a completed exchange: user turn, assistant turn, counters and
    /// last result land together.
    pub fn record_exchange(&self, prompt: &str, response: &str, tokens: i64) -> Result<()> {
        let mut state = self.write()?;
        state.history.push(Message::user(prompt));
        state.history.push(Message::assistant(response));
        state.last_tokens = tokens;
        state.total_tokens += tokens.max(0);
        state.last_result = response.to_string();
        Ok(())
    }

    pub fn set_last_result(&self, result: impl Into<String>) -> Result<()> {
        self.write()?.last_result = result.into();
        Ok(())
    }

    /// Clear history, last result and counters. Settings survive.
    pub fn reset(&self) -> Result<()> {
        let mut state = self.write()?;
        state.history.clear();
        state.last_result.clear();
        state.last_tokens = 0;
        state.total_tokens = 0;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------

    pub fn settings(&self) -> SessionSettings {
        self.read().settings.clone()
    }

    pub fn model(&self) -> String {
        self.read().settings.model.clone()
    }

    /// Set the model. Surrounding whitespace is trimmed; an empty value is ignored.
    pub fn set_model(&self, model: &str) -> Result<()> {
        let model = model.trim();
        let mut state = self.write()?;
        if !model.is_empty() {
            state.settings.model = model.to_string();
        }
        Ok(())
    }

    pub fn temperature(&self) -> f64 {
        self.read().settings.temperature
    }

    /// Set the temperature; values outside `[0.0, 2.0]` are rejected untouched.
    pub fn set_temperature(&self, temperature: f64) -> Result<()> {
        let temperature = validate_temperature(temperature)?;
        self.write()?.settings.temperature = temperature;
        Ok(())
    }

    pub fn system_prompt(&self) -> String {
        self.read().settings.system_prompt.clone()
    }

    /// Set the system prompt, trimmed. An empty value clears it.
    pub fn set_system_prompt(&self, prompt: &str) -> Result<()> {
        self.write()?.settings.system_prompt = prompt.trim().to_string();
        Ok(())
    }

    pub fn thinking_tokens(&self) -> i64 {
        self.read().settings.thinking_tokens
    }

    pub fn set_thinking_tokens(&self, tokens: i64) -> Result<()> {
        if tokens < THINKING_MAX {
            return Err(Error::InvalidInput(format!(
                "invalid thinking budget: {tokens}"
            )));
        }
        self.write()?.settings.thinking_tokens = tokens;
        Ok(())
    }

    pub fn prefill(&self) -> String {
        self.read().settings.prefill.clone()
    }

    /// Set the prefill verbatim, minus exactly one trailing line terminator.
    pub fn set_prefill(&self, prefill: &str) -> Result<()> {
        self.write()?.settings.prefill = strip_one_newline(prefill).to_string();
        Ok(())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.read();
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("messages", &state.history.len())
            .field("model", &state.settings.model)
            .field("lifecycle", &state.lifecycle)
            .finish()
    }
}

// ============================================================================
// Value encodings
// ============================================================================

fn validate_temperature(value: f64) -> Result<f64> {
    if !value.is_finite() || !(MIN_TEMPERATURE..=MAX_TEMPERATURE).contains(&value) {
        return Err(Error::InvalidInput(
            "temperature must be between 0.0 and 2.0".into(),
        ));
    }
    Ok(value)
}

/// Parse a temperature written as text.
pub fn parse_temperature(input: &str) -> Result<f64> {
    let value: f64 = input
        .trim()
        .parse()
        .map_err(|e| Error::InvalidInput(format!("invalid temperature: {e}")))?;
    validate_temperature(value)
}

/// Parse a thinking budget: `max`/`-1`, `disabled`/`off`/`0`, or a token count.
pub fn parse_thinking(input: &str) -> Result<i64> {
    match input.trim() {
        "max" | "-1" => Ok(THINKING_MAX),
        "disabled" | "off" | "0" => Ok(THINKING_DISABLED),
        other => {
            let tokens: i64 = other
                .parse()
                .map_err(|e| Error::InvalidInput(format!("invalid thinking budget: {e}")))?;
            if tokens < 0 {
                return Err(Error::InvalidInput(format!(
                    "invalid thinking budget: {tokens}"
                )));
            }
            Ok(tokens)
        }
    }
}

/// Render a thinking budget the way `parse_thinking` reads it.
pub fn format_thinking(tokens: i64) -> String {
    match tokens {
        t if t < 0 => "max".to_string(),
        0 => "disabled".to_string(),
        t => t.to_string(),
    }
}

//! Configuration management for llmfs.
//!
//! The server reads a single JSON file at `~/.llmfs/config.json`. Every field
//! has a default, so a missing file or a partial file is fine.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (LLMFS_* prefix, plus provider keys)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `LLMFS_HOST` → server.host
//! - `LLMFS_PORT` → server.port
//! - `LLMFS_LOG_LEVEL` → observability.log_level
//! - `LLMFS_LOG_FORMAT` → observability.log_format
//! - `LLMFS_MODEL` → session.model
//! - `LLMFS_ASK_TIMEOUT_SECS` → ask_timeout_secs
//! - `ANTHROPIC_API_KEY` → backend.api_key
//! - `ANTHROPIC_BASE_URL` → backend.base_url

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".llmfs"),
        |dirs| dirs.home_dir().join(".llmfs"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Template applied to every newly created session
    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub backend: BackendConfig,

    /// Deadline for a single `ask` write, in seconds (0 disables the deadline)
    #[serde(default = "default_ask_timeout_secs")]
    pub ask_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            observability: ObservabilityConfig::default(),
            session: SessionConfig::default(),
            backend: BackendConfig::default(),
            ask_timeout_secs: default_ask_timeout_secs(),
        }
    }
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides, then validate.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    ///
    /// Unparsable numeric values are ignored and the previous value is kept.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("LLMFS_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("LLMFS_PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }
        if let Some(level) = lookup("LLMFS_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = lookup("LLMFS_LOG_FORMAT") {
            self.observability.log_format = format;
        }
        if let Some(model) = lookup("LLMFS_MODEL") {
            if !model.trim().is_empty() {
                self.session.model = model.trim().to_string();
            }
        }
        if let Some(secs) = lookup("LLMFS_ASK_TIMEOUT_SECS") {
            if let Ok(s) = secs.parse() {
                self.ask_timeout_secs = s;
            }
        }
        if let Some(key) = lookup("ANTHROPIC_API_KEY") {
            self.backend.api_key = Some(key);
        }
        if let Some(url) = lookup("ANTHROPIC_BASE_URL") {
            self.backend.base_url = url;
        }
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> crate::Result<()> {
        let t = self.session.temperature;
        if !t.is_finite() || !(0.0..=2.0).contains(&t) {
            return Err(crate::Error::Config(format!(
                "session.temperature must be between 0.0 and 2.0, got {t}"
            )));
        }
        if self.session.thinking_tokens < -1 {
            return Err(crate::Error::Config(format!(
                "session.thinking_tokens must be -1, 0 or a positive budget, got {}",
                self.session.thinking_tokens
            )));
        }
        if self.session.model.trim().is_empty() {
            return Err(crate::Error::Config("session.model must not be empty".into()));
        }
        if self.backend.max_tokens <= 0 {
            return Err(crate::Error::Config("backend.max_tokens must be positive".into()));
        }
        Ok(())
    }
}

// ============================================================================
// Sections
// ============================================================================

/// Listener configuration for the file transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets to set to `warn`.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

/// Default settings copied into each new session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    #[serde(default)]
    pub system_prompt: String,

    /// -1 = unbounded, 0 = disabled, n > 0 = explicit budget
    #[serde(default)]
    pub thinking_tokens: i64,

    #[serde(default)]
    pub prefill: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            system_prompt: String::new(),
            thinking_tokens: 0,
            prefill: String::new(),
        }
    }
}

/// Language-model backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: i64,

    /// Budget sent when a session asks for unbounded thinking
    #[serde(default = "default_max_thinking_tokens")]
    pub max_thinking_tokens: i64,

    #[serde(default = "default_backend_timeout_secs")]
    pub timeout_secs: u64,

    /// Process-wide system prompt, used when a session has none
    #[serde(default)]
    pub system_prompt: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            max_tokens: default_max_tokens(),
            max_thinking_tokens: default_max_thinking_tokens(),
            timeout_secs: default_backend_timeout_secs(),
            system_prompt: String::new(),
        }
    }
}

// ============================================================================
// Defaults
// ============================================================================

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    5640
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".into()
}

fn default_temperature() -> f64 {
    0.7
}

fn default_base_url() -> String {
    "https://api.anthropic.com".into()
}

fn default_max_tokens() -> i64 {
    4096
}

fn default_max_thinking_tokens() -> i64 {
    16000
}

fn default_backend_timeout_secs() -> u64 {
    300
}

fn default_ask_timeout_secs() -> u64 {
    300
}

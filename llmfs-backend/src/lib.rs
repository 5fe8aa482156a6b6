//! llmfs Backend - stateless language-model clients.
//!
//! A backend receives the full conversation on every call; it keeps no
//! per-conversation state. The only process-wide settings it holds are the
//! global system prompt and the metrics callback registered at startup.
//!
//! ## Example
//!
//! ```ignore
//! use llmfs_backend::{AnthropicBackend, AskRequest, Backend};
//! use tokio_util::sync::CancellationToken;
//!
//! let backend = AnthropicBackend::from_config(&config.backend)?;
//! let response = backend.ask(request, &CancellationToken::new()).await?;
//! ```

pub mod anthropic;
pub mod backend;

pub use anthropic::AnthropicBackend;
pub use backend::{
    AskRequest, AskResponse, Backend, BackendError, BackendState, Message, MetricsCallback, Role,
    TokenUsage,
};

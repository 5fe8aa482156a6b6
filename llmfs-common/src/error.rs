//! Error types for llmfs.

use thiserror::Error;

/// Result type alias using the llmfs error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for llmfs.
#[derive(Error, Debug)]
pub enum Error {
    /// Unknown session id or path component
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation not allowed by the file's mode
    #[error("Permission denied: {0}")]
    Permission(String),

    /// Operation attempted on a terminated session
    #[error("Session closed: {0}")]
    Closed(u64),

    /// Malformed value or unrecognized command
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Failure reported by the language-model backend
    #[error("Backend failure: {0}")]
    BackendFailure(String),

    /// Caller cancelled the operation
    #[error("Operation cancelled")]
    Cancelled,

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an error with additional context.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Check if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::WithContext { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Check if this is a permission error.
    pub fn is_permission(&self) -> bool {
        match self {
            Self::Permission(_) => true,
            Self::WithContext { source, .. } => source.is_permission(),
            _ => false,
        }
    }

    /// Check if this is an invalid input error.
    pub fn is_invalid_input(&self) -> bool {
        match self {
            Self::InvalidInput(_) => true,
            Self::WithContext { source, .. } => source.is_invalid_input(),
            _ => false,
        }
    }

    /// Stable machine-readable code used in transport error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Permission(_) => "PERMISSION_DENIED",
            Self::Closed(_) => "SESSION_CLOSED",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::BackendFailure(_) => "BACKEND_FAILURE",
            Self::Cancelled => "CANCELLED",
            Self::Timeout => "TIMEOUT",
            Self::Config(_) => "CONFIG_ERROR",
            Self::WithContext { source, .. } => source.code(),
            _ => "INTERNAL_ERROR",
        }
    }

    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::Permission(_) => 403,
            Self::InvalidInput(_) => 400,
            Self::Closed(_) => 410,
            Self::BackendFailure(_) => 502,
            Self::Timeout => 504,
            Self::Cancelled => 499,
            Self::WithContext { source, .. } => source.status_code(),
            _ => 500,
        }
    }
}

//! Error types for the chat core.

use thiserror::Error;

use crate::chat::types::ConversationId;

/// Chat subsystem error type.
#[derive(Debug, Error)]
pub enum ChatError {
    /// An operation referenced a conversation that is not in the store.
    #[error("conversation not found: {0}")]
    NotFound(ConversationId),
    /// Transport failure or non-success status from the completion service.
    #[error("completion service unavailable: {0}")]
    RemoteUnavailable(String),
    /// The completion service answered with a body that could not be decoded.
    #[error("malformed completion response: {0}")]
    MalformedResponse(String),
    /// Invalid configuration or unsupported values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// `SQLite` storage error (async).
    #[error("storage error: {0}")]
    Storage(#[from] tokio_rusqlite::Error),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// URL parse error.
    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
    /// HTTP client construction error.
    #[error("http client error: {0}")]
    HttpClient(#[from] reqwest::Error),
    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChatError {
    /// Whether the error comes from the remote completion service.
    #[must_use]
    pub const fn is_remote(&self) -> bool {
        matches!(self, Self::RemoteUnavailable(_) | Self::MalformedResponse(_))
    }
}

/// Convenience result alias for chat operations.
pub type ChatResult<T> = Result<T, ChatError>;

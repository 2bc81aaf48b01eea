//! Error types for the chat core.

use thiserror::Error;

/// Errors raised below the conversation controller boundary.
///
/// The controller never lets these escape a submission: they are turned
/// into a rendered assistant message or absorbed.
#[derive(Debug, Error)]
pub enum ChatError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// The model endpoint answered with a non-success status.
    #[error("model endpoint returned status {0}")]
    Status(u16),

    /// Generic transport failure (mocked transports, dropped channels).
    #[error("transport error: {0}")]
    Transport(String),

    /// JSON parsing error.
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Configuration error.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The display name is not part of the model catalog.
    #[error("unknown model: {0}")]
    UnknownModel(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result alias for chat operations.
pub type ChatResult<T> = Result<T, ChatError>;

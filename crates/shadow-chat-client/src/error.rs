//! Client error types.

use thiserror::Error;

/// A result type using `ClientError`.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors raised by backend calls and client setup.
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Server-provided message, if any.
        message: String,
    },

    /// Failed to parse response.
    #[error("failed to parse response: {0}")]
    Parse(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// No owner identifier is known for conversation history.
    #[error("no conversation owner configured")]
    NoOwner,

    /// Core type error.
    #[error(transparent)]
    Core(#[from] shadow_chat_core::CoreError),
}

impl ClientError {
    /// HTTP status associated with the error, if the server answered.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Http(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl From<shadow_chat_core::IdError> for ClientError {
    fn from(err: shadow_chat_core::IdError) -> Self {
        Self::Core(err.into())
    }
}

//! Common error types for shadow-chat.

use thiserror::Error;

/// A result type using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while building or decoding core types.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An invalid identifier was provided.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] crate::ids::IdError),

    /// A stream frame parsed as JSON but did not carry a message list.
    #[error("malformed response frame: {0}")]
    MalformedFrame(String),
}

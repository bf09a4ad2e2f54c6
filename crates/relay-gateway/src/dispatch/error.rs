//! Handler error types

use thiserror::Error;

/// Error returned by a caller-registered event handler
///
/// Handler errors are logged and dropped; they never affect the session.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The event payload did not have the expected shape
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Payload could not be deserialized
    #[error("Deserialize error: {0}")]
    Json(#[from] serde_json::Error),

    /// Downstream collaborator (cache, database, ...) failed
    #[error("Handler failed: {0}")]
    Failed(String),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HandlerError {
    /// Create an invalid payload error
    #[must_use]
    pub fn invalid_payload(msg: impl std::fmt::Display) -> Self {
        Self::InvalidPayload(msg.to_string())
    }
}

/// Handler result type
pub type HandlerResult<T = ()> = Result<T, HandlerError>;

//! Gateway errors

use crate::codec::DecodeError;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while talking to the gateway
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Connection not established within {0:?}")]
    ConnectTimeout(Duration),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Outbound channel closed")]
    ChannelClosed,

    #[error("Send timed out")]
    SendTimeout,

    #[error("Session is closed")]
    SessionClosed,
}

impl GatewayError {
    /// Check if this error came from the transport rather than the protocol
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::WebSocket(_) | Self::ConnectTimeout(_))
    }
}

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

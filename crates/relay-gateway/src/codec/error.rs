//! Decoder error types

use thiserror::Error;

/// Errors raised while decoding inbound frames
///
/// Every variant is fatal for the physical connection: the zlib context
/// cannot be resynchronised once a frame is lost or corrupted.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The compressed stream is corrupt or out of order
    #[error("Inflate failed: {0}")]
    Inflate(#[from] flate2::DecompressError),

    /// The inflater made no progress on pending input
    #[error("Inflate stalled with {pending} bytes pending")]
    Stalled { pending: usize },

    /// The peer closed the compressed stream
    #[error("Compressed stream ended")]
    StreamEnded,

    /// The inflated bytes are not UTF-8
    #[error("Payload is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// The text is not a gateway envelope
    #[error("Malformed envelope: {0}")]
    Json(#[from] serde_json::Error),
}

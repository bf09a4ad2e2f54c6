//! Transport codec
//!
//! Turns WebSocket frames from a `compress=zlib-stream` connection into gateway messages.

mod error;
mod frame_decoder;

pub use error::DecodeError;
pub use frame_decoder::{FrameDecoder, ZLIB_SUFFIX};

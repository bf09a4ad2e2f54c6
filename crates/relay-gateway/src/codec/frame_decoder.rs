//! zlib-stream frame decoder
//!
//! The peer compresses the whole connection as ONE zlib stream and flushes it
//! with a sync flush at the end of every message. A message may arrive split
//! over several binary frames; the last frame of a message ends with the
//! sync-flush marker `00 00 FF FF`.

use super::DecodeError;
use crate::protocol::GatewayMessage;
use flate2::{Decompress, FlushDecompress, Status};

/// Trailing bytes of a sync flush, marking the end of one message
pub const ZLIB_SUFFIX: [u8; 4] = [0x00, 0x00, 0xFF, 0xFF];

/// Output growth step while inflating
const INFLATE_CHUNK: usize = 32 * 1024;

/// Reassembles and inflates gateway messages for one physical connection
///
/// The inflate context lives as long as the decoder and is never reset, so a
/// decoder must be fed every binary frame of its connection, in order.
pub struct FrameDecoder {
    /// Compressed bytes of the message in flight
    buffer: Vec<u8>,
    /// Connection-wide inflate context
    inflater: Decompress,
}

impl FrameDecoder {
    /// Create a decoder for a fresh connection
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            inflater: Decompress::new(true),
        }
    }

    /// Feed one binary frame
    ///
    /// Returns `Ok(None)` until a frame ending in [`ZLIB_SUFFIX`] completes a message.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Option<GatewayMessage>, DecodeError> {
        self.buffer.extend_from_slice(chunk);

        if chunk.len() < ZLIB_SUFFIX.len() || !chunk.ends_with(&ZLIB_SUFFIX) {
            return Ok(None);
        }

        let compressed = std::mem::take(&mut self.buffer);
        let inflated = self.inflate(&compressed)?;
        let text = String::from_utf8(inflated)?;

        Ok(Some(GatewayMessage::from_json(&text)?))
    }

    /// Parse a text frame; text frames bypass the compressed stream entirely
    pub fn decode_text(&self, text: &str) -> Result<GatewayMessage, DecodeError> {
        Ok(GatewayMessage::from_json(text)?)
    }

    /// Bytes buffered for the message in flight
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Total compressed bytes consumed by the inflate context
    #[must_use]
    pub fn total_in(&self) -> u64 {
        self.inflater.total_in()
    }

    fn inflate(&mut self, mut input: &[u8]) -> Result<Vec<u8>, DecodeError> {
        let mut output = Vec::with_capacity(input.len().saturating_mul(4).max(INFLATE_CHUNK));

        loop {
            if output.len() == output.capacity() {
                output.reserve(INFLATE_CHUNK);
            }

            let in_before = self.inflater.total_in();
            let out_before = self.inflater.total_out();
            let status = self
                .inflater
                .decompress_vec(input, &mut output, FlushDecompress::Sync)?;
            let consumed = (self.inflater.total_in() - in_before) as usize;
            let produced = self.inflater.total_out() - out_before;
            input = &input[consumed..];

            let output_full = output.len() == output.capacity();
            match status {
                Status::StreamEnd if input.is_empty() => break,
                Status::StreamEnd => return Err(DecodeError::StreamEnded),
                _ if input.is_empty() && !output_full => break,
                _ if consumed == 0 && produced == 0 && !output_full => {
                    return Err(DecodeError::Stalled {
                        pending: input.len(),
                    });
                }
                _ => {}
            }
        }

        Ok(output)
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FrameDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameDecoder")
            .field("pending", &self.buffer.len())
            .field("total_in", &self.inflater.total_in())
            .field("total_out", &self.inflater.total_out())
            .finish()
    }
}

//! gRPC length-prefixed message framing.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{CodecError, CodecResult};

/// Size of the frame header: one compression flag byte plus a big-endian u32 length.
pub const FRAME_HEADER_LEN: usize = 5;

/// Default upper bound on a single frame payload (4MB, the gRPC default).
pub const MAX_FRAME_SIZE: usize = 4 * 1024 * 1024;

/// One decoded message frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Whether the payload was marked as compressed by the sender
    pub compressed: bool,
    /// Raw payload bytes, still codec-encoded
    pub payload: Bytes,
}

/// Prefix `payload` with a gRPC frame header.
///
/// # Errors
///
/// [`CodecError::FrameTooLarge`] when the payload length does not fit the
/// 32-bit length field.
pub fn encode_frame(payload: &[u8], compressed: bool) -> CodecResult<Bytes> {
    let len = frame_len(payload.len())?;
    let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + payload.len());
    buf.put_u8(u8::from(compressed));
    buf.put_u32(len);
    buf.put_slice(payload);
    Ok(buf.freeze())
}

fn frame_len(len: usize) -> CodecResult<u32> {
    u32::try_from(len).map_err(|_| CodecError::FrameTooLarge {
        size: len,
        max: u32::MAX as usize,
    })
}

/// Incremental decoder for length-prefixed frames.
///
/// Bytes may arrive in arbitrary chunks; complete frames are handed out in
/// order. A header announcing more than `max_frame_size` bytes is rejected
/// before any payload is buffered.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    max_frame_size: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Create a decoder with the default 4MB frame limit
    pub fn new() -> Self {
        Self::with_max_size(MAX_FRAME_SIZE)
    }

    /// Create a decoder with a custom frame limit
    pub fn with_max_size(max_frame_size: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            max_frame_size,
        }
    }

    /// Append received bytes
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to take the next complete frame.
    ///
    /// Returns `Ok(None)` when more bytes are needed.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::FrameTooLarge`] when the header announces a payload
    /// beyond the limit. The buffer is cleared, since the stream can no longer
    /// be resynchronised.
    pub fn try_decode(&mut self) -> CodecResult<Option<Frame>> {
        if self.buffer.len() < FRAME_HEADER_LEN {
            return Ok(None);
        }

        let compressed = self.buffer[0] != 0;
        let len = u32::from_be_bytes([
            self.buffer[1],
            self.buffer[2],
            self.buffer[3],
            self.buffer[4],
        ]) as usize;

        if len > self.max_frame_size {
            tracing::warn!(
                frame_size = len,
                max_size = self.max_frame_size,
                "Frame exceeds maximum size, discarding buffer"
            );
            self.buffer.clear();
            return Err(CodecError::FrameTooLarge {
                size: len,
                max: self.max_frame_size,
            });
        }

        if self.buffer.len() < FRAME_HEADER_LEN + len {
            return Ok(None);
        }

        self.buffer.advance(FRAME_HEADER_LEN);
        let payload = self.buffer.split_to(len).freeze();
        Ok(Some(Frame {
            compressed,
            payload,
        }))
    }

    /// Clear the internal buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Get current buffer length
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Get maximum frame size
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

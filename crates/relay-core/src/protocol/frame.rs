//! Terminator-delimited frame codec.
//!
//! Wire format:
//! ```text
//! [payload:N][0x03]
//! ```
//! There is no length prefix.  A frame ends at the first `0x03` byte, so a
//! payload must never contain that byte itself.
//!
//! TCP is a stream protocol: one `read()` may return half a frame, or the end
//! of one frame plus the start of the next.  [`FrameDecoder`] accumulates
//! bytes across reads and hands out complete payloads one at a time, keeping
//! any bytes that follow a terminator for the next call.

use thiserror::Error;

/// The single control byte that terminates every frame.
pub const TERMINATOR: u8 = 0x03;

/// Upper bound on a buffered frame before the decoder gives up.
///
/// State replies from the management endpoint can run to several megabytes
/// on busy hosts, so the limit is generous.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

/// Errors that can occur while encoding or decoding frames.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// The payload handed to [`encode_frame`] contains the terminator byte.
    #[error("payload contains the frame terminator at offset {offset}")]
    EmbeddedTerminator { offset: usize },

    /// More than `limit` bytes arrived without a terminator.
    #[error("frame exceeds {limit} bytes without a terminator")]
    TooLarge { limit: usize },
}

// ── Encoding ──────────────────────────────────────────────────────────────────

/// Appends the terminator to `payload`, producing the bytes to put on the wire.
///
/// # Errors
///
/// Returns [`FrameError::EmbeddedTerminator`] if `payload` already contains
/// `0x03`; writing it would split the frame in two on the receiving side.
///
/// # Examples
///
/// ```rust
/// use relay_core::protocol::frame::{encode_frame, TERMINATOR};
///
/// let bytes = encode_frame(b"<auth1/>").unwrap();
/// assert_eq!(bytes.last(), Some(&TERMINATOR));
/// assert_eq!(&bytes[..bytes.len() - 1], b"<auth1/>");
/// ```
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    if let Some(offset) = payload.iter().position(|&b| b == TERMINATOR) {
        return Err(FrameError::EmbeddedTerminator { offset });
    }
    let mut buf = Vec::with_capacity(payload.len() + 1);
    buf.extend_from_slice(payload);
    buf.push(TERMINATOR);
    Ok(buf)
}

// ── Decoding ──────────────────────────────────────────────────────────────────

/// Incremental frame splitter.
///
/// Feed raw bytes with [`push`](Self::push) and drain complete payloads with
/// [`next_frame`](Self::next_frame).  Returned payloads never include the
/// terminator.
#[derive(Debug)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    /// Bytes of `buf` already searched for a terminator.
    scanned: usize,
    max_frame_bytes: usize,
}

impl FrameDecoder {
    /// Creates a decoder with [`DEFAULT_MAX_FRAME_BYTES`] as its limit.
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_MAX_FRAME_BYTES)
    }

    /// Creates a decoder that rejects frames longer than `max_frame_bytes`.
    pub fn with_limit(max_frame_bytes: usize) -> Self {
        Self {
            buf: Vec::with_capacity(4096),
            scanned: 0,
            max_frame_bytes,
        }
    }

    /// Appends freshly read bytes to the internal buffer.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Extracts the next complete payload, if one is buffered.
    ///
    /// Returns `Ok(None)` when more bytes are needed.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::TooLarge`] once the pending frame grows past the
    /// configured limit.  The decoder should be discarded after that.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        let found = self.buf[self.scanned..]
            .iter()
            .position(|&b| b == TERMINATOR)
            .map(|i| self.scanned + i);

        match found {
            Some(end) => {
                if end > self.max_frame_bytes {
                    return Err(FrameError::TooLarge {
                        limit: self.max_frame_bytes,
                    });
                }
                let mut frame: Vec<u8> = self.buf.drain(..=end).collect();
                frame.pop();
                self.scanned = 0;
                Ok(Some(frame))
            }
            None => {
                self.scanned = self.buf.len();
                if self.buf.len() > self.max_frame_bytes {
                    return Err(FrameError::TooLarge {
                        limit: self.max_frame_bytes,
                    });
                }
                Ok(None)
            }
        }
    }

    /// Number of bytes buffered but not yet returned as a frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_frame_appends_single_terminator() {
        // Arrange / Act
        let bytes = encode_frame(b"<get_state/>").unwrap();

        // Assert
        assert_eq!(bytes, b"<get_state/>\x03");
    }

    #[test]
    fn test_encode_frame_accepts_empty_payload() {
        assert_eq!(encode_frame(b"").unwrap(), vec![TERMINATOR]);
    }

    #[test]
    fn test_encode_frame_rejects_embedded_terminator() {
        let result = encode_frame(b"ab\x03cd");
        assert_eq!(result, Err(FrameError::EmbeddedTerminator { offset: 2 }));
    }

    #[test]
    fn test_decoder_returns_none_until_terminator_arrives() {
        // Arrange
        let mut decoder = FrameDecoder::new();
        decoder.push(b"<auth1");

        // Act / Assert: a partial frame is not a frame
        assert_eq!(decoder.next_frame().unwrap(), None);

        decoder.push(b"/>\x03");
        assert_eq!(decoder.next_frame().unwrap(), Some(b"<auth1/>".to_vec()));
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_decoder_keeps_bytes_after_terminator_for_next_frame() {
        // Arrange: two pipelined requests delivered in one read
        let mut decoder = FrameDecoder::new();
        decoder.push(b"first\x03sec");

        // Act
        let first = decoder.next_frame().unwrap();
        let pending = decoder.next_frame().unwrap();
        decoder.push(b"ond\x03");
        let second = decoder.next_frame().unwrap();

        // Assert
        assert_eq!(first, Some(b"first".to_vec()));
        assert_eq!(pending, None);
        assert_eq!(second, Some(b"second".to_vec()));
    }

    #[test]
    fn test_decoder_yields_empty_frame_for_bare_terminator() {
        let mut decoder = FrameDecoder::new();
        decoder.push(&[TERMINATOR]);
        assert_eq!(decoder.next_frame().unwrap(), Some(Vec::new()));
    }

    #[test]
    fn test_decoder_reports_oversized_frame_without_terminator() {
        // Arrange
        let mut decoder = FrameDecoder::with_limit(8);
        decoder.push(b"0123456789");

        // Act
        let result = decoder.next_frame();

        // Assert
        assert_eq!(result, Err(FrameError::TooLarge { limit: 8 }));
    }

    #[test]
    fn test_decoder_reports_oversized_frame_with_terminator() {
        let mut decoder = FrameDecoder::with_limit(4);
        decoder.push(b"toolong\x03");
        assert_eq!(decoder.next_frame(), Err(FrameError::TooLarge { limit: 4 }));
    }

    #[test]
    fn test_decoder_accepts_frame_exactly_at_limit() {
        let mut decoder = FrameDecoder::with_limit(4);
        decoder.push(b"abcd\x03");
        assert_eq!(decoder.next_frame().unwrap(), Some(b"abcd".to_vec()));
    }

    #[test]
    fn test_byte_by_byte_delivery_reassembles_frame() {
        // Arrange: worst-case fragmentation, one byte per read
        let wire = encode_frame(b"<nonce_hash>abc</nonce_hash>").unwrap();
        let mut decoder = FrameDecoder::new();
        let mut frames = Vec::new();

        // Act
        for byte in &wire {
            decoder.push(std::slice::from_ref(byte));
            if let Some(frame) = decoder.next_frame().unwrap() {
                frames.push(frame);
            }
        }

        // Assert
        assert_eq!(frames, vec![b"<nonce_hash>abc</nonce_hash>".to_vec()]);
    }
}

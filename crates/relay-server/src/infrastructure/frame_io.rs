//! Async frame reader and writer over any byte stream.
//!
//! TCP is a stream protocol: a single `read()` call may return part of a
//! frame, or the end of one frame and the start of the next.  [`FrameReader`]
//! keeps a [`FrameDecoder`] across reads so that bytes following a terminator
//! are retained for the next call instead of being lost.
//!
//! The same reader serves both sides of the relay: the console connection and
//! the connection to the local management endpoint.

use relay_core::{encode_frame, FrameDecoder};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::error::RelayError;

const READ_CHUNK: usize = 4096;

pub struct FrameReader<R> {
    inner: R,
    decoder: FrameDecoder,
    chunk: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_decoder(inner, FrameDecoder::new())
    }

    /// Creates a reader that fails once a frame grows past `max_frame_bytes`.
    pub fn with_limit(inner: R, max_frame_bytes: usize) -> Self {
        Self::with_decoder(inner, FrameDecoder::with_limit(max_frame_bytes))
    }

    fn with_decoder(inner: R, decoder: FrameDecoder) -> Self {
        Self {
            inner,
            decoder,
            chunk: vec![0u8; READ_CHUNK],
        }
    }

    /// Reads until one complete frame is available and returns its payload.
    ///
    /// Returns `Ok(None)` when the stream ends.  A partial frame at end of
    /// stream is discarded: the connection is closed, not a short frame.
    ///
    /// Cancel safe: if the future is dropped before completion, no buffered
    /// bytes are lost and the next call resumes where this one stopped.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Io`] on a read failure and [`RelayError::Frame`]
    /// when a frame exceeds the configured limit.
    pub async fn read_frame(&mut self) -> Result<Option<Vec<u8>>, RelayError> {
        loop {
            if let Some(frame) = self.decoder.next_frame()? {
                return Ok(Some(frame));
            }
            let n = self.inner.read(&mut self.chunk).await?;
            if n == 0 {
                if self.decoder.buffered() > 0 {
                    debug!(
                        discarded = self.decoder.buffered(),
                        "stream ended inside a frame"
                    );
                }
                return Ok(None);
            }
            self.decoder.push(&self.chunk[..n]);
        }
    }
}

/// Writes `payload` followed by the terminator and flushes.
///
/// # Errors
///
/// Returns [`RelayError::Frame`] if `payload` contains the terminator and
/// [`RelayError::Io`] if the write or flush fails.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), RelayError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let bytes = encode_frame(payload)?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

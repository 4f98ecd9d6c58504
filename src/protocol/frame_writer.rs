//! Frame writer: header, chunked body, single flush.
//!
//! The body is written in pieces no larger than the writer's buffer size.
//! The first failing piece aborts the frame; the rest are not attempted.

use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

use super::wire_format::{Header, DEFAULT_CHUNK_SIZE};
use crate::error::{Error, Result};

/// Buffered writer that emits one complete frame per call.
pub struct FrameWriter<W> {
    /// Buffered write half of the connection.
    inner: BufWriter<W>,
    /// Largest piece handed to the buffered writer at once.
    chunk_size: usize,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Create a frame writer with the default chunk size.
    pub fn new(writer: W) -> Self {
        Self::with_capacity(DEFAULT_CHUNK_SIZE, writer)
    }

    /// Create a frame writer whose buffer and body chunk are `capacity` bytes.
    pub fn with_capacity(capacity: usize, writer: W) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: BufWriter::with_capacity(capacity, writer),
            chunk_size: capacity,
        }
    }

    /// Body chunk size.
    #[inline]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Write `body` as one frame and flush.
    pub async fn write_frame(&mut self, body: &[u8]) -> Result<()> {
        let data_len = u32::try_from(body.len()).map_err(|_| {
            Error::Protocol(format!("body of {} bytes exceeds u32 length", body.len()))
        })?;
        let header = Header::new(data_len).encode();

        self.inner.write_all(&header).await?;
        tracing::trace!(" - header sent: {:02X?}", header);

        for (i, chunk) in body.chunks(self.chunk_size).enumerate() {
            self.inner.write_all(chunk).await?;
            tracing::trace!(
                " - msg chunk {} sent ({}/{} bytes)",
                i,
                (i * self.chunk_size + chunk.len()),
                body.len()
            );
        }

        self.inner.flush().await?;
        tracing::trace!(" -- write done");
        Ok(())
    }

    /// Shut down the write direction of the underlying stream.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner.shutdown().await?;
        Ok(())
    }

    /// Get a reference to the underlying writer.
    pub fn get_ref(&self) -> &W {
        self.inner.get_ref()
    }
}

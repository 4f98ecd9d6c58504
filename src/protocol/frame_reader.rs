//! Frame reader for accumulating partial reads.
//!
//! The socket is a plain byte stream, so one frame may arrive split across
//! any number of reads. [`FrameReader`] reads exactly [`HEADER_SIZE`] header
//! bytes, then keeps issuing reads until the declared body length has been
//! accumulated.
//!
//! # Example
//!
//! ```ignore
//! use binapi_sockclient::protocol::FrameReader;
//!
//! let mut reader = FrameReader::new(read_half);
//! let body = reader.read_frame().await?;
//! println!("got {} byte message", body.len());
//! ```

use bytes::{Bytes, BytesMut};
use tokio::io::{self, AsyncRead, AsyncReadExt, BufReader};

use super::wire_format::{Header, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_BODY_SIZE, HEADER_SIZE};
use crate::error::{Error, Result};

/// Buffered reader that yields one frame body per call.
pub struct FrameReader<R> {
    /// Buffered read half of the connection.
    inner: BufReader<R>,
    /// Header of the most recently read frame.
    last_header: Header,
    /// Maximum accepted body length.
    max_body_size: u32,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Create a frame reader with the default buffer size.
    pub fn new(reader: R) -> Self {
        Self::with_capacity(DEFAULT_CHUNK_SIZE, reader)
    }

    /// Create a frame reader with a custom buffer size.
    pub fn with_capacity(capacity: usize, reader: R) -> Self {
        Self {
            inner: BufReader::with_capacity(capacity, reader),
            last_header: Header::default(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }

    /// Set the maximum accepted body length.
    pub fn set_max_body_size(&mut self, max_body_size: u32) {
        self.max_body_size = max_body_size;
    }

    /// Read the next frame and return its body.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the stream ends cleanly between frames
    /// - [`Error::HeaderSize`] if the stream ends inside the header
    /// - [`Error::ZeroRead`] if the stream ends inside the body
    /// - [`Error::Protocol`] if the declared length exceeds the maximum; the
    ///   body is skipped so the stream stays aligned
    pub async fn read_frame(&mut self) -> Result<Bytes> {
        tracing::trace!("reading next msg..");

        let header = self.read_header().await?;
        if header.data_len > self.max_body_size {
            self.skip_body(header.body_len()).await?;
            return Err(Error::Protocol(format!(
                "body length {} exceeds maximum {}",
                header.data_len, self.max_body_size
            )));
        }
        self.last_header = header;

        let body = self.read_body(header.body_len()).await?;
        tracing::trace!(
            len = body.len(),
            buffered = self.buffered(),
            "read done"
        );
        Ok(body)
    }

    async fn read_header(&mut self) -> Result<Header> {
        let mut buf = [0u8; HEADER_SIZE];
        let mut filled = 0;

        while filled < HEADER_SIZE {
            let n = self.inner.read(&mut buf[filled..]).await?;
            if n == 0 {
                if filled == 0 {
                    return Err(Error::ConnectionClosed);
                }
                tracing::debug!("invalid header data ({}): {:02X?}", filled, &buf[..filled]);
                return Err(Error::HeaderSize {
                    expected: HEADER_SIZE,
                    got: filled,
                });
            }
            filled += n;
        }

        let header = Header::decode(&buf)
            .ok_or_else(|| Error::Protocol("header buffer shorter than 16 bytes".to_string()))?;
        tracing::trace!(?header, "decoded header");
        Ok(header)
    }

    async fn read_body(&mut self, len: usize) -> Result<Bytes> {
        let mut body = BytesMut::zeroed(len);
        let mut filled = 0;

        while filled < len {
            let n = self.inner.read(&mut body[filled..]).await?;
            if n == 0 {
                return Err(Error::ZeroRead {
                    expected: len,
                    remaining: len - filled,
                });
            }
            filled += n;
            if filled < len {
                tracing::trace!("continue read for another {} bytes", len - filled);
            }
        }

        Ok(body.freeze())
    }

    /// Discard `len` body bytes so the next read starts at a header.
    async fn skip_body(&mut self, len: usize) -> Result<()> {
        let skipped = io::copy(&mut (&mut self.inner).take(len as u64), &mut io::sink()).await?;
        if skipped < len as u64 {
            return Err(Error::ZeroRead {
                expected: len,
                remaining: len - skipped as usize,
            });
        }
        tracing::debug!("skipped {} byte oversized body", len);
        Ok(())
    }

    /// Header of the most recently read frame.
    ///
    /// Reserved and marker fields are kept as received, never interpreted.
    #[inline]
    pub fn last_header(&self) -> Header {
        self.last_header
    }

    /// Bytes read from the socket but not yet consumed.
    #[inline]
    pub fn buffered(&self) -> usize {
        self.inner.buffer().len()
    }

    /// Get a reference to the underlying reader.
    pub fn get_ref(&self) -> &R {
        self.inner.get_ref()
    }
}

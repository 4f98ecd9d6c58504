//! Serialized frame writer shared by the session and its send handles.
//!
//! Every outbound frame goes through a single [`Writer`], which holds the
//! [`FrameWriter`] behind an async mutex. The lock is held for the whole
//! header + chunked body + flush sequence, so two concurrent sends never
//! interleave their bytes on the socket.
//!
//! # Architecture
//!
//! ```text
//! Session::send_msg ─┐
//! MsgSender (clone) ─┼─► Arc<Writer> ─► Mutex<FrameWriter> ─► socket
//! handshake open/close ─┘
//! ```
//!
//! Closing the writer takes the [`FrameWriter`] out of the mutex. Any send
//! after that fails with [`Error::NotConnected`] instead of touching a
//! released socket.

use std::sync::Arc;

use tokio::io::AsyncWrite;
use tokio::net::unix::OwnedWriteHalf;
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::protocol::{FrameWriter, RequestHeader};

/// Mutex-guarded frame writer.
pub struct Writer<W> {
    inner: Mutex<Option<FrameWriter<W>>>,
}

impl<W: AsyncWrite + Unpin> Writer<W> {
    /// Wrap a frame writer.
    pub fn new(frame_writer: FrameWriter<W>) -> Self {
        Self {
            inner: Mutex::new(Some(frame_writer)),
        }
    }

    /// Write one frame under the lock.
    pub async fn write_frame(&self, body: &[u8]) -> Result<()> {
        let mut guard = self.inner.lock().await;
        let writer = guard.as_mut().ok_or(Error::NotConnected)?;
        writer.write_frame(body).await.map_err(|e| {
            tracing::debug!("Write error: {}", e);
            e
        })
    }

    /// Stamp `client_index` and `context` into bytes 2..10 of `data`, then write it.
    ///
    /// The caller's buffer is modified in place.
    pub async fn send_msg(&self, client_index: u32, context: u32, data: &mut [u8]) -> Result<()> {
        RequestHeader {
            client_index,
            context,
        }
        .encode_into(data)?;

        tracing::trace!(
            "sendMsg (ctx={}) ({} bytes): {:02X?}",
            context,
            data.len(),
            data
        );

        self.write_frame(data).await
    }

    /// Flush and shut down the write side, then release it.
    ///
    /// Closing twice is a no-op.
    pub async fn close(&self) -> Result<()> {
        let taken = self.inner.lock().await.take();
        match taken {
            Some(mut writer) => writer.shutdown().await,
            None => Ok(()),
        }
    }

    /// Check if the writer has been closed.
    pub async fn is_closed(&self) -> bool {
        self.inner.lock().await.is_none()
    }
}

/// Cloneable handle for sending application messages on a live session.
///
/// Holds the client index negotiated at connect time. Handles outlive a
/// disconnect safely: once the session closes its writer, sends return
/// [`Error::NotConnected`].
pub struct MsgSender<W = OwnedWriteHalf> {
    writer: Arc<Writer<W>>,
    client_index: u32,
}

impl<W> Clone for MsgSender<W> {
    fn clone(&self) -> Self {
        Self {
            writer: Arc::clone(&self.writer),
            client_index: self.client_index,
        }
    }
}

impl<W: AsyncWrite + Unpin> MsgSender<W> {
    /// Create a handle bound to `client_index`.
    pub fn new(writer: Arc<Writer<W>>, client_index: u32) -> Self {
        Self {
            writer,
            client_index,
        }
    }

    /// Send an encoded request body.
    ///
    /// `data` must hold at least the 10-byte request header; bytes 2..10
    /// are overwritten with this session's client index and `context`.
    pub async fn send_msg(&self, context: u32, data: &mut [u8]) -> Result<()> {
        self.writer.send_msg(self.client_index, context, data).await
    }

    /// Client index stamped into every request.
    #[inline]
    pub fn client_index(&self) -> u32 {
        self.client_index
    }
}

impl<W> std::fmt::Debug for MsgSender<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MsgSender")
            .field("client_index", &self.client_index)
            .finish_non_exhaustive()
    }
}

//! Session builder and lifecycle.
//!
//! The [`SessionBuilder`] provides a fluent API for configuring a session.
//! The [`Session`] manages the lifecycle:
//! 1. Wait for the socket file (optional)
//! 2. Dial the socket
//! 3. Open the session (`sockclnt_create`), build the message table
//! 4. Spawn the reader loop and dispatch inbound messages
//! 5. On disconnect: stop the loop, send `sockclnt_delete`, close the socket
//!
//! # Example
//!
//! ```ignore
//! use binapi_sockclient::Session;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut session = Session::builder()
//!         .socket_path("/run/vpp/api.sock")
//!         .client_name("my-agent")
//!         .build();
//!
//!     let mut replies = session.subscribe(64);
//!     session.wait_ready().await?;
//!     session.connect().await?;
//!
//!     let ping_id = session.get_msg_id("control_ping", "51077d14")?;
//!     let mut ping = vec![0u8; 10];
//!     ping[..2].copy_from_slice(&ping_id.to_be_bytes());
//!     session.send_msg(1, &mut ping).await?;
//!
//!     if let Some(reply) = replies.recv().await {
//!         println!("reply ID={} context={}", reply.msg_id(), reply.context());
//!     }
//!
//!     session.disconnect().await?;
//!     Ok(())
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::SessionConfig;
use crate::control::{close_session, open_session, MsgTable};
use crate::error::{Error, Result};
use crate::handler::{MessageSink, SinkSlot};
use crate::protocol::{FrameReader, InboundMessage};
use crate::reader::spawn_reader_loop;
use crate::transport::{self, check_legacy_socket, socket_exists, SocketControl};
use crate::writer::{MsgSender, Writer};

const SOCKET_MISSING: &str = "
------------------------------------------------------------
 No socket file found at: {path}
 Binary API socket file is missing!

  - is the dataplane running with the binary API socket enabled?
  - is the correct socket path configured?

 To enable it add the following section to the dataplane config:
   socksvr {
     default
   }
------------------------------------------------------------";

/// Builder for configuring and creating a [`Session`].
#[derive(Debug, Default)]
pub struct SessionBuilder {
    config: SessionConfig,
    sink: MessageSink,
}

impl SessionBuilder {
    /// Create a builder with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the API socket path.
    ///
    /// Default: `/run/vpp/api.sock`
    pub fn socket_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.socket_path = path.into();
        self
    }

    /// Set the legacy fallback path, or `None` to disable the fallback.
    ///
    /// Default: `/run/vpp-api.sock`
    pub fn legacy_socket_path(mut self, path: Option<PathBuf>) -> Self {
        self.config.legacy_socket_path = path;
        self
    }

    /// Set the client name sent in `sockclnt_create`.
    pub fn client_name(mut self, name: impl Into<String>) -> Self {
        self.config.client_name = name.into();
        self
    }

    /// Set the dial and create-reply deadline.
    ///
    /// Default: 3 seconds
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the delete-reply deadline.
    ///
    /// Default: 100 milliseconds
    pub fn disconnect_timeout(mut self, timeout: Duration) -> Self {
        self.config.disconnect_timeout = timeout;
        self
    }

    /// Set the maximum time `wait_ready` blocks.
    ///
    /// Default: 10 seconds
    pub fn max_wait_ready(mut self, timeout: Duration) -> Self {
        self.config.max_wait_ready = timeout;
        self
    }

    /// Set the read buffer and write chunk size.
    ///
    /// Default: 4096
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Dump the negotiated message table at debug level.
    pub fn log_msg_table(mut self, enabled: bool) -> Self {
        self.config.log_msg_table = enabled;
        self
    }

    /// Invoke `callback` with `(msg_id, body)` for each inbound message.
    pub fn on_message<F>(mut self, callback: F) -> Self
    where
        F: Fn(u16, Bytes) + Send + Sync + 'static,
    {
        self.sink = MessageSink::callback(callback);
        self
    }

    /// Build the session. Nothing is connected yet.
    pub fn build(self) -> Session {
        Session {
            sock_addr: self.config.socket_path.clone(),
            config: self.config,
            sink: SinkSlot::new(self.sink),
            missing_socket_warned: false,
            active: None,
        }
    }
}

/// State that exists only while connected.
struct ActiveSession {
    control: SocketControl,
    writer: Arc<Writer<OwnedWriteHalf>>,
    client_index: u32,
    msg_table: MsgTable,
    shutdown_tx: Option<oneshot::Sender<()>>,
    reader_task: Option<JoinHandle<FrameReader<OwnedReadHalf>>>,
}

/// A client session on the binary API socket.
///
/// Exclusively owned by the caller. Use [`Session::sender`] to send from
/// other tasks.
pub struct Session {
    config: SessionConfig,
    /// Effective socket path; may switch to the legacy path.
    sock_addr: PathBuf,
    sink: SinkSlot,
    missing_socket_warned: bool,
    active: Option<ActiveSession>,
}

impl Session {
    /// Create a new session builder.
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Create a session from `config`.
    pub fn new(config: SessionConfig) -> Self {
        SessionBuilder::new().config(config).build()
    }

    /// Configuration in use.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Effective socket path (the legacy path once the fallback applied).
    pub fn socket_path(&self) -> &Path {
        &self.sock_addr
    }

    /// Set the dial and create-reply deadline for the next connect.
    pub fn set_connect_timeout(&mut self, timeout: Duration) {
        self.config.connect_timeout = timeout;
    }

    /// Set the delete-reply deadline for the next disconnect.
    pub fn set_disconnect_timeout(&mut self, timeout: Duration) {
        self.config.disconnect_timeout = timeout;
    }

    /// Deliver inbound messages to `callback`.
    ///
    /// The callback runs on the reader task; a slow callback stalls receiving.
    pub fn set_msg_callback<F>(&self, callback: F)
    where
        F: Fn(u16, Bytes) + Send + Sync + 'static,
    {
        tracing::debug!("SetMsgCallback");
        self.sink.set(MessageSink::callback(callback));
    }

    /// Deliver inbound messages to a bounded channel and return its receiver.
    ///
    /// When the channel is full the reader loop waits for the consumer.
    /// Replaces any previous callback or channel.
    pub fn subscribe(&self, capacity: usize) -> mpsc::Receiver<InboundMessage> {
        let (sink, rx) = MessageSink::channel(capacity);
        self.sink.set(sink);
        rx
    }

    /// Whether the diagnostic for a missing socket was already logged.
    pub fn missing_socket_warned(&self) -> bool {
        self.missing_socket_warned
    }

    /// Block until the socket file exists, at most `max_wait_ready`.
    pub async fn wait_ready(&mut self) -> Result<()> {
        transport::wait_ready(
            &mut self.sock_addr,
            self.config.legacy_socket_path.as_deref(),
            self.config.max_wait_ready,
        )
        .await
    }

    /// Dial the socket, open the session and start the reader loop.
    ///
    /// On any failure after dialing, the socket is closed again before the
    /// error is returned.
    pub async fn connect(&mut self) -> Result<()> {
        if self.active.is_some() {
            return Err(Error::AlreadyConnected);
        }

        check_legacy_socket(
            &mut self.sock_addr,
            self.config.legacy_socket_path.as_deref(),
        );

        if !socket_exists(&self.sock_addr)? {
            self.warn_missing_socket();
            return Err(Error::SocketMissing(self.sock_addr.clone()));
        }

        let connect_timeout = self.config.connect_timeout;
        let conn = match tokio::time::timeout(connect_timeout, transport::connect(&self.sock_addr))
            .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(Error::Timeout {
                    operation: "connect",
                    timeout: connect_timeout,
                })
            }
        };

        let (mut reader, frame_writer, control) = conn.into_parts(self.config.chunk_size)?;
        let writer = Arc::new(Writer::new(frame_writer));

        let info = match open_session(
            &mut reader,
            &writer,
            &self.config.client_name,
            connect_timeout,
            self.config.log_msg_table,
        )
        .await
        {
            Ok(info) => info,
            Err(e) => {
                tracing::debug!("Session open failed: {}", e);
                if let Err(e) = writer.close().await {
                    tracing::debug!("Closing writer failed: {}", e);
                }
                if let Err(close_err) = control.close() {
                    tracing::debug!("Closing socket failed: {}", close_err);
                }
                return Err(e);
            }
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let span = tracing::debug_span!(
            "binapi_reader",
            socket = %self.sock_addr.display(),
            client_index = info.client_index
        );
        let reader_task = spawn_reader_loop(reader, self.sink.clone(), shutdown_rx, span);

        tracing::debug!(
            "Connected: client index {}, {} messages in table",
            info.client_index,
            info.msg_table.len()
        );

        self.active = Some(ActiveSession {
            control,
            writer,
            client_index: info.client_index,
            msg_table: info.msg_table,
            shutdown_tx: Some(shutdown_tx),
            reader_task: Some(reader_task),
        });
        Ok(())
    }

    /// Stop the reader loop, close the session and release the socket.
    ///
    /// Returns `Ok(())` when not connected. Errors from the delete exchange
    /// are logged, not returned; only a failure to close the socket is.
    pub async fn disconnect(&mut self) -> Result<()> {
        let Some(mut active) = self.active.take() else {
            return Ok(());
        };
        tracing::debug!("Disconnecting..");

        if let Some(tx) = active.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = active.control.shutdown_read() {
            tracing::debug!("closing read failed: {}", e);
        }

        let mut reader = match active.reader_task.take() {
            Some(task) => match task.await {
                Ok(reader) => Some(reader),
                Err(e) => {
                    tracing::debug!("reader loop ended abnormally: {}", e);
                    None
                }
            },
            None => None,
        };

        if let Err(e) = close_session(
            reader.as_mut(),
            &active.writer,
            active.client_index,
            active.msg_table.delete_msg_id(),
            self.config.disconnect_timeout,
        )
        .await
        {
            tracing::debug!("closing failed: {}", e);
        }

        if let Err(e) = active.writer.close().await {
            tracing::debug!("Closing writer failed: {}", e);
        }
        drop(reader);
        active.control.close().map_err(|e| {
            tracing::debug!("Closing socket failed: {}", e);
            e
        })
    }

    /// Whether a session is open.
    pub fn is_connected(&self) -> bool {
        self.active.is_some()
    }

    /// Client index assigned at connect.
    pub fn client_index(&self) -> Option<u32> {
        self.active.as_ref().map(|a| a.client_index)
    }

    /// ID of `sockclnt_delete` in the current table.
    pub fn delete_msg_id(&self) -> Option<u16> {
        self.active.as_ref().and_then(|a| a.msg_table.delete_msg_id())
    }

    /// Negotiated message table.
    pub fn msg_table(&self) -> Option<&MsgTable> {
        self.active.as_ref().map(|a| &a.msg_table)
    }

    /// Look up the message ID of `name` with schema fingerprint `crc`.
    pub fn get_msg_id(&self, name: &str, crc: &str) -> Result<u16> {
        let active = self.active.as_ref().ok_or(Error::NotConnected)?;
        active.msg_table.lookup(name, crc)
    }

    /// Send an encoded request body.
    ///
    /// Bytes 2..10 of `data` are overwritten with the client index and
    /// `context`. Replies arrive through the message callback or channel.
    pub async fn send_msg(&self, context: u32, data: &mut [u8]) -> Result<()> {
        let active = self.active.as_ref().ok_or(Error::NotConnected)?;
        active
            .writer
            .send_msg(active.client_index, context, data)
            .await
    }

    /// Cloneable send handle for the current connection.
    pub fn sender(&self) -> Result<MsgSender> {
        let active = self.active.as_ref().ok_or(Error::NotConnected)?;
        Ok(MsgSender::new(
            Arc::clone(&active.writer),
            active.client_index,
        ))
    }

    fn warn_missing_socket(&mut self) {
        if self.missing_socket_warned {
            return;
        }
        self.missing_socket_warned = true;
        tracing::warn!(
            "{}",
            SOCKET_MISSING.replace("{path}", &self.sock_addr.display().to_string())
        );
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(mut active) = self.active.take() {
            tracing::debug!("Session dropped while connected, shutting down socket");
            if let Some(tx) = active.shutdown_tx.take() {
                let _ = tx.send(());
            }
            if let Err(e) = active.control.close() {
                tracing::debug!("Closing socket failed: {}", e);
            }
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("socket_path", &self.sock_addr)
            .field("connected", &self.is_connected())
            .field("client_index", &self.client_index())
            .finish_non_exhaustive()
    }
}

//! Error types for binapi-sockclient.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Main error type for all socket client operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error during socket operations (including dial failures, verbatim).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Filesystem watcher failed while waiting for the socket file.
    #[error("file watcher error: {0}")]
    Watch(#[from] notify::Error),

    /// No socket file at the configured path (nor the legacy path).
    #[error("API socket file {} does not exist", .0.display())]
    SocketMissing(PathBuf),

    /// Checking the socket path failed for a reason other than absence.
    #[error("API socket error for {}: {source}", path.display())]
    SocketStat {
        /// Path that was checked.
        path: PathBuf,
        /// Underlying stat error.
        #[source]
        source: io::Error,
    },

    /// The socket file did not appear within the wait budget.
    #[error("timeout waiting ({timeout:?}) for socket file: {}", path.display())]
    WaitTimeout {
        /// Path that was waited for.
        path: PathBuf,
        /// Configured maximum wait.
        timeout: Duration,
    },

    /// Stream ended inside the 16-byte transport header.
    #[error("invalid header (expected {expected} bytes, got {got})")]
    HeaderSize {
        /// Header size the protocol requires.
        expected: usize,
        /// Bytes actually received before the stream ended.
        got: usize,
    },

    /// A body read returned no data while more bytes were still expected.
    #[error("zero-byte read with {remaining} of {expected} body bytes outstanding")]
    ZeroRead {
        /// Declared body length.
        expected: usize,
        /// Bytes still missing.
        remaining: usize,
    },

    /// Connection closed (clean end of stream between frames).
    #[error("Connection closed")]
    ConnectionClosed,

    /// Protocol error (malformed header window, bad frame layout, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Message body could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// A deadline-scoped handshake read did not complete in time.
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        /// Operation that was waiting.
        operation: &'static str,
        /// Deadline that elapsed.
        timeout: Duration,
    },

    /// Message name/CRC pair not present in the negotiated message table.
    #[error("unknown message: {name}_{crc}")]
    UnknownMessage {
        /// Requested message name.
        name: String,
        /// Requested schema fingerprint.
        crc: String,
    },

    /// Operation requires an open session.
    #[error("not connected")]
    NotConnected,

    /// `connect` called on a session that is already open.
    #[error("already connected")]
    AlreadyConnected,
}

impl Error {
    /// Check if this is a deadline expiry.
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::Timeout { .. } => true,
            Error::Io(e) => e.kind() == io::ErrorKind::TimedOut,
            _ => false,
        }
    }

    /// Check if the error means the read side is gone: clean end of stream,
    /// a stream cut mid-frame, or a socket that was shut down or reset.
    pub fn is_disconnect(&self) -> bool {
        match self {
            Error::ConnectionClosed | Error::HeaderSize { .. } | Error::ZeroRead { .. } => true,
            Error::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::NotConnected
            ),
            _ => false,
        }
    }
}

/// Result type alias using the crate [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

//! Unix socket connector.
//!
//! Dials the API socket as a stream socket. Older dataplanes listen with
//! `SOCK_SEQPACKET`; dialing those as a stream fails with `EPROTOTYPE`, in
//! which case the dial is retried once as seqpacket. Any other failure is
//! returned as is.
//!
//! # Example
//!
//! ```ignore
//! use binapi_sockclient::transport::connect;
//!
//! let conn = connect("/run/vpp/api.sock".as_ref()).await?;
//! let (reader, writer, control) = conn.into_parts(4096)?;
//! ```

use std::io;
use std::net::Shutdown;
use std::os::fd::{AsFd, AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;

use crate::error::Result;
use crate::protocol::{FrameReader, FrameWriter};

#[cfg(any(target_os = "linux", target_os = "android"))]
const SOCK_CLOEXEC: libc::c_int = libc::SOCK_CLOEXEC;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const SOCK_CLOEXEC: libc::c_int = 0;

/// Socket type the connection ended up using.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketKind {
    /// `SOCK_STREAM`.
    Stream,
    /// `SOCK_SEQPACKET`, used after the stream dial was refused.
    SeqPacket,
}

/// A connected API socket, not yet split.
#[derive(Debug)]
pub struct Connection {
    stream: UnixStream,
    kind: SocketKind,
}

impl Connection {
    /// Socket type of this connection.
    #[inline]
    pub fn kind(&self) -> SocketKind {
        self.kind
    }

    /// Split into a frame reader, a frame writer and a control handle.
    ///
    /// `chunk_size` sizes both the read buffer and the write chunk.
    pub fn into_parts(
        self,
        chunk_size: usize,
    ) -> Result<(
        FrameReader<OwnedReadHalf>,
        FrameWriter<OwnedWriteHalf>,
        SocketControl,
    )> {
        let control = SocketControl::from_stream(&self.stream)?;

        if let (Ok(local), Ok(peer)) = (self.stream.local_addr(), self.stream.peer_addr()) {
            tracing::debug!(
                "Connected to socket (local addr: {:?}, remote: {:?}, kind: {:?})",
                local,
                peer,
                self.kind
            );
        }

        let (read_half, write_half) = self.stream.into_split();
        Ok((
            FrameReader::with_capacity(chunk_size, read_half),
            FrameWriter::with_capacity(chunk_size, write_half),
            control,
        ))
    }
}

/// Connect to the API socket at `path`.
///
/// Falls back to `SOCK_SEQPACKET` only when the stream dial fails with
/// `EPROTOTYPE`.
pub async fn connect(path: &Path) -> Result<Connection> {
    tracing::debug!("Connecting to: {}", path.display());

    match UnixStream::connect(path).await {
        Ok(stream) => Ok(Connection {
            stream,
            kind: SocketKind::Stream,
        }),
        Err(e) if is_wrong_socket_type(&e) => {
            tracing::debug!("{}, retrying connect with type seqpacket", e);
            let stream = connect_seqpacket(path.to_path_buf()).await.map_err(|e| {
                tracing::debug!("Connecting to socket {} failed: {}", path.display(), e);
                e
            })?;
            Ok(Connection {
                stream,
                kind: SocketKind::SeqPacket,
            })
        }
        Err(e) => {
            tracing::debug!("Connecting to socket {} failed: {}", path.display(), e);
            Err(e.into())
        }
    }
}

fn is_wrong_socket_type(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::EPROTOTYPE)
}

async fn connect_seqpacket(path: PathBuf) -> io::Result<UnixStream> {
    let std_stream = tokio::task::spawn_blocking(move || dial_seqpacket(&path))
        .await
        .map_err(io::Error::other)??;
    std_stream.set_nonblocking(true)?;
    UnixStream::from_std(std_stream)
}

fn dial_seqpacket(path: &Path) -> io::Result<std::os::unix::net::UnixStream> {
    let path_bytes = path.as_os_str().as_bytes();

    // SAFETY: sockaddr_un is plain old data; all-zero is a valid value.
    let mut addr: libc::sockaddr_un = unsafe { std::mem::zeroed() };
    if path_bytes.len() >= addr.sun_path.len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("socket path too long: {}", path.display()),
        ));
    }
    addr.sun_family = libc::AF_UNIX as libc::sa_family_t;
    for (dst, src) in addr.sun_path.iter_mut().zip(path_bytes) {
        *dst = *src as libc::c_char;
    }

    // SAFETY: socket() takes no pointers; the result is checked below.
    let raw = unsafe { libc::socket(libc::AF_UNIX, libc::SOCK_SEQPACKET | SOCK_CLOEXEC, 0) };
    if raw < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: `raw` is a freshly created descriptor owned by nothing else.
    let fd = unsafe { OwnedFd::from_raw_fd(raw) };

    let addr_len = std::mem::size_of::<libc::sa_family_t>() + path_bytes.len() + 1;
    // SAFETY: `addr` is a fully initialized sockaddr_un and `addr_len` does
    // not exceed its size.
    let ret = unsafe {
        libc::connect(
            fd.as_raw_fd(),
            &addr as *const libc::sockaddr_un as *const libc::sockaddr,
            addr_len as libc::socklen_t,
        )
    };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(std::os::unix::net::UnixStream::from(fd))
}

/// Duplicate descriptor of a connected socket, kept after the stream is split.
///
/// Shutting down the read direction through this handle wakes a reader task
/// blocked on the other half.
#[derive(Debug)]
pub struct SocketControl {
    socket: std::os::unix::net::UnixStream,
}

impl SocketControl {
    /// Duplicate the descriptor of `stream`.
    pub fn from_stream(stream: &UnixStream) -> Result<Self> {
        let fd = stream.as_fd().try_clone_to_owned()?;
        Ok(Self {
            socket: std::os::unix::net::UnixStream::from(fd),
        })
    }

    /// Shut down the read direction; pending and future reads see EOF.
    pub fn shutdown_read(&self) -> Result<()> {
        match self.socket.shutdown(Shutdown::Read) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Shut down both directions and release the descriptor.
    pub fn close(self) -> Result<()> {
        tracing::debug!("Closing socket");
        match self.socket.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

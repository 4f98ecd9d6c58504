//! Transport module - Unix socket dialing and readiness.
//!
//! Provides:
//! - Stream dial with a one-shot `SOCK_SEQPACKET` retry
//! - A duplicated control descriptor for shutting down a split socket
//! - Waiting for the socket file to appear, with legacy path fallback

mod socket;
mod wait;

pub use socket::{connect, Connection, SocketControl, SocketKind};
pub use wait::{check_legacy_socket, socket_exists, wait_ready};

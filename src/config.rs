//! Session configuration.
//!
//! Deserializable so an embedding application can load it from its own
//! config file. Durations are written as integer milliseconds.
//!
//! ```
//! use binapi_sockclient::SessionConfig;
//!
//! let config = SessionConfig::default();
//! assert_eq!(config.socket_path.to_str(), Some("/run/vpp/api.sock"));
//! assert_eq!(config.chunk_size, 4096);
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol::DEFAULT_CHUNK_SIZE;

/// Default API socket path.
pub const DEFAULT_SOCKET_PATH: &str = "/run/vpp/api.sock";

/// Socket path used by older dataplanes.
pub const LEGACY_SOCKET_PATH: &str = "/run/vpp-api.sock";

/// Default client name sent in `sockclnt_create`.
pub const DEFAULT_CLIENT_NAME: &str = "binapi-sockclient";

/// Default deadline for dialing and for the create reply.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Default deadline for the delete reply.
pub const DEFAULT_DISCONNECT_TIMEOUT: Duration = Duration::from_millis(100);

/// Default maximum time [`Session::wait_ready`](crate::Session::wait_ready) blocks.
pub const DEFAULT_MAX_WAIT_READY: Duration = Duration::from_secs(10);

/// Configuration for a [`Session`](crate::Session).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Path of the API socket.
    pub socket_path: PathBuf,
    /// Fallback path tried when `socket_path` does not exist.
    pub legacy_socket_path: Option<PathBuf>,
    /// Name registered with the dataplane.
    pub client_name: String,
    /// Dial and create-reply deadline.
    #[serde(rename = "connect_timeout_ms", with = "duration_ms")]
    pub connect_timeout: Duration,
    /// Delete-reply deadline.
    #[serde(rename = "disconnect_timeout_ms", with = "duration_ms")]
    pub disconnect_timeout: Duration,
    /// Upper bound for waiting on the socket file.
    #[serde(rename = "max_wait_ready_ms", with = "duration_ms")]
    pub max_wait_ready: Duration,
    /// Read buffer size and write chunk size.
    pub chunk_size: usize,
    /// Dump the negotiated message table at debug level.
    pub log_msg_table: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            legacy_socket_path: Some(PathBuf::from(LEGACY_SOCKET_PATH)),
            client_name: DEFAULT_CLIENT_NAME.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            disconnect_timeout: DEFAULT_DISCONNECT_TIMEOUT,
            max_wait_ready: DEFAULT_MAX_WAIT_READY,
            chunk_size: DEFAULT_CHUNK_SIZE,
            log_msg_table: false,
        }
    }
}

impl SessionConfig {
    /// Default configuration for a socket at `path`.
    pub fn with_socket_path(path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: path.into(),
            ..Self::default()
        }
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let ms = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(ms)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

//! Socket readiness waiting.
//!
//! The dataplane creates its API socket some time after it starts. These
//! helpers block until the socket file exists, watching its parent
//! directory for a create event instead of polling.
//!
//! A legacy socket location can be configured. When the configured socket
//! is missing but the legacy one exists, the session switches to the legacy
//! path for its lifetime.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Event, EventKind, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::error::{Error, Result};

/// Check whether the socket file exists, distinguishing absence from stat failure.
pub fn socket_exists(path: &Path) -> Result<bool> {
    match std::fs::metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(Error::SocketStat {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Switch `sock_addr` to `legacy` when `sock_addr` is missing and the legacy file exists.
///
/// Nothing happens when `sock_addr` already is the legacy path. Returns true
/// when the switch happened.
pub fn check_legacy_socket(sock_addr: &mut PathBuf, legacy: Option<&Path>) -> bool {
    let Some(legacy) = legacy else {
        return false;
    };
    if sock_addr.as_path() == legacy {
        return false;
    }
    if !matches!(socket_exists(sock_addr), Ok(false)) {
        return false;
    }
    if matches!(socket_exists(legacy), Ok(true)) {
        tracing::debug!(
            "Socket file {} does not exist, using legacy path {}",
            sock_addr.display(),
            legacy.display()
        );
        *sock_addr = legacy.to_path_buf();
        return true;
    }
    false
}

/// Wait until the socket at `sock_addr` exists, at most `max_wait`.
///
/// Returns immediately if the file is already there or the legacy switch
/// applies. Otherwise the parent directory is watched for a create event
/// whose file name matches. On timeout the legacy check runs once more
/// before giving up with [`Error::WaitTimeout`].
pub async fn wait_ready(
    sock_addr: &mut PathBuf,
    legacy: Option<&Path>,
    max_wait: Duration,
) -> Result<()> {
    if socket_exists(sock_addr)? {
        return Ok(());
    }
    if check_legacy_socket(sock_addr, legacy) {
        return Ok(());
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        let _ = tx.send(res);
    })?;

    let dir = watch_dir(sock_addr);
    tracing::debug!("Waiting for socket {} (watching {})", sock_addr.display(), dir.display());
    watcher.watch(&dir, RecursiveMode::NonRecursive)?;

    // The file may have appeared between the first check and the watch.
    if socket_exists(sock_addr)? {
        return Ok(());
    }

    let deadline = tokio::time::sleep(max_wait);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => {
                if check_legacy_socket(sock_addr, legacy) {
                    return Ok(());
                }
                return Err(Error::WaitTimeout {
                    path: sock_addr.clone(),
                    timeout: max_wait,
                });
            }
            event = rx.recv() => {
                match event {
                    Some(Ok(event)) => {
                        tracing::trace!(?event, "watcher event");
                        if is_create_of(&event, sock_addr) {
                            tracing::debug!("Socket file {} created", sock_addr.display());
                            return Ok(());
                        }
                    }
                    Some(Err(e)) => return Err(e.into()),
                    None => {
                        return Err(Error::Watch(notify::Error::generic(
                            "watcher channel closed",
                        )))
                    }
                }
            }
        }
    }
}

fn watch_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn is_create_of(event: &Event, target: &Path) -> bool {
    if !matches!(event.kind, EventKind::Create(_)) {
        return false;
    }
    let Some(name) = target.file_name() else {
        return false;
    };
    event.paths.iter().any(|p| p.file_name() == Some(name))
}

//! Capability handoff between the test process and the privileged peer.
//!
//! # Architecture
//!
//! ```text
//! client                                   privileged peer (`butler shell-service`)
//!   │ AnnouncementListener::register()
//!   │   binds butler-announce-<id>.sock
//!   │ launch peer over adb shell ─────────────►│ CapabilityServer::start()
//!   │                                          │   binds butler-api-<id>.sock
//!   │◄──── Frame::Announce{ButlerApi: handle} ─│ announce(listener path, handle)
//!   │ PendingHandle::get(timeout)              │
//!   │                                          │
//!   │ ── Frame::Transact ─────────────────────►│ dispatch to LocalButler
//!   │◄── Frame::Reply ─────────────────────────│
//!   │ ── Frame::Transact{TERMINATE_CODE} ─────►│ stop latch fires, restore, exit
//! ```
//!
//! The client and the peer run as different users (app uid and shell uid),
//! so both sockets are world-connectable. Authorization rests on the
//! handle's token, a random UUID checked on every call.

pub mod announce;
pub mod framing;
pub mod handle;
pub mod protocol;
pub mod server;

pub use announce::{announce, AnnouncementListener, PendingHandle};
pub use handle::{CapabilityHandle, HandleConnection, Transact};
pub use protocol::{Call, Reply, Transaction, TERMINATE_CODE};
pub use server::CapabilityServer;

use std::os::unix::net::UnixListener;
use std::path::{Path, PathBuf};

use crate::constants::MAX_SOCK_PATH;
use crate::error::{ButlerError, Result};

/// Mode applied to both capability sockets.
const SOCKET_MODE: u32 = 0o666;

/// Build a fresh socket path `<dir>/<prefix>-<uuid>.sock`.
///
/// Length is validated against the macOS 104-byte kernel limit.
pub fn runtime_socket_path(dir: &Path, prefix: &str) -> Result<PathBuf> {
    let id = uuid::Uuid::new_v4().simple().to_string();
    let path = dir.join(format!("{prefix}-{id}.sock"));
    let len = path.as_os_str().len();
    if len > MAX_SOCK_PATH {
        return Err(ButlerError::Validation(format!(
            "socket path too long ({len} > {MAX_SOCK_PATH}): {}",
            path.display()
        )));
    }
    Ok(path)
}

/// Bind a Unix listener at `path` that any local user may connect to.
///
/// The file mode does not gate calls; every transaction carries the token.
pub(crate) fn bind_socket(path: &Path) -> Result<UnixListener> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    // Remove stale socket file from a previous run.
    let _ = std::fs::remove_file(path);

    let listener = UnixListener::bind(path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(SOCKET_MODE))?;
    }

    Ok(listener)
}

/// Unblock a thread parked in `accept()` on `path`.
pub(crate) fn wake_listener(path: &Path) {
    if let Err(e) = std::os::unix::net::UnixStream::connect(path) {
        log::debug!("[rpc] wake {}: {e}", path.display());
    }
}

//! Launching the privileged peer and obtaining its capability handle.
//!
//! # Lifecycle
//!
//! ```text
//! Idle ──bind()──► Launching ──shell started──► WaitingForHandle
//!                      │                            │
//!                      │ launch failed              ├─ handle announced ──► Bound
//!                      ▼                            └─ timeout (stays, degraded)
//!                    Idle
//!
//! Bound / WaitingForHandle ──unbind()──► Terminating ──► Closed
//! ```
//!
//! The peer is `<executable> shell-service`, run through `adb shell` so it
//! gets the shell user's privileges. It learns where to announce from the
//! `BUTLER_ANNOUNCE` variable on its command line. A bind that times out is
//! not fatal: the session carries on with local fallbacks.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::adb::command::escape_shell_arg;
use crate::adb::{AdbDevice, ShellTask};
use crate::api::RemoteButler;
use crate::config::Config;
use crate::constants::{ANNOUNCE_ENV, SHELL_SERVICE_COMMAND};
use crate::error::Result;
use crate::rpc::{AnnouncementListener, HandleConnection, PendingHandle};

/// Where the bootstrap is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapState {
    /// Nothing started.
    Idle,
    /// Listener registered, peer being launched.
    Launching,
    /// Peer launched, no handle yet.
    WaitingForHandle,
    /// Handle received.
    Bound,
    /// Shutting the peer down.
    Terminating,
    /// Done; cannot be bound again.
    Closed,
}

/// Drives one privileged peer on one device.
#[derive(Debug)]
pub struct PrivilegedBootstrap {
    device: AdbDevice,
    executable: PathBuf,
    runtime_dir: PathBuf,
    state: BootstrapState,
    listener: Option<AnnouncementListener>,
    task: Option<ShellTask>,
    connection: Option<Arc<HandleConnection>>,
}

impl PrivilegedBootstrap {
    /// Bootstrap for `device`.
    ///
    /// The peer executable is `package_path` from `config`, or this binary.
    pub fn new(device: AdbDevice, config: &Config) -> Result<Self> {
        let executable = match &config.package_path {
            Some(path) => path.clone(),
            None => std::env::current_exe()?,
        };
        Ok(Self {
            device,
            executable,
            runtime_dir: config.runtime_dir.clone(),
            state: BootstrapState::Idle,
            listener: None,
            task: None,
            connection: None,
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> BootstrapState {
        self.state
    }

    /// Device the peer runs on.
    pub fn device(&self) -> &AdbDevice {
        &self.device
    }

    /// Connection to the bound peer, if any.
    pub fn connection(&self) -> Option<Arc<HandleConnection>> {
        self.connection.clone()
    }

    /// Launch the peer and wait up to `timeout` for its handle.
    ///
    /// Returns `Ok(None)` when the peer does not announce in time; the
    /// bootstrap then stays in [`BootstrapState::WaitingForHandle`] until
    /// [`Self::unbind`].
    ///
    /// # Errors
    ///
    /// Registering the listener or connecting to the ADB server failed.
    pub fn bind(&mut self, timeout: Duration) -> Result<Option<Arc<HandleConnection>>> {
        if self.state != BootstrapState::Idle {
            log::warn!("[bootstrap] bind called in state {:?}", self.state);
            return Ok(self.connection.clone());
        }

        self.state = BootstrapState::Launching;
        let (task, listener, pending) = match self.launch() {
            Ok(launched) => launched,
            Err(e) => {
                self.state = BootstrapState::Idle;
                return Err(e);
            }
        };
        self.task = Some(task);
        self.listener = Some(listener);
        self.state = BootstrapState::WaitingForHandle;

        log::debug!("[bootstrap] waiting up to {timeout:?} for the privileged peer");
        let Some(handle) = pending.get(timeout) else {
            log::error!(
                "[bootstrap] privileged peer did not announce within {timeout:?}, continuing without it"
            );
            return Ok(None);
        };

        log::info!("[bootstrap] bound to {}", handle.socket_path().display());
        let connection = Arc::new(HandleConnection::new(handle));
        self.connection = Some(Arc::clone(&connection));
        self.state = BootstrapState::Bound;
        Ok(Some(connection))
    }

    fn launch(&self) -> Result<(ShellTask, AnnouncementListener, PendingHandle)> {
        let (listener, pending) = AnnouncementListener::register(&self.runtime_dir)?;
        let listener = scopeguard::guard(listener, AnnouncementListener::unregister);

        let (command, args) = launch_line(listener.path(), &self.executable);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        log::info!("[bootstrap] launching privileged peer on {}", self.device.endpoint());
        let task = self.device.shell_command(&command, &args)?;

        Ok((task, scopeguard::ScopeGuard::into_inner(listener), pending))
    }

    /// Terminate the peer and release everything `bind` set up.
    ///
    /// With a handle the terminate opcode is sent and the peer's shell
    /// stream is awaited; without one the stream is cut. Failures are
    /// logged, never returned.
    pub fn unbind(&mut self) {
        if matches!(self.state, BootstrapState::Idle | BootstrapState::Closed) {
            return;
        }
        self.state = BootstrapState::Terminating;

        let terminated = match self.connection.take() {
            Some(connection) => match RemoteButler::new(connection).terminate() {
                Ok(()) => {
                    log::debug!("[bootstrap] peer acknowledged terminate");
                    true
                }
                Err(e) => {
                    log::warn!("[bootstrap] terminate failed: {e}");
                    false
                }
            },
            None => false,
        };

        if let Some(task) = self.task.take() {
            if !terminated {
                task.close_socket();
            }
            match task.wait() {
                Ok(output) if !output.trim().is_empty() => {
                    log::debug!("[bootstrap] peer output:\n{}", output.trim_end());
                }
                Ok(_) => {}
                Err(e) => log::warn!("[bootstrap] peer stream ended with error: {e}"),
            }
        }

        if let Some(listener) = self.listener.take() {
            listener.unregister();
        }
        self.state = BootstrapState::Closed;
        log::info!("[bootstrap] unbound");
    }
}

impl Drop for PrivilegedBootstrap {
    fn drop(&mut self) {
        self.unbind();
    }
}

/// Shell line that starts the peer: `BUTLER_ANNOUNCE=<path> <exe> shell-service`.
///
/// Returned as the leading word plus the remaining arguments.
fn launch_line(announce: &Path, executable: &Path) -> (String, Vec<String>) {
    let command = format!(
        "{ANNOUNCE_ENV}={}",
        escape_shell_arg(&announce.to_string_lossy())
    );
    let args = vec![
        executable.to_string_lossy().into_owned(),
        SHELL_SERVICE_COMMAND.to_string(),
    ];
    (command, args)
}

//! Privileged-side call server.
//!
//! One named thread accepts connections and serves them one at a time, one
//! call at a time. The terminate opcode is acknowledged and then reported
//! through the stop channel; the server stops accepting afterwards.

// Rust guideline compliant 2026-02

use std::net::Shutdown;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use super::framing::{Frame, FrameReader};
use super::handle::CapabilityHandle;
use super::protocol::{Reply, Transaction, TERMINATE_CODE};
use super::{bind_socket, runtime_socket_path, wake_listener};
use crate::api::{ButlerApi, Operation};
use crate::error::Result;

/// Serves [`ButlerApi`] calls for whoever holds the handle.
pub struct CapabilityServer {
    handle: CapabilityHandle,
    shutdown: Arc<AtomicBool>,
    /// Clone of the connection being served, so `stop` can cut it.
    active: ActiveConnection,
    thread: Option<JoinHandle<()>>,
}

type ActiveConnection = Arc<Mutex<Option<UnixStream>>>;

impl std::fmt::Debug for CapabilityServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityServer")
            .field("socket", &self.handle.socket_path())
            .finish_non_exhaustive()
    }
}

impl CapabilityServer {
    /// Bind a fresh socket in `runtime_dir` and start serving `api`.
    ///
    /// `on_terminate` receives one message when a client sends the
    /// terminate opcode.
    pub fn start(
        runtime_dir: &Path,
        api: Arc<dyn ButlerApi>,
        on_terminate: Sender<()>,
    ) -> Result<Self> {
        let path = runtime_socket_path(runtime_dir, "butler-api")?;
        let listener = bind_socket(&path)?;
        let token = uuid::Uuid::new_v4().simple().to_string();
        let handle = CapabilityHandle::new(path.clone(), token.clone());
        let shutdown = Arc::new(AtomicBool::new(false));
        let active: ActiveConnection = Arc::new(Mutex::new(None));
        let state = ServeState {
            token,
            api,
            on_terminate,
            shutdown: Arc::clone(&shutdown),
            active: Arc::clone(&active),
        };

        log::info!("[rpc] serving butler api on {}", path.display());

        let thread = thread::Builder::new()
            .name("butler-api".to_owned())
            .spawn(move || accept_loop(&listener, &path, &state))?;

        Ok(Self {
            handle,
            shutdown,
            active,
            thread: Some(thread),
        })
    }

    /// Handle to announce to the client.
    pub fn handle(&self) -> &CapabilityHandle {
        &self.handle
    }

    /// Stop accepting, join the server thread and remove the socket file.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let active = self.active.lock().unwrap_or_else(std::sync::PoisonError::into_inner).take();
        if let Some(stream) = active {
            let _ = stream.shutdown(Shutdown::Both);
        }
        if let Some(thread) = self.thread.take() {
            if !thread.is_finished() {
                wake_listener(self.handle.socket_path());
            }
            if thread.join().is_err() {
                log::error!("[rpc] server thread panicked");
            }
        }
        let _ = std::fs::remove_file(self.handle.socket_path());
    }
}

impl Drop for CapabilityServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Everything the server thread owns.
struct ServeState {
    token: String,
    api: Arc<dyn ButlerApi>,
    on_terminate: Sender<()>,
    shutdown: Arc<AtomicBool>,
    active: ActiveConnection,
}

fn accept_loop(listener: &UnixListener, path: &Path, state: &ServeState) {
    for stream in listener.incoming() {
        if state.shutdown.load(Ordering::SeqCst) {
            break;
        }
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                log::warn!("[rpc] accept on {} failed: {e}", path.display());
                continue;
            }
        };
        log::debug!("[rpc] client connected");
        if let Ok(clone) = stream.try_clone() {
            *state.active.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(clone);
        }
        let served = serve_connection(stream, &state.token, state.api.as_ref());
        state.active.lock().unwrap_or_else(std::sync::PoisonError::into_inner).take();

        match served {
            Ok(true) => {
                log::info!("[rpc] terminate requested");
                let _ = state.on_terminate.send(());
                break;
            }
            Ok(false) => log::debug!("[rpc] client disconnected"),
            Err(e) => log::warn!("[rpc] connection error: {e}"),
        }
    }
}

/// Serve calls on one connection. Returns `true` if terminate was received.
fn serve_connection(stream: UnixStream, token: &str, api: &dyn ButlerApi) -> Result<bool> {
    use std::io::Write;

    let mut channel = FrameReader::new(stream);
    while let Some(frame) = channel.next_frame()? {
        let Frame::Transact(transaction) = frame else {
            log::warn!("[rpc] ignoring unexpected frame: {frame:?}");
            continue;
        };
        let (reply, terminate) = handle_transaction(&transaction, token, api);
        channel.get_mut().write_all(&Frame::Reply(reply).encode()?)?;
        if terminate {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Check and dispatch one transaction. The flag is `true` for terminate.
pub(crate) fn handle_transaction(
    transaction: &Transaction,
    token: &str,
    api: &dyn ButlerApi,
) -> (Reply, bool) {
    if transaction.token != token {
        log::warn!("[rpc] rejected call {} with invalid token", transaction.code);
        return (
            Reply::Denied {
                reason: "invalid capability token".to_string(),
            },
            false,
        );
    }

    if transaction.code == TERMINATE_CODE {
        return (Reply::Ok { value: true }, true);
    }

    let Some(operation) = Operation::from_code(transaction.code) else {
        return (
            Reply::Error {
                operation: format!("transaction {}", transaction.code),
                message: "unknown transaction code".to_string(),
            },
            false,
        );
    };

    let call = match &transaction.call {
        Some(call) if call.operation() == operation => call,
        _ => {
            return (
                Reply::Error {
                    operation: operation.name().to_string(),
                    message: "arguments do not match transaction code".to_string(),
                },
                false,
            )
        }
    };

    match call.dispatch(api) {
        Ok(value) => {
            log::debug!("[rpc] {operation} -> {value}");
            (Reply::Ok { value }, false)
        }
        Err(e) => {
            log::error!("[rpc] {operation} failed: {e}");
            (
                Reply::Error {
                    operation: operation.name().to_string(),
                    message: e.to_string(),
                },
                false,
            )
        }
    }
}

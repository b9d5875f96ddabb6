//! One-shot delivery of the capability handle from the peer to the client.
//!
//! The client thread that launched the peer is blocked in
//! [`PendingHandle::get`], so the announcement has to be received somewhere
//! else: a dedicated listener thread owns the socket and fulfils a
//! single-slot channel.

use std::io::Write;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::framing::{Frame, FrameReader};
use super::handle::CapabilityHandle;
use super::protocol::Announcement;
use super::{bind_socket, runtime_socket_path, wake_listener};
use crate::error::Result;

/// How long the listener waits for a connected announcer to send.
const ANNOUNCER_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Send `handle` to the listener at `target`.
pub fn announce(target: &Path, handle: &CapabilityHandle) -> Result<()> {
    let frame = Frame::Announce(Announcement::butler_api(handle)?);
    let mut stream = UnixStream::connect(target)?;
    stream.write_all(&frame.encode()?)?;
    stream.flush()?;
    log::debug!("[announce] sent handle to {}", target.display());
    Ok(())
}

/// Receiving end of the announcement, waiting for the handle.
#[derive(Debug)]
pub struct PendingHandle {
    rx: Receiver<CapabilityHandle>,
}

impl PendingHandle {
    /// Wait up to `timeout` for the handle. `None` on timeout.
    pub fn get(&self, timeout: Duration) -> Option<CapabilityHandle> {
        match self.rx.recv_timeout(timeout) {
            Ok(handle) => Some(handle),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                log::warn!("[announce] listener stopped before a handle arrived");
                None
            }
        }
    }
}

/// Background listener for the peer's announcement.
#[derive(Debug)]
pub struct AnnouncementListener {
    path: PathBuf,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl AnnouncementListener {
    /// Bind a fresh announcement socket in `runtime_dir` and start listening.
    pub fn register(runtime_dir: &Path) -> Result<(Self, PendingHandle)> {
        let path = runtime_socket_path(runtime_dir, "butler-announce")?;
        let listener = bind_socket(&path)?;
        let (tx, rx) = mpsc::sync_channel(1);
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);

        let thread = thread::Builder::new()
            .name("butler-announce".to_owned())
            .spawn(move || listen(&listener, &tx, &flag))?;

        log::debug!("[announce] registered listener at {}", path.display());
        Ok((
            Self {
                path,
                stop,
                thread: Some(thread),
            },
            PendingHandle { rx },
        ))
    }

    /// Socket path the peer should announce to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stop listening and remove the socket.
    pub fn unregister(mut self) {
        self.stop_listening();
    }

    fn stop_listening(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if !thread.is_finished() {
                wake_listener(&self.path);
            }
            if thread.join().is_err() {
                log::error!("[announce] listener thread panicked");
            }
            let _ = std::fs::remove_file(&self.path);
            log::debug!("[announce] unregistered {}", self.path.display());
        }
    }
}

impl Drop for AnnouncementListener {
    fn drop(&mut self) {
        self.stop_listening();
    }
}

fn listen(listener: &UnixListener, tx: &SyncSender<CapabilityHandle>, stop: &AtomicBool) {
    for stream in listener.incoming() {
        if stop.load(Ordering::SeqCst) {
            break;
        }
        match stream {
            Ok(stream) => receive(stream, tx),
            Err(e) => log::warn!("[announce] accept failed: {e}"),
        }
    }
}

fn receive(stream: UnixStream, tx: &SyncSender<CapabilityHandle>) {
    if let Err(e) = stream.set_read_timeout(Some(ANNOUNCER_READ_TIMEOUT)) {
        log::warn!("[announce] set read timeout: {e}");
    }
    let mut reader = FrameReader::new(stream);
    loop {
        match reader.next_frame() {
            Ok(Some(Frame::Announce(announcement))) => {
                if !announcement.is_butler_api() {
                    log::debug!("[announce] ignoring action {}", announcement.action);
                    continue;
                }
                let Some(handle) = announcement.handle() else {
                    log::warn!("[announce] announcement without a ButlerApi bundle");
                    continue;
                };
                match tx.try_send(handle) {
                    Ok(()) => log::debug!("[announce] received ButlerApi handle"),
                    Err(TrySendError::Full(_)) => {
                        log::warn!("[announce] handle already received, ignoring duplicate");
                    }
                    Err(TrySendError::Disconnected(_)) => {
                        log::debug!("[announce] nobody is waiting for the handle");
                    }
                }
            }
            Ok(Some(other)) => log::warn!("[announce] unexpected frame: {other:?}"),
            Ok(None) => return,
            Err(e) => {
                log::warn!("[announce] bad announcement: {e}");
                return;
            }
        }
    }
}

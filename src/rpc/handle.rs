//! Client side of the capability socket.

use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use super::framing::{Frame, FrameReader};
use super::protocol::{Call, Reply, Transaction};
use crate::constants::CALL_TIMEOUT;
use crate::error::{ButlerError, Result};

/// Opaque reference to a running privileged peer.
///
/// Obtained once per session from the peer's announcement. Holding it is
/// what authorizes calls: the token is checked on every transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityHandle {
    socket: PathBuf,
    token: String,
}

impl CapabilityHandle {
    pub(crate) fn new(socket: PathBuf, token: String) -> Self {
        Self { socket, token }
    }

    /// Socket the peer listens on.
    pub fn socket_path(&self) -> &Path {
        &self.socket
    }

    pub(crate) fn token(&self) -> &str {
        &self.token
    }
}

/// Sends one transaction and waits for its reply.
///
/// This is the seam between the typed proxy and the wire.
pub trait Transact: Send + Sync {
    /// Send `code` with `call` and return the peer's reply.
    fn transact(&self, code: u32, call: Option<Call>) -> Result<Reply>;
}

impl<T: Transact + ?Sized> Transact for Arc<T> {
    fn transact(&self, code: u32, call: Option<Call>) -> Result<Reply> {
        (**self).transact(code, call)
    }
}

/// A lazily opened, reusable connection to the peer behind a handle.
///
/// The peer serves one connection at a time, so every caller in the client
/// process (the proxy and the bootstrap's terminate) shares this one.
#[derive(Debug)]
pub struct HandleConnection {
    handle: CapabilityHandle,
    channel: Mutex<Option<FrameReader<UnixStream>>>,
}

impl HandleConnection {
    /// Connection to `handle`. Nothing is opened until the first call.
    pub fn new(handle: CapabilityHandle) -> Self {
        Self {
            handle,
            channel: Mutex::new(None),
        }
    }

    /// The handle this connection talks to.
    pub fn handle(&self) -> &CapabilityHandle {
        &self.handle
    }

    fn open(&self) -> Result<FrameReader<UnixStream>> {
        let stream = UnixStream::connect(self.handle.socket_path())?;
        stream.set_read_timeout(Some(CALL_TIMEOUT))?;
        log::debug!("[rpc] connected to {}", self.handle.socket_path().display());
        Ok(FrameReader::new(stream))
    }

    fn round_trip(channel: &mut FrameReader<UnixStream>, frame: &Frame) -> Result<Reply> {
        use std::io::Write;

        channel.get_mut().write_all(&frame.encode()?)?;
        match channel.next_frame()? {
            Some(Frame::Reply(reply)) => Ok(reply),
            Some(other) => Err(ButlerError::protocol(format!("unexpected frame from peer: {other:?}"))),
            None => Err(ButlerError::protocol("peer closed the connection")),
        }
    }
}

impl Transact for HandleConnection {
    fn transact(&self, code: u32, call: Option<Call>) -> Result<Reply> {
        let frame = Frame::Transact(Transaction {
            code,
            token: self.handle.token().to_string(),
            call,
        });

        let mut guard = self
            .channel
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut channel = match guard.take() {
            Some(channel) => channel,
            None => self.open()?,
        };

        // A failed exchange leaves the stream at an unknown offset, so the
        // channel is only put back after a clean round trip.
        let reply = Self::round_trip(&mut channel, &frame)?;
        *guard = Some(channel);
        Ok(reply)
    }
}

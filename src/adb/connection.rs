//! ADB host-protocol framing.
//!
//! Every request and every server message is a 4-digit hex length followed
//! by that many bytes:
//!
//! ```text
//! client ── "000chost:devices" ──────────────► adb server
//!        ◄─ "OKAY" ─ "0018emulator-5554\tdevice\n" ─
//!
//! client ── "0012host:transport-any" ────────►
//!        ◄─ "FAIL" ─ "0017no devices/emulators found" ─
//! ```
//!
//! A connection carries one logical command sequence and is dropped after
//! it; once a protocol error occurs the stream position is unknown and the
//! connection must not be reused.

// Rust guideline compliant 2026-02

use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream;

use crate::constants::MAX_ADB_MESSAGE;
use crate::error::{ButlerError, Result};

/// Status token the server sends when a command succeeds.
const STATUS_OKAY: &[u8; 4] = b"OKAY";

/// Encode `payload` as a length-prefixed ADB message.
///
/// # Errors
///
/// Returns a protocol error if the payload does not fit in 4 hex digits.
pub fn encode_message(payload: &str) -> Result<Vec<u8>> {
    let bytes = payload.as_bytes();
    if bytes.len() > MAX_ADB_MESSAGE {
        return Err(ButlerError::protocol(format!(
            "message too long: {} bytes (max {MAX_ADB_MESSAGE})",
            bytes.len()
        )));
    }
    let mut buf = Vec::with_capacity(4 + bytes.len());
    buf.extend_from_slice(format!("{:04x}", bytes.len()).as_bytes());
    buf.extend_from_slice(bytes);
    Ok(buf)
}

/// Parse a 4-digit hex length header. Upper and lower case are accepted.
pub fn decode_length(header: [u8; 4]) -> Result<usize> {
    let text = std::str::from_utf8(&header)
        .map_err(|e| ButlerError::protocol(format!("invalid length header: {e}")))?;
    if !text.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ButlerError::protocol(format!("invalid length header: {text:?}")));
    }
    usize::from_str_radix(text, 16)
        .map_err(|e| ButlerError::protocol(format!("invalid length header {text:?}: {e}")))
}

/// One client connection to the ADB server.
#[derive(Debug)]
pub struct AdbConnection<S> {
    stream: S,
}

impl AdbConnection<TcpStream> {
    /// Open a TCP connection to the ADB server at `host:port`.
    pub fn connect(host: &str, port: u16) -> Result<Self> {
        let stream = TcpStream::connect((host, port))?;
        Ok(Self::new(stream))
    }

    /// Clone the socket so another thread can shut it down.
    pub fn try_clone_socket(&self) -> Result<TcpStream> {
        Ok(self.stream.try_clone()?)
    }
}

impl<S: Read + Write> AdbConnection<S> {
    /// Wrap an already-connected stream.
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Send one command and check the server's status token.
    ///
    /// # Errors
    ///
    /// On `FAIL` the server's framed reason is read and returned as a
    /// protocol error. Short reads are protocol errors too.
    pub fn send_command(&mut self, command: &str) -> Result<()> {
        let frame = encode_message(command)?;
        self.stream.write_all(&frame)?;
        self.stream.flush()?;

        let mut status = [0u8; 4];
        self.read_exact_or_protocol(&mut status, "status")?;
        if &status == STATUS_OKAY {
            return Ok(());
        }

        let message = self.read_message()?;
        log::debug!("[adb] '{command}' -> {}: {message}", String::from_utf8_lossy(&status));
        Err(ButlerError::protocol(format!("command failed: {message}")))
    }

    /// Read one length-prefixed message.
    pub fn read_message(&mut self) -> Result<String> {
        let mut header = [0u8; 4];
        self.read_exact_or_protocol(&mut header, "length header")?;
        let length = decode_length(header)?;

        let mut payload = vec![0u8; length];
        self.read_exact_or_protocol(&mut payload, "message body")?;
        String::from_utf8(payload)
            .map_err(|e| ButlerError::protocol(format!("message is not valid text: {e}")))
    }

    /// Read everything the server sends until it closes the stream.
    pub fn read_until_close(&mut self) -> Result<String> {
        let mut out = Vec::new();
        self.stream.read_to_end(&mut out)?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    /// Give back the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream
    }

    fn read_exact_or_protocol(&mut self, buf: &mut [u8], what: &str) -> Result<()> {
        self.stream.read_exact(buf).map_err(|e| {
            if e.kind() == ErrorKind::UnexpectedEof {
                ButlerError::protocol(format!("connection closed while reading {what}"))
            } else {
                ButlerError::Io(e)
            }
        })
    }
}

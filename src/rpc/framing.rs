//! Wire codec for the capability socket.
//!
//! Length-prefixed frames with a type byte:
//!
//! ```text
//! [u32 LE length] [u8 type] [payload: length-1 bytes]
//! ```
//!
//! Frame types (all payloads are UTF-8 JSON):
//! - `0x01`: Transaction (client → peer)
//! - `0x02`: Reply (peer → client)
//! - `0x03`: Announcement (peer → announcement listener)

use std::collections::VecDeque;
use std::io::{ErrorKind, Read};

use super::protocol::{Announcement, Reply, Transaction};
use crate::error::{ButlerError, Result};

/// Maximum frame payload size (1 MB).
const MAX_FRAME_SIZE: u32 = 1024 * 1024;

/// Frame type constants.
pub mod frame_type {
    /// Call into the privileged peer.
    pub const TRANSACT: u8 = 0x01;
    /// Answer to a transaction.
    pub const REPLY: u8 = 0x02;
    /// Capability handle announcement.
    pub const ANNOUNCE: u8 = 0x03;
}

/// A decoded frame from the wire protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Call into the privileged peer.
    Transact(Transaction),
    /// Answer to a transaction.
    Reply(Reply),
    /// Capability handle announcement.
    Announce(Announcement),
}

impl Frame {
    /// Encode this frame into a wire-format byte vector.
    ///
    /// Returns `[u32 LE length][u8 type][payload]`.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let (kind, payload) = match self {
            Frame::Transact(tx) => (frame_type::TRANSACT, serde_json::to_vec(tx)?),
            Frame::Reply(reply) => (frame_type::REPLY, serde_json::to_vec(reply)?),
            Frame::Announce(announcement) => {
                (frame_type::ANNOUNCE, serde_json::to_vec(announcement)?)
            }
        };
        encode_raw(kind, &payload)
    }
}

/// Encode a raw frame with type byte and payload.
fn encode_raw(kind: u8, payload: &[u8]) -> Result<Vec<u8>> {
    let length = u32::try_from(payload.len() + 1)
        .ok()
        .filter(|len| *len <= MAX_FRAME_SIZE)
        .ok_or_else(|| {
            ButlerError::protocol(format!("frame too large: {} bytes", payload.len() + 1))
        })?;
    let mut buf = Vec::with_capacity(4 + 1 + payload.len());
    buf.extend_from_slice(&length.to_le_bytes());
    buf.push(kind);
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Decode a single frame from a type byte and payload.
fn decode_frame(kind: u8, payload: &[u8]) -> Result<Frame> {
    match kind {
        frame_type::TRANSACT => Ok(Frame::Transact(serde_json::from_slice(payload)?)),
        frame_type::REPLY => Ok(Frame::Reply(serde_json::from_slice(payload)?)),
        frame_type::ANNOUNCE => Ok(Frame::Announce(serde_json::from_slice(payload)?)),
        _ => Err(ButlerError::protocol(format!("unknown frame type: 0x{kind:02x}"))),
    }
}

/// Incremental frame decoder that handles partial reads.
///
/// Feed bytes via [`FrameDecoder::feed`] and extract complete frames.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    /// Create a new decoder with empty buffer.
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Feed bytes into the decoder and extract all complete frames.
    ///
    /// # Errors
    ///
    /// Returns an error if a frame is malformed or exceeds the size limit.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Frame>> {
        self.buf.extend_from_slice(bytes);
        let mut frames = Vec::new();

        loop {
            if self.buf.len() < 4 {
                break;
            }

            let length = u32::from_le_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]);

            if length == 0 {
                return Err(ButlerError::protocol("invalid frame: zero length"));
            }
            if length > MAX_FRAME_SIZE {
                return Err(ButlerError::protocol(format!(
                    "frame too large: {length} bytes (max {MAX_FRAME_SIZE})"
                )));
            }

            let total = 4 + length as usize;
            if self.buf.len() < total {
                break; // Incomplete frame, wait for more data
            }

            let frame = decode_frame(self.buf[4], &self.buf[5..total])?;
            frames.push(frame);
            self.buf.drain(..total);
        }

        Ok(frames)
    }

    /// Returns true if the decoder has buffered partial data.
    pub fn has_partial(&self) -> bool {
        !self.buf.is_empty()
    }
}

/// Blocking frame reader over any byte stream.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
    decoder: FrameDecoder,
    pending: VecDeque<Frame>,
}

impl<R: Read> FrameReader<R> {
    /// Wrap `inner`.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            decoder: FrameDecoder::new(),
            pending: VecDeque::new(),
        }
    }

    /// Mutable access to the stream, for writing requests.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Next complete frame, or `None` on a clean end of stream.
    ///
    /// # Errors
    ///
    /// I/O errors, decode failures, and EOF in the middle of a frame.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        let mut buf = [0u8; 4096];
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Ok(Some(frame));
            }
            let n = match self.inner.read(&mut buf) {
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            if n == 0 {
                if self.decoder.has_partial() {
                    return Err(ButlerError::protocol("connection closed mid-frame"));
                }
                return Ok(None);
            }
            self.pending.extend(self.decoder.feed(&buf[..n])?);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Rotation;
    use crate::rpc::protocol::Call;
    use std::io::Cursor;

    fn transaction() -> Frame {
        Frame::Transact(Transaction {
            code: 3,
            token: "t".into(),
            call: Some(Call::SetRotation {
                rotation: Rotation::Rotation90,
            }),
        })
    }

    #[test]
    fn test_transaction_round_trip() {
        let frame = transaction();
        let encoded = frame.encode().unwrap();
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(&encoded).unwrap();
        assert_eq!(frames, vec![frame]);
        assert!(!decoder.has_partial());
    }

    #[test]
    fn test_multiple_frames_in_single_feed() {
        let f1 = transaction();
        let f2 = Frame::Reply(Reply::Ok { value: true });
        let mut buf = f1.encode().unwrap();
        buf.extend_from_slice(&f2.encode().unwrap());

        let mut decoder = FrameDecoder::new();
        assert_eq!(decoder.feed(&buf).unwrap(), vec![f1, f2]);
    }

    #[test]
    fn test_byte_at_a_time() {
        let frame = Frame::Reply(Reply::Denied { reason: "x".into() });
        let encoded = frame.encode().unwrap();

        let mut decoder = FrameDecoder::new();
        for (i, byte) in encoded.iter().enumerate() {
            let frames = decoder.feed(&[*byte]).unwrap();
            if i < encoded.len() - 1 {
                assert!(frames.is_empty());
            } else {
                assert_eq!(frames, vec![frame.clone()]);
            }
        }
    }

    #[test]
    fn test_zero_length_rejected() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(&[0u8; 4]).is_err());
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(&(MAX_FRAME_SIZE + 1).to_le_bytes()).is_err());
    }

    #[test]
    fn test_unknown_frame_type_rejected() {
        let mut buf = 3u32.to_le_bytes().to_vec();
        buf.push(0xFF);
        buf.extend_from_slice(b"{}");
        let mut decoder = FrameDecoder::new();
        assert!(decoder.feed(&buf).is_err());
    }

    #[test]
    fn test_reader_returns_queued_frames_then_eof() {
        let f1 = Frame::Reply(Reply::Ok { value: false });
        let f2 = Frame::Reply(Reply::Ok { value: true });
        let mut buf = f1.encode().unwrap();
        buf.extend_from_slice(&f2.encode().unwrap());

        let mut reader = FrameReader::new(Cursor::new(buf));
        assert_eq!(reader.next_frame().unwrap(), Some(f1));
        assert_eq!(reader.next_frame().unwrap(), Some(f2));
        assert_eq!(reader.next_frame().unwrap(), None);
    }

    #[test]
    fn test_reader_rejects_truncated_frame() {
        let encoded = transaction().encode().unwrap();
        let mut reader = FrameReader::new(Cursor::new(encoded[..encoded.len() - 2].to_vec()));
        assert!(matches!(reader.next_frame(), Err(ButlerError::Protocol { .. })));
    }
}

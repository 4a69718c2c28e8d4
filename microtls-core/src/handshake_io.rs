//! Handshake message framing and reassembly.
//!
//! ```text
//! struct {
//!     HandshakeType msg_type;    /* handshake type */
//!     uint24 length;             /* bytes in message */
//!     opaque body[length];
//! } Handshake;
//! ```
//!
//! Handshake messages may be split across records or packed several to a
//! record. [`HandshakeReassembler`] accumulates record fragments and hands
//! out complete messages in arrival order.

use bytes::{BufMut, BytesMut};

use crate::codec::{self, Reader};
use crate::error::{Error, Result};
use crate::protocol::HandshakeType;

/// Handshake header size (type + 24-bit length).
pub const HANDSHAKE_HEADER_SIZE: usize = 4;

/// Default bound on a single handshake message body.
///
/// Large enough for a three-certificate RSA chain.
pub const DEFAULT_MAX_HANDSHAKE_MESSAGE_SIZE: usize = 32 * 1024;

/// One framed handshake message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeMessage {
    /// Message type
    pub msg_type: HandshakeType,
    /// Message body, without the 4-byte header
    pub body: Vec<u8>,
}

impl HandshakeMessage {
    /// Create a new handshake message.
    pub fn new(msg_type: HandshakeType, body: Vec<u8>) -> Self {
        Self { msg_type, body }
    }

    /// Append the framed message to `buf`.
    pub fn encode_into(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u8(self.msg_type.to_u8());
        codec::put_vec_u24(buf, &self.body)
    }

    /// Framed message bytes, exactly as they enter the transcript.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = BytesMut::with_capacity(HANDSHAKE_HEADER_SIZE + self.body.len());
        self.encode_into(&mut buf)?;
        Ok(buf.to_vec())
    }

    /// Decode exactly one framed message.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut r = Reader::new(data, "Handshake message");
        let raw_type = r.u8()?;
        let msg_type = HandshakeType::from_u8(raw_type).ok_or_else(|| {
            Error::UnexpectedMessage(format!("Unknown handshake type: {}", raw_type))
        })?;
        let body = r.vec_u24()?.to_vec();
        r.finish()?;
        Ok(Self { msg_type, body })
    }
}

/// Accumulates handshake fragments into complete messages.
#[derive(Debug, Clone)]
pub struct HandshakeReassembler {
    buffer: Vec<u8>,
    max_message_size: usize,
}

impl Default for HandshakeReassembler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HANDSHAKE_MESSAGE_SIZE)
    }
}

impl HandshakeReassembler {
    /// Create a reassembler that rejects message bodies over `max_message_size`.
    pub fn new(max_message_size: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_message_size,
        }
    }

    /// Configured bound on a message body.
    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Append the payload of one handshake record.
    ///
    /// Every header visible after the append is checked against the bound,
    /// so an oversized message is rejected before its body is buffered.
    pub fn push(&mut self, fragment: &[u8]) -> Result<()> {
        if fragment.is_empty() {
            return Err(Error::UnexpectedMessage("Empty handshake record".into()));
        }
        self.buffer.extend_from_slice(fragment);

        let mut offset = 0;
        while offset + HANDSHAKE_HEADER_SIZE <= self.buffer.len() {
            let length = declared_length(&self.buffer[offset..]);
            if length > self.max_message_size {
                return Err(Error::InvalidMessage(format!(
                    "Handshake message of {} bytes exceeds limit of {}",
                    length, self.max_message_size
                )));
            }
            // The rest of this body arrives in a later record
            if offset + HANDSHAKE_HEADER_SIZE + length > self.buffer.len() {
                break;
            }
            offset += HANDSHAKE_HEADER_SIZE + length;
        }
        Ok(())
    }

    /// Remove and return the next complete message, if one is buffered.
    pub fn next_message(&mut self) -> Result<Option<HandshakeMessage>> {
        if self.buffer.len() < HANDSHAKE_HEADER_SIZE {
            return Ok(None);
        }
        let total = HANDSHAKE_HEADER_SIZE + declared_length(&self.buffer);
        if self.buffer.len() < total {
            return Ok(None);
        }
        let message = HandshakeMessage::decode(&self.buffer[..total])?;
        self.buffer.drain(..total);
        Ok(Some(message))
    }

    /// Whether no partial message is pending.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drop any buffered bytes.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

fn declared_length(header: &[u8]) -> usize {
    (header[1] as usize) << 16 | (header[2] as usize) << 8 | header[3] as usize
}

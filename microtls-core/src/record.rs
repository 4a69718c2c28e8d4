//! TLS record framing.
//!
//! # Record Structure
//!
//! ```text
//! struct {
//!     ContentType type;
//!     ProtocolVersion legacy_record_version = 0x0303;
//!     uint16 length;
//!     opaque fragment[TLSPlaintext.length];
//! } TLSPlaintext;
//! ```
//!
//! Protected records use the same header; their body may exceed
//! [`MAX_FRAGMENT_SIZE`] by the AEAD expansion allowance.

use crate::error::{Error, ProtocolError, Result};
use crate::protocol::{ContentType, ProtocolVersion};

/// Maximum plaintext fragment size (2^14).
pub const MAX_FRAGMENT_SIZE: usize = 16384;

/// Maximum protected record body (2^14 + 256, RFC 8446 Section 5.2).
pub const MAX_CIPHERTEXT_SIZE: usize = MAX_FRAGMENT_SIZE + 256;

/// TLS record header size (5 bytes).
pub const RECORD_HEADER_SIZE: usize = 5;

/// Parsed 5-byte record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    /// Content type
    pub content_type: ContentType,

    /// Record-layer version, kept raw for the caller's phase-dependent check
    pub version: u16,

    /// Declared body length
    pub length: usize,
}

impl RecordHeader {
    /// Parse a header.
    ///
    /// # Errors
    ///
    /// - `UnexpectedMessage` for an unrecognized content type
    /// - `ProtocolError(RecordOverflow)` if the length exceeds `max_length`
    pub fn parse(bytes: &[u8; RECORD_HEADER_SIZE], max_length: usize) -> Result<Self> {
        let content_type = ContentType::from_u8(bytes[0]).ok_or_else(|| {
            Error::UnexpectedMessage(format!("Unknown record content type: {}", bytes[0]))
        })?;
        let version = u16::from_be_bytes([bytes[1], bytes[2]]);
        let length = u16::from_be_bytes([bytes[3], bytes[4]]) as usize;

        if length > max_length {
            return Err(Error::ProtocolError(ProtocolError::RecordOverflow));
        }

        Ok(Self {
            content_type,
            version,
            length,
        })
    }

    /// Encode a header for a body of `length` bytes.
    pub fn encode(
        content_type: ContentType,
        version: ProtocolVersion,
        length: usize,
    ) -> Result<[u8; RECORD_HEADER_SIZE]> {
        if length > MAX_CIPHERTEXT_SIZE {
            return Err(Error::ProtocolError(ProtocolError::RecordOverflow));
        }
        let version = version.to_u16().to_be_bytes();
        let length = (length as u16).to_be_bytes();
        Ok([
            content_type.to_u8(),
            version[0],
            version[1],
            length[0],
            length[1],
        ])
    }
}

/// TLS record (plaintext).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPlaintext {
    /// Content type
    pub content_type: ContentType,

    /// Protocol version (legacy field in TLS 1.3)
    pub version: ProtocolVersion,

    /// Fragment data
    pub fragment: Vec<u8>,
}

impl TlsPlaintext {
    /// Create a new plaintext record.
    pub fn new(content_type: ContentType, version: ProtocolVersion, fragment: Vec<u8>) -> Self {
        Self {
            content_type,
            version,
            fragment,
        }
    }

    /// Get the record length (including header).
    pub fn len(&self) -> usize {
        RECORD_HEADER_SIZE + self.fragment.len()
    }

    /// Check if the record is empty.
    pub fn is_empty(&self) -> bool {
        self.fragment.is_empty()
    }

    /// Encode the record to bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.fragment.len() > MAX_FRAGMENT_SIZE {
            return Err(Error::ProtocolError(ProtocolError::RecordOverflow));
        }

        let mut buf = Vec::with_capacity(self.len());
        buf.extend_from_slice(&RecordHeader::encode(
            self.content_type,
            self.version,
            self.fragment.len(),
        )?);
        buf.extend_from_slice(&self.fragment);
        Ok(buf)
    }

    /// Decode a record from bytes.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let header: &[u8; RECORD_HEADER_SIZE] = data
            .get(..RECORD_HEADER_SIZE)
            .and_then(|h| h.try_into().ok())
            .ok_or_else(|| Error::InvalidMessage("Record too short".into()))?;
        let header = RecordHeader::parse(header, MAX_FRAGMENT_SIZE)?;
        let version = ProtocolVersion::from_u16(header.version)
            .ok_or_else(|| Error::InvalidMessage("Invalid protocol version".into()))?;

        let body = data
            .get(RECORD_HEADER_SIZE..RECORD_HEADER_SIZE + header.length)
            .ok_or_else(|| Error::InvalidMessage("Incomplete record".into()))?;

        Ok(Self {
            content_type: header.content_type,
            version,
            fragment: body.to_vec(),
        })
    }
}

/// Split `data` into records of at most `max_fragment` bytes each.
///
/// An empty payload still yields one empty record; zero-length
/// application data records are legal.
pub fn fragment(
    content_type: ContentType,
    version: ProtocolVersion,
    data: &[u8],
    max_fragment: usize,
) -> Vec<TlsPlaintext> {
    let max_fragment = max_fragment.clamp(1, MAX_FRAGMENT_SIZE);
    if data.is_empty() {
        return vec![TlsPlaintext::new(content_type, version, Vec::new())];
    }
    data.chunks(max_fragment)
        .map(|chunk| TlsPlaintext::new(content_type, version, chunk.to_vec()))
        .collect()
}

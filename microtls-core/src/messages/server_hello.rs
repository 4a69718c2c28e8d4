//! ServerHello message (RFC 8446 Section 4.1.3, RFC 5246 Section 7.4.1.3).

use bytes::{BufMut, BytesMut};

use crate::codec::{self, Reader};
use crate::error::{Error, Result};
use crate::extensions::Extensions;
use crate::protocol::ProtocolVersion;

/// ServerHello message.
///
/// ```text
/// struct {
///     ProtocolVersion legacy_version = 0x0303;    /* TLS v1.2 */
///     Random random;
///     opaque legacy_session_id_echo<0..32>;
///     CipherSuite cipher_suite;
///     uint8 legacy_compression_method = 0;
///     Extension extensions<6..2^16-1>;
/// } ServerHello;
/// ```
///
/// Fields are kept raw; the handshake decides what is acceptable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerHello {
    /// Legacy version field
    pub legacy_version: u16,

    /// Random bytes (32 bytes)
    pub random: [u8; 32],

    /// Legacy session ID echo (echoes client's session ID)
    pub legacy_session_id_echo: Vec<u8>,

    /// Selected cipher suite code
    pub cipher_suite: u16,

    /// Compression method (must be 0)
    pub compression_method: u8,

    /// Extensions, empty when the server sent none
    pub extensions: Extensions,
}

/// HelloRetryRequest special random value (RFC 8446 Section 4.1.3)
pub const HELLO_RETRY_REQUEST_RANDOM: [u8; 32] = [
    0xCF, 0x21, 0xAD, 0x74, 0xE5, 0x9A, 0x61, 0x11, 0xBE, 0x1D, 0x8C, 0x02, 0x1E, 0x65, 0xB8, 0x91,
    0xC2, 0xA2, 0x11, 0x16, 0x7A, 0xBB, 0x8C, 0x5E, 0x07, 0x9E, 0x09, 0xE2, 0xC8, 0xA8, 0x33, 0x9C,
];

/// Last 8 bytes of server_random when a TLS 1.3 server negotiates TLS 1.2.
pub const DOWNGRADE_TLS12_SENTINEL: [u8; 8] = *b"DOWNGRD\x01";

/// Last 8 bytes of server_random when a TLS 1.3 server negotiates TLS 1.1 or below.
pub const DOWNGRADE_TLS11_SENTINEL: [u8; 8] = *b"DOWNGRD\x00";

impl ServerHello {
    /// Create a new ServerHello.
    pub fn new(random: [u8; 32], cipher_suite: u16) -> Self {
        Self {
            legacy_version: ProtocolVersion::Tls12.to_u16(),
            random,
            legacy_session_id_echo: Vec::new(),
            cipher_suite,
            compression_method: 0,
            extensions: Extensions::new(),
        }
    }

    /// Set the legacy session ID echo.
    pub fn with_session_id_echo(mut self, session_id: Vec<u8>) -> Self {
        self.legacy_session_id_echo = session_id;
        self
    }

    /// Set the extension list.
    pub fn with_extensions(mut self, extensions: Extensions) -> Self {
        self.extensions = extensions;
        self
    }

    /// Check if this is a HelloRetryRequest.
    pub fn is_hello_retry_request(&self) -> bool {
        self.random == HELLO_RETRY_REQUEST_RANDOM
    }

    /// Whether server_random carries a downgrade sentinel.
    pub fn has_downgrade_sentinel(&self) -> bool {
        let tail = &self.random[24..];
        tail == DOWNGRADE_TLS12_SENTINEL || tail == DOWNGRADE_TLS11_SENTINEL
    }

    /// Encode the message body.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = BytesMut::new();
        buf.put_u16(self.legacy_version);
        buf.put_slice(&self.random);
        codec::put_vec_u8(&mut buf, &self.legacy_session_id_echo)?;
        buf.put_u16(self.cipher_suite);
        buf.put_u8(self.compression_method);
        if !self.extensions.is_empty() {
            self.extensions.encode_into(&mut buf)?;
        }
        Ok(buf.to_vec())
    }

    /// Decode a message body.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut r = Reader::new(data, "ServerHello");
        let legacy_version = r.u16()?;
        let random = r.array::<32>()?;
        let legacy_session_id_echo = r.vec_u8()?.to_vec();
        if legacy_session_id_echo.len() > 32 {
            return Err(Error::InvalidMessage("Session ID echo too long".into()));
        }
        let cipher_suite = r.u16()?;
        let compression_method = r.u8()?;

        // TLS 1.2 servers may omit the extension block entirely.
        let extensions = if r.is_empty() {
            Extensions::new()
        } else {
            Extensions::read(&mut r)?
        };
        r.finish()?;

        Ok(Self {
            legacy_version,
            random,
            legacy_session_id_echo,
            cipher_suite,
            compression_method,
            extensions,
        })
    }
}

//! ClientHello message (RFC 8446 Section 4.1.2, RFC 5246 Section 7.4.1.2).

use bytes::{BufMut, BytesMut};

use crate::cipher::CipherSuite;
use crate::codec::{self, Reader};
use crate::error::{Error, Result};
use crate::extensions::Extensions;
use crate::protocol::ProtocolVersion;

/// ClientHello message.
///
/// ```text
/// struct {
///     ProtocolVersion legacy_version = 0x0303;    /* TLS v1.2 */
///     Random random;
///     opaque legacy_session_id<0..32>;
///     CipherSuite cipher_suites<2..2^16-2>;
///     opaque legacy_compression_methods<1..2^8-1>;
///     Extension extensions<8..2^16-1>;
/// } ClientHello;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHello {
    /// Random bytes (32 bytes)
    pub random: [u8; 32],

    /// Legacy session ID (for middlebox compatibility)
    pub legacy_session_id: Vec<u8>,

    /// Cipher suite codes offered, in preference order
    pub cipher_suites: Vec<u16>,

    /// Extensions
    pub extensions: Extensions,
}

impl ClientHello {
    /// Create a new ClientHello.
    pub fn new(random: [u8; 32], cipher_suites: &[CipherSuite]) -> Self {
        Self {
            random,
            legacy_session_id: Vec::new(),
            cipher_suites: cipher_suites.iter().map(|s| s.to_u16()).collect(),
            extensions: Extensions::new(),
        }
    }

    /// Set the legacy session ID (for compatibility mode).
    pub fn with_session_id(mut self, session_id: Vec<u8>) -> Self {
        self.legacy_session_id = session_id;
        self
    }

    /// Set the extension list.
    pub fn with_extensions(mut self, extensions: Extensions) -> Self {
        self.extensions = extensions;
        self
    }

    /// Offered suites the engine recognizes.
    pub fn known_cipher_suites(&self) -> impl Iterator<Item = CipherSuite> + '_ {
        self.cipher_suites.iter().filter_map(|&c| CipherSuite::from_u16(c))
    }

    /// Encode the message body.
    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.legacy_session_id.len() > 32 {
            return Err(Error::InvalidMessage("Session ID too long".into()));
        }
        if self.cipher_suites.is_empty() {
            return Err(Error::InvalidConfig("No cipher suites offered".into()));
        }

        let mut buf = BytesMut::new();
        buf.put_u16(ProtocolVersion::Tls12.to_u16());
        buf.put_slice(&self.random);
        codec::put_vec_u8(&mut buf, &self.legacy_session_id)?;

        let mut suites = BytesMut::with_capacity(self.cipher_suites.len() * 2);
        for suite in &self.cipher_suites {
            suites.put_u16(*suite);
        }
        codec::put_vec_u16(&mut buf, &suites)?;

        // null compression only
        codec::put_vec_u8(&mut buf, &[0])?;
        self.extensions.encode_into(&mut buf)?;
        Ok(buf.to_vec())
    }

    /// Decode a message body.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut r = Reader::new(data, "ClientHello");
        let _legacy_version = r.u16()?;
        let random = r.array::<32>()?;
        let legacy_session_id = r.vec_u8()?.to_vec();
        if legacy_session_id.len() > 32 {
            return Err(Error::InvalidMessage("Session ID too long".into()));
        }

        let mut suites = r.sub_u16()?;
        if suites.remaining() % 2 != 0 {
            return Err(Error::InvalidMessage("Odd cipher suite list length".into()));
        }
        let mut cipher_suites = Vec::with_capacity(suites.remaining() / 2);
        while !suites.is_empty() {
            cipher_suites.push(suites.u16()?);
        }

        let compression = r.vec_u8()?;
        if !compression.contains(&0) {
            return Err(Error::InvalidMessage("Null compression not offered".into()));
        }

        let extensions = if r.is_empty() {
            Extensions::new()
        } else {
            Extensions::read(&mut r)?
        };
        r.finish()?;

        Ok(Self {
            random,
            legacy_session_id,
            cipher_suites,
            extensions,
        })
    }
}

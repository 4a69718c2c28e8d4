//! ClientKeyExchange Message (TLS 1.2 only)
//!
//! RFC 8422 Section 5.7
//!
//! ```text
//! struct {
//!     opaque point <1..2^8-1>;  // client's ephemeral ECDH public key
//! } ClientECDiffieHellmanPublic;
//! ```

use bytes::BytesMut;

use crate::codec::{self, Reader};
use crate::error::{Error, Result};

/// ClientKeyExchange message for ECDHE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientKeyExchange {
    /// Client's ephemeral ECDHE public key
    pub public_key: Vec<u8>,
}

impl ClientKeyExchange {
    /// Create a new ClientKeyExchange message.
    pub fn new(public_key: Vec<u8>) -> Self {
        Self { public_key }
    }

    /// Encode the message body.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = BytesMut::with_capacity(1 + self.public_key.len());
        codec::put_vec_u8(&mut buf, &self.public_key)?;
        Ok(buf.to_vec())
    }

    /// Decode the message body.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut r = Reader::new(data, "ClientKeyExchange");
        let public_key = r.vec_u8()?;
        r.finish()?;
        if public_key.is_empty() {
            return Err(Error::InvalidMessage("Empty ECDHE public key".into()));
        }
        Ok(Self {
            public_key: public_key.to_vec(),
        })
    }
}

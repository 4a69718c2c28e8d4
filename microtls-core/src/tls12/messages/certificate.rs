//! TLS 1.2 Certificate Message (RFC 5246 Section 7.4.2)
//!
//! Unlike TLS 1.3 there is no request context and no per-entry extensions.
//!
//! ```text
//! opaque ASN.1Cert<1..2^24-1>;
//!
//! struct {
//!     ASN.1Cert certificate_list<0..2^24-1>;
//! } Certificate;
//! ```

use bytes::BytesMut;

use crate::codec::{self, Reader};
use crate::error::{Error, Result};

/// TLS 1.2 Certificate message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tls12Certificate {
    /// DER certificates, leaf first
    pub certificate_list: Vec<Vec<u8>>,
}

impl Tls12Certificate {
    /// Create a new TLS 1.2 Certificate message.
    pub fn new(certificate_list: Vec<Vec<u8>>) -> Self {
        Self { certificate_list }
    }

    /// DER certificates, leaf first.
    pub fn chain(&self) -> Vec<&[u8]> {
        self.certificate_list.iter().map(|c| c.as_slice()).collect()
    }

    /// Encode the message body.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut list = BytesMut::new();
        for cert in &self.certificate_list {
            codec::put_vec_u24(&mut list, cert)?;
        }
        let mut buf = BytesMut::with_capacity(3 + list.len());
        codec::put_vec_u24(&mut buf, &list)?;
        Ok(buf.to_vec())
    }

    /// Decode the message body.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut r = Reader::new(data, "Certificate");
        let mut list = r.sub_u24()?;
        r.finish()?;

        let mut certificate_list = Vec::new();
        while !list.is_empty() {
            let cert = list.vec_u24()?;
            if cert.is_empty() {
                return Err(Error::InvalidMessage("Empty certificate entry".into()));
            }
            certificate_list.push(cert.to_vec());
        }
        Ok(Self { certificate_list })
    }
}

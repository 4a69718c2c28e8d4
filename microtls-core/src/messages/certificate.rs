//! Certificate message (RFC 8446 Section 4.4.2).
//!
//! ```text
//! struct {
//!     opaque cert_data<1..2^24-1>;
//!     Extension extensions<0..2^16-1>;
//! } CertificateEntry;
//!
//! struct {
//!     opaque certificate_request_context<0..2^8-1>;
//!     CertificateEntry certificate_list<0..2^24-1>;
//! } Certificate;
//! ```

use bytes::BytesMut;

use crate::codec::{self, Reader};
use crate::error::{Error, Result};
use crate::extensions::Extensions;

/// Certificate entry with extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateEntry {
    /// Certificate data (DER-encoded X.509)
    pub cert_data: Vec<u8>,

    /// Extensions for this certificate
    pub extensions: Extensions,
}

/// Certificate message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    /// Certificate request context (0-length for server auth)
    pub certificate_request_context: Vec<u8>,

    /// Certificate chain, leaf first
    pub certificate_list: Vec<CertificateEntry>,
}

impl Certificate {
    /// Create a new Certificate message.
    pub fn new(cert_list: Vec<Vec<u8>>) -> Self {
        let certificate_list = cert_list
            .into_iter()
            .map(|cert_data| CertificateEntry {
                cert_data,
                extensions: Extensions::new(),
            })
            .collect();

        Self {
            certificate_request_context: Vec::new(),
            certificate_list,
        }
    }

    /// DER certificates, leaf first.
    pub fn chain(&self) -> Vec<&[u8]> {
        self.certificate_list
            .iter()
            .map(|e| e.cert_data.as_slice())
            .collect()
    }

    /// Encode to bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut list = BytesMut::new();
        for entry in &self.certificate_list {
            codec::put_vec_u24(&mut list, &entry.cert_data)?;
            entry.extensions.encode_into(&mut list)?;
        }

        let mut buf = BytesMut::with_capacity(4 + list.len());
        codec::put_vec_u8(&mut buf, &self.certificate_request_context)?;
        codec::put_vec_u24(&mut buf, &list)?;
        Ok(buf.to_vec())
    }

    /// Decode from bytes.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut r = Reader::new(data, "Certificate");
        let certificate_request_context = r.vec_u8()?.to_vec();
        let mut list = r.sub_u24()?;
        r.finish()?;

        let mut certificate_list = Vec::new();
        while !list.is_empty() {
            let cert_data = list.vec_u24()?;
            if cert_data.is_empty() {
                return Err(Error::InvalidMessage("Empty certificate entry".into()));
            }
            let extensions = Extensions::read(&mut list)?;
            certificate_list.push(CertificateEntry {
                cert_data: cert_data.to_vec(),
                extensions,
            });
        }

        Ok(Self {
            certificate_request_context,
            certificate_list,
        })
    }
}

//! CertificateVerify message (RFC 8446 Section 4.4.3).
//!
//! The same `digitally-signed` layout closes a TLS 1.2 ServerKeyExchange.

use bytes::{BufMut, BytesMut};
use microtls_crypto::SignatureAlgorithm;

use crate::codec::{self, Reader};
use crate::error::Result;

/// CertificateVerify message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateVerify {
    /// SignatureScheme code
    pub algorithm: u16,

    /// Signature
    pub signature: Vec<u8>,
}

impl CertificateVerify {
    /// Create a new CertificateVerify message.
    pub fn new(algorithm: SignatureAlgorithm, signature: Vec<u8>) -> Self {
        Self {
            algorithm: algorithm.iana_codepoint(),
            signature,
        }
    }

    /// Scheme, if the engine knows it.
    pub fn scheme(&self) -> Option<SignatureAlgorithm> {
        SignatureAlgorithm::from_u16(self.algorithm)
    }

    /// Append `algorithm || signature<0..2^16-1>` to `buf`.
    pub fn encode_into(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u16(self.algorithm);
        codec::put_vec_u16(buf, &self.signature)
    }

    /// Encode to bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = BytesMut::with_capacity(4 + self.signature.len());
        self.encode_into(&mut buf)?;
        Ok(buf.to_vec())
    }

    /// Read from `r`, leaving any following bytes.
    pub fn read(r: &mut Reader<'_>) -> Result<Self> {
        let algorithm = r.u16()?;
        let signature = r.vec_u16()?.to_vec();
        Ok(Self {
            algorithm,
            signature,
        })
    }

    /// Decode from bytes.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut r = Reader::new(data, "CertificateVerify");
        let cv = Self::read(&mut r)?;
        r.finish()?;
        Ok(cv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_certificate_verify_layout() {
        let cv = CertificateVerify::new(SignatureAlgorithm::RsaPssRsaeSha256, vec![9; 3]);
        let bytes = cv.encode().unwrap();
        assert_eq!(bytes, vec![0x08, 0x04, 0x00, 0x03, 9, 9, 9]);
        let decoded = CertificateVerify::decode(&bytes).unwrap();
        assert_eq!(decoded.scheme(), Some(SignatureAlgorithm::RsaPssRsaeSha256));
    }

    #[test]
    fn test_unknown_scheme_kept_raw() {
        let decoded = CertificateVerify::decode(&[0xFE, 0x00, 0x00, 0x00]).unwrap();
        assert_eq!(decoded.algorithm, 0xFE00);
        assert!(decoded.scheme().is_none());
    }

    #[test]
    fn test_truncated_signature() {
        assert!(CertificateVerify::decode(&[0x04, 0x03, 0x00, 0x08, 1]).is_err());
    }
}

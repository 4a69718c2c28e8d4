//! ServerKeyExchange Message (TLS 1.2 only)
//!
//! RFC 5246 Section 7.4.3, RFC 8422 Section 5.4
//!
//! Only the ECDHE form with a named curve is understood:
//! ```text
//! struct {
//!     ECCurveType curve_type = named_curve (3);
//!     NamedCurve namedcurve;
//!     opaque point <1..2^8-1>;
//! } ServerECDHParams;
//!
//! struct {
//!     ServerECDHParams params;
//!     digitally-signed struct {
//!         opaque client_random[32];
//!         opaque server_random[32];
//!         ServerECDHParams params;
//!     } signed_params;
//! } ServerKeyExchange;
//! ```

use bytes::{BufMut, BytesMut};

use crate::codec::{self, Reader};
use crate::error::{Error, ProtocolError, Result};
use crate::messages::CertificateVerify;

/// ECCurveType `named_curve`.
const NAMED_CURVE: u8 = 3;

/// ServerKeyExchange message for ECDHE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerKeyExchange {
    /// NamedGroup code chosen by the server
    pub named_curve: u16,
    /// Server's ephemeral ECDHE public key
    pub public_key: Vec<u8>,
    /// Signature over randoms and params
    pub signed: CertificateVerify,
}

impl ServerKeyExchange {
    /// Encoded `ServerECDHParams`.
    pub fn params(&self) -> Result<Vec<u8>> {
        let mut buf = BytesMut::with_capacity(4 + self.public_key.len());
        buf.put_u8(NAMED_CURVE);
        buf.put_u16(self.named_curve);
        codec::put_vec_u8(&mut buf, &self.public_key)?;
        Ok(buf.to_vec())
    }

    /// Bytes covered by the signature.
    pub fn signed_message(
        &self,
        client_random: &[u8; 32],
        server_random: &[u8; 32],
    ) -> Result<Vec<u8>> {
        let params = self.params()?;
        let mut msg = Vec::with_capacity(64 + params.len());
        msg.extend_from_slice(client_random);
        msg.extend_from_slice(server_random);
        msg.extend_from_slice(&params);
        Ok(msg)
    }

    /// Encode the message body.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = BytesMut::from(&self.params()?[..]);
        self.signed.encode_into(&mut buf)?;
        Ok(buf.to_vec())
    }

    /// Decode the message body.
    ///
    /// # Errors
    ///
    /// - `InvalidMessage` on malformed framing
    /// - `ProtocolError(HandshakeFailure)` for explicit curves
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut r = Reader::new(data, "ServerKeyExchange");
        if r.u8()? != NAMED_CURVE {
            return Err(Error::ProtocolError(ProtocolError::HandshakeFailure));
        }
        let named_curve = r.u16()?;
        let public_key = r.vec_u8()?;
        if public_key.is_empty() {
            return Err(Error::InvalidMessage("Empty ECDHE public key".into()));
        }
        let signed = CertificateVerify::read(&mut r)?;
        r.finish()?;

        Ok(Self {
            named_curve,
            public_key: public_key.to_vec(),
            signed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use microtls_crypto::SignatureAlgorithm;

    fn sample() -> ServerKeyExchange {
        ServerKeyExchange {
            named_curve: 0x001D,
            public_key: vec![0x42; 32],
            signed: CertificateVerify::new(SignatureAlgorithm::EcdsaSecp256r1Sha256, vec![1; 70]),
        }
    }

    #[test]
    fn test_server_key_exchange_encode_decode() {
        let ske = sample();
        let bytes = ske.encode().unwrap();
        assert_eq!(&bytes[..4], &[3, 0x00, 0x1D, 32]);
        assert_eq!(ServerKeyExchange::decode(&bytes).unwrap(), ske);
    }

    #[test]
    fn test_signed_message_layout() {
        let ske = sample();
        let msg = ske.signed_message(&[1; 32], &[2; 32]).unwrap();
        assert_eq!(msg.len(), 64 + 4 + 32);
        assert_eq!(&msg[..32], &[1; 32]);
        assert_eq!(&msg[32..64], &[2; 32]);
        assert_eq!(msg[64], 3);
    }

    #[test]
    fn test_explicit_curve_rejected() {
        let mut bytes = sample().encode().unwrap();
        bytes[0] = 1;
        assert_eq!(
            ServerKeyExchange::decode(&bytes),
            Err(Error::ProtocolError(ProtocolError::HandshakeFailure))
        );
    }

    #[test]
    fn test_truncated_signature() {
        let bytes = sample().encode().unwrap();
        assert!(ServerKeyExchange::decode(&bytes[..bytes.len() - 1]).is_err());
    }
}

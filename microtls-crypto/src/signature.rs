//! Digital signature algorithms for TLS.
//!
//! Key encodings expected by [`Signature::verify`]:
//!
//! | family  | verifying key                              |
//! |---------|--------------------------------------------|
//! | ECDSA   | SEC1 point (the SPKI `subjectPublicKey`)   |
//! | RSA     | full DER `SubjectPublicKeyInfo`            |
//! | Ed25519 | 32 raw bytes                               |
//!
//! ECDSA signatures are DER-encoded, as they appear on the wire.

use crate::{Error, HashAlgorithm, Result};
use zeroize::Zeroize;

/// TLS `SignatureScheme` values understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignatureAlgorithm {
    /// ecdsa_secp256r1_sha256
    EcdsaSecp256r1Sha256,
    /// ecdsa_secp384r1_sha384
    EcdsaSecp384r1Sha384,
    /// ed25519
    Ed25519,
    /// rsa_pss_rsae_sha256
    RsaPssRsaeSha256,
    /// rsa_pss_rsae_sha384
    RsaPssRsaeSha384,
    /// rsa_pss_rsae_sha512
    RsaPssRsaeSha512,
    /// rsa_pkcs1_sha256 (TLS 1.2 and certificates only)
    RsaPkcs1Sha256,
    /// rsa_pkcs1_sha384 (TLS 1.2 and certificates only)
    RsaPkcs1Sha384,
    /// rsa_pkcs1_sha512 (TLS 1.2 and certificates only)
    RsaPkcs1Sha512,
}

impl SignatureAlgorithm {
    /// IANA `SignatureScheme` code point.
    pub const fn iana_codepoint(self) -> u16 {
        match self {
            SignatureAlgorithm::EcdsaSecp256r1Sha256 => 0x0403,
            SignatureAlgorithm::EcdsaSecp384r1Sha384 => 0x0503,
            SignatureAlgorithm::Ed25519 => 0x0807,
            SignatureAlgorithm::RsaPssRsaeSha256 => 0x0804,
            SignatureAlgorithm::RsaPssRsaeSha384 => 0x0805,
            SignatureAlgorithm::RsaPssRsaeSha512 => 0x0806,
            SignatureAlgorithm::RsaPkcs1Sha256 => 0x0401,
            SignatureAlgorithm::RsaPkcs1Sha384 => 0x0501,
            SignatureAlgorithm::RsaPkcs1Sha512 => 0x0601,
        }
    }

    /// Convert from wire format (u16).
    pub const fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0403 => Some(SignatureAlgorithm::EcdsaSecp256r1Sha256),
            0x0503 => Some(SignatureAlgorithm::EcdsaSecp384r1Sha384),
            0x0807 => Some(SignatureAlgorithm::Ed25519),
            0x0804 => Some(SignatureAlgorithm::RsaPssRsaeSha256),
            0x0805 => Some(SignatureAlgorithm::RsaPssRsaeSha384),
            0x0806 => Some(SignatureAlgorithm::RsaPssRsaeSha512),
            0x0401 => Some(SignatureAlgorithm::RsaPkcs1Sha256),
            0x0501 => Some(SignatureAlgorithm::RsaPkcs1Sha384),
            0x0601 => Some(SignatureAlgorithm::RsaPkcs1Sha512),
            _ => None,
        }
    }

    /// Scheme name as registered with IANA.
    pub const fn name(self) -> &'static str {
        match self {
            SignatureAlgorithm::EcdsaSecp256r1Sha256 => "ecdsa_secp256r1_sha256",
            SignatureAlgorithm::EcdsaSecp384r1Sha384 => "ecdsa_secp384r1_sha384",
            SignatureAlgorithm::Ed25519 => "ed25519",
            SignatureAlgorithm::RsaPssRsaeSha256 => "rsa_pss_rsae_sha256",
            SignatureAlgorithm::RsaPssRsaeSha384 => "rsa_pss_rsae_sha384",
            SignatureAlgorithm::RsaPssRsaeSha512 => "rsa_pss_rsae_sha512",
            SignatureAlgorithm::RsaPkcs1Sha256 => "rsa_pkcs1_sha256",
            SignatureAlgorithm::RsaPkcs1Sha384 => "rsa_pkcs1_sha384",
            SignatureAlgorithm::RsaPkcs1Sha512 => "rsa_pkcs1_sha512",
        }
    }

    /// RSA PKCS#1 v1.5 is forbidden in TLS 1.3 handshake signatures.
    pub const fn allowed_in_tls13(self) -> bool {
        !matches!(
            self,
            SignatureAlgorithm::RsaPkcs1Sha256
                | SignatureAlgorithm::RsaPkcs1Sha384
                | SignatureAlgorithm::RsaPkcs1Sha512
        )
    }

    /// Whether the scheme needs an RSA key.
    pub const fn is_rsa(self) -> bool {
        matches!(
            self,
            SignatureAlgorithm::RsaPssRsaeSha256
                | SignatureAlgorithm::RsaPssRsaeSha384
                | SignatureAlgorithm::RsaPssRsaeSha512
                | SignatureAlgorithm::RsaPkcs1Sha256
                | SignatureAlgorithm::RsaPkcs1Sha384
                | SignatureAlgorithm::RsaPkcs1Sha512
        )
    }

    /// Whether the scheme needs an elliptic-curve key (ECDSA or EdDSA).
    pub const fn is_ec(self) -> bool {
        !self.is_rsa()
    }

    /// Digest the scheme applies to the message, where it has a fixed one.
    pub const fn hash_algorithm(self) -> Option<HashAlgorithm> {
        match self {
            SignatureAlgorithm::EcdsaSecp256r1Sha256
            | SignatureAlgorithm::RsaPssRsaeSha256
            | SignatureAlgorithm::RsaPkcs1Sha256 => Some(HashAlgorithm::Sha256),
            SignatureAlgorithm::EcdsaSecp384r1Sha384
            | SignatureAlgorithm::RsaPssRsaeSha384
            | SignatureAlgorithm::RsaPkcs1Sha384 => Some(HashAlgorithm::Sha384),
            _ => None,
        }
    }
}

/// Signing key bytes. Wiped on drop.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct SigningKey {
    bytes: Vec<u8>,
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("bytes", &"<redacted>")
            .finish()
    }
}

impl SigningKey {
    /// Wrap raw signing key bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Borrow the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Signature scheme.
pub trait Signature: Send + Sync {
    /// Sign `message`.
    ///
    /// The engine is client-only and never signs; providers implement this
    /// for peers and test servers. The default refuses.
    fn sign(&self, signing_key: &[u8], message: &[u8]) -> Result<Vec<u8>> {
        let _ = (signing_key, message);
        Err(Error::UnsupportedAlgorithm(format!(
            "{} signing not implemented",
            self.algorithm().name()
        )))
    }

    /// Verify `signature` over `message`.
    ///
    /// # Errors
    ///
    /// - `InvalidPublicKey` / `InvalidSignature` for malformed inputs
    /// - `SignatureVerificationFailed` if the signature does not verify
    fn verify(&self, verifying_key: &[u8], message: &[u8], signature: &[u8]) -> Result<()>;

    /// Get the algorithm.
    fn algorithm(&self) -> SignatureAlgorithm;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_codepoint_roundtrip() {
        for code in [
            0x0403, 0x0503, 0x0807, 0x0804, 0x0805, 0x0806, 0x0401, 0x0501, 0x0601,
        ] {
            let alg = SignatureAlgorithm::from_u16(code).unwrap();
            assert_eq!(alg.iana_codepoint(), code);
        }
        assert_eq!(SignatureAlgorithm::from_u16(0x0201), None);
    }

    #[test]
    fn test_tls13_restrictions() {
        assert!(!SignatureAlgorithm::RsaPkcs1Sha256.allowed_in_tls13());
        assert!(SignatureAlgorithm::RsaPssRsaeSha256.allowed_in_tls13());
        assert!(SignatureAlgorithm::EcdsaSecp256r1Sha256.allowed_in_tls13());
    }
}

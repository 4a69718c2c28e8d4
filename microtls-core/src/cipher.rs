//! Cipher suite definitions and operations.

use microtls_crypto::{AeadAlgorithm, HashAlgorithm};

use crate::protocol::ProtocolVersion;

/// Cipher suite for TLS 1.2 and TLS 1.3.
///
/// TLS 1.3 cipher suites only name the AEAD and hash algorithm; key exchange
/// and signature algorithms are negotiated separately via extensions.
///
/// The TLS 1.2 suites here are all ECDHE with an AEAD, so they differ only in
/// the certificate key type (ECDSA or RSA) and the record cipher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum CipherSuite {
    // TLS 1.3 cipher suites (0x13xx)
    /// TLS_AES_128_GCM_SHA256 (mandatory to implement)
    Aes128GcmSha256 = 0x1301,

    /// TLS_AES_256_GCM_SHA384
    Aes256GcmSha384 = 0x1302,

    /// TLS_CHACHA20_POLY1305_SHA256
    ChaCha20Poly1305Sha256 = 0x1303,

    // TLS 1.2 cipher suites (0xC0xx, 0xCCxx)
    /// TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256
    Tls12EcdheEcdsaWithAes128GcmSha256 = 0xC02B,

    /// TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384
    Tls12EcdheEcdsaWithAes256GcmSha384 = 0xC02C,

    /// TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256
    Tls12EcdheEcdsaWithChacha20Poly1305Sha256 = 0xCCA9,

    /// TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256
    Tls12EcdheRsaWithAes128GcmSha256 = 0xC02F,

    /// TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384
    Tls12EcdheRsaWithAes256GcmSha384 = 0xC030,

    /// TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256
    Tls12EcdheRsaWithChacha20Poly1305Sha256 = 0xCCA8,
}

impl CipherSuite {
    /// Create from wire format (u16).
    pub const fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x1301 => Some(CipherSuite::Aes128GcmSha256),
            0x1302 => Some(CipherSuite::Aes256GcmSha384),
            0x1303 => Some(CipherSuite::ChaCha20Poly1305Sha256),
            0xC02B => Some(CipherSuite::Tls12EcdheEcdsaWithAes128GcmSha256),
            0xC02C => Some(CipherSuite::Tls12EcdheEcdsaWithAes256GcmSha384),
            0xCCA9 => Some(CipherSuite::Tls12EcdheEcdsaWithChacha20Poly1305Sha256),
            0xC02F => Some(CipherSuite::Tls12EcdheRsaWithAes128GcmSha256),
            0xC030 => Some(CipherSuite::Tls12EcdheRsaWithAes256GcmSha384),
            0xCCA8 => Some(CipherSuite::Tls12EcdheRsaWithChacha20Poly1305Sha256),
            _ => None,
        }
    }

    /// Convert to wire format (u16).
    pub const fn to_u16(self) -> u16 {
        self as u16
    }

    /// Protocol version this suite belongs to.
    pub const fn version(self) -> ProtocolVersion {
        match self {
            CipherSuite::Aes128GcmSha256
            | CipherSuite::Aes256GcmSha384
            | CipherSuite::ChaCha20Poly1305Sha256 => ProtocolVersion::Tls13,
            _ => ProtocolVersion::Tls12,
        }
    }

    /// Whether this is a TLS 1.3 suite.
    pub const fn is_tls13(self) -> bool {
        matches!(self.version(), ProtocolVersion::Tls13)
    }

    /// Whether a TLS 1.2 suite authenticates with an ECDSA certificate.
    ///
    /// `false` for the RSA suites and for every TLS 1.3 suite.
    pub const fn is_ecdsa(self) -> bool {
        matches!(
            self,
            CipherSuite::Tls12EcdheEcdsaWithAes128GcmSha256
                | CipherSuite::Tls12EcdheEcdsaWithAes256GcmSha384
                | CipherSuite::Tls12EcdheEcdsaWithChacha20Poly1305Sha256
        )
    }

    /// Get the AEAD algorithm for this cipher suite.
    pub const fn aead_algorithm(self) -> AeadAlgorithm {
        match self {
            CipherSuite::Aes128GcmSha256
            | CipherSuite::Tls12EcdheRsaWithAes128GcmSha256
            | CipherSuite::Tls12EcdheEcdsaWithAes128GcmSha256 => AeadAlgorithm::Aes128Gcm,
            CipherSuite::Aes256GcmSha384
            | CipherSuite::Tls12EcdheRsaWithAes256GcmSha384
            | CipherSuite::Tls12EcdheEcdsaWithAes256GcmSha384 => AeadAlgorithm::Aes256Gcm,
            CipherSuite::ChaCha20Poly1305Sha256
            | CipherSuite::Tls12EcdheRsaWithChacha20Poly1305Sha256
            | CipherSuite::Tls12EcdheEcdsaWithChacha20Poly1305Sha256 => {
                AeadAlgorithm::ChaCha20Poly1305
            },
        }
    }

    /// Get the hash algorithm for this cipher suite.
    ///
    /// This is the only source of the key schedule hash.
    pub const fn hash_algorithm(self) -> HashAlgorithm {
        match self {
            CipherSuite::Aes256GcmSha384
            | CipherSuite::Tls12EcdheRsaWithAes256GcmSha384
            | CipherSuite::Tls12EcdheEcdsaWithAes256GcmSha384 => HashAlgorithm::Sha384,
            _ => HashAlgorithm::Sha256,
        }
    }

    /// Get the key length for this cipher suite.
    pub const fn key_length(self) -> usize {
        self.aead_algorithm().key_size()
    }

    /// Get the IV length this suite derives from the key schedule.
    ///
    /// 12 bytes everywhere except TLS 1.2 AES-GCM, whose 4-byte implicit
    /// salt is completed by an 8-byte explicit nonce on the wire.
    pub const fn iv_length(self) -> usize {
        match (self.version(), self.aead_algorithm()) {
            (ProtocolVersion::Tls12, AeadAlgorithm::Aes128Gcm | AeadAlgorithm::Aes256Gcm) => 4,
            _ => 12,
        }
    }

    /// Get the cipher suite name.
    pub const fn name(self) -> &'static str {
        match self {
            CipherSuite::Aes128GcmSha256 => "TLS_AES_128_GCM_SHA256",
            CipherSuite::Aes256GcmSha384 => "TLS_AES_256_GCM_SHA384",
            CipherSuite::ChaCha20Poly1305Sha256 => "TLS_CHACHA20_POLY1305_SHA256",
            CipherSuite::Tls12EcdheEcdsaWithAes128GcmSha256 => {
                "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256"
            },
            CipherSuite::Tls12EcdheEcdsaWithAes256GcmSha384 => {
                "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384"
            },
            CipherSuite::Tls12EcdheEcdsaWithChacha20Poly1305Sha256 => {
                "TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256"
            },
            CipherSuite::Tls12EcdheRsaWithAes128GcmSha256 => {
                "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256"
            },
            CipherSuite::Tls12EcdheRsaWithAes256GcmSha384 => {
                "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384"
            },
            CipherSuite::Tls12EcdheRsaWithChacha20Poly1305Sha256 => {
                "TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256"
            },
        }
    }
}

/// Default cipher suite preference order: TLS 1.3 first, then TLS 1.2.
pub const DEFAULT_CIPHER_SUITES: &[CipherSuite] = &[
    CipherSuite::Aes128GcmSha256,
    CipherSuite::Aes256GcmSha384,
    CipherSuite::ChaCha20Poly1305Sha256,
    CipherSuite::Tls12EcdheEcdsaWithAes128GcmSha256,
    CipherSuite::Tls12EcdheEcdsaWithAes256GcmSha384,
    CipherSuite::Tls12EcdheEcdsaWithChacha20Poly1305Sha256,
    CipherSuite::Tls12EcdheRsaWithAes128GcmSha256,
    CipherSuite::Tls12EcdheRsaWithAes256GcmSha384,
    CipherSuite::Tls12EcdheRsaWithChacha20Poly1305Sha256,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cipher_suite_conversion() {
        for &suite in DEFAULT_CIPHER_SUITES {
            assert_eq!(CipherSuite::from_u16(suite.to_u16()), Some(suite));
        }
        assert_eq!(CipherSuite::from_u16(0x1304), None);
    }

    #[test]
    fn test_cipher_suite_properties() {
        let suite = CipherSuite::Aes128GcmSha256;
        assert_eq!(suite.aead_algorithm(), AeadAlgorithm::Aes128Gcm);
        assert_eq!(suite.hash_algorithm(), HashAlgorithm::Sha256);
        assert_eq!(suite.key_length(), 16);
        assert_eq!(suite.iv_length(), 12);
        assert_eq!(suite.name(), "TLS_AES_128_GCM_SHA256");
        assert!(suite.is_tls13());
    }

    #[test]
    fn test_tls12_suite_properties() {
        let gcm = CipherSuite::Tls12EcdheRsaWithAes256GcmSha384;
        assert_eq!(gcm.version(), ProtocolVersion::Tls12);
        assert_eq!(gcm.hash_algorithm(), HashAlgorithm::Sha384);
        assert_eq!(gcm.iv_length(), 4);
        assert!(!gcm.is_ecdsa());

        let chacha = CipherSuite::Tls12EcdheEcdsaWithChacha20Poly1305Sha256;
        assert_eq!(chacha.iv_length(), 12);
        assert_eq!(chacha.key_length(), 32);
        assert!(chacha.is_ecdsa());
    }
}

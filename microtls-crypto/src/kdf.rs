//! Key Derivation Function (KDF) interface.

use crate::{HashAlgorithm, Result};

/// KDF algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KdfAlgorithm {
    /// HKDF with SHA-256 (TLS 1.3)
    HkdfSha256,
    /// HKDF with SHA-384 (TLS 1.3)
    HkdfSha384,
    /// TLS 1.2 PRF with SHA-256
    TlsPrfSha256,
    /// TLS 1.2 PRF with SHA-384
    TlsPrfSha384,
}

impl KdfAlgorithm {
    /// Get the underlying hash algorithm.
    pub const fn hash_algorithm(self) -> HashAlgorithm {
        match self {
            KdfAlgorithm::HkdfSha256 | KdfAlgorithm::TlsPrfSha256 => HashAlgorithm::Sha256,
            KdfAlgorithm::HkdfSha384 | KdfAlgorithm::TlsPrfSha384 => HashAlgorithm::Sha384,
        }
    }

    /// Whether this is the TLS 1.2 PRF rather than HKDF.
    pub const fn is_tls12_prf(self) -> bool {
        matches!(self, KdfAlgorithm::TlsPrfSha256 | KdfAlgorithm::TlsPrfSha384)
    }

    /// Get the name of this KDF algorithm.
    pub const fn name(self) -> &'static str {
        match self {
            KdfAlgorithm::HkdfSha256 => "HKDF-SHA256",
            KdfAlgorithm::HkdfSha384 => "HKDF-SHA384",
            KdfAlgorithm::TlsPrfSha256 => "TLS-PRF-SHA256",
            KdfAlgorithm::TlsPrfSha384 => "TLS-PRF-SHA384",
        }
    }
}

/// KDF trait.
///
/// # TLS 1.3 Key Schedule
///
/// - Extract: `HKDF-Extract(salt, IKM) -> PRK`
/// - Expand: `HKDF-Expand(PRK, info, length) -> OKM`
///
/// # TLS 1.2 PRF
///
/// For the PRF algorithms `extract` returns the secret unchanged and
/// `expand(secret, label || seed, length)` computes
/// `P_hash(secret, label || seed)` truncated to `length`.
pub trait Kdf: Send + Sync {
    /// HKDF-Extract: extract a pseudorandom key from input key material.
    fn extract(&self, salt: &[u8], ikm: &[u8]) -> Vec<u8>;

    /// HKDF-Expand: expand a pseudorandom key to `length` bytes.
    ///
    /// # Errors
    ///
    /// Returns `InvalidLength` if `length` is too large (> 255 * hash size for HKDF).
    fn expand(&self, prk: &[u8], info: &[u8], length: usize) -> Result<Vec<u8>>;

    /// Get the KDF algorithm.
    fn algorithm(&self) -> KdfAlgorithm;
}

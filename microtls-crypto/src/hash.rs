//! Hash function interface.

use crate::kdf::KdfAlgorithm;

/// Hash algorithms used by the TLS key schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    /// SHA-256 (32-byte output)
    Sha256,
    /// SHA-384 (48-byte output)
    Sha384,
}

impl HashAlgorithm {
    /// Get the output size in bytes.
    pub const fn output_size(self) -> usize {
        match self {
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Sha384 => 48,
        }
    }

    /// Get the algorithm name.
    pub const fn name(self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "SHA-256",
            HashAlgorithm::Sha384 => "SHA-384",
        }
    }

    /// HKDF variant built on this hash (TLS 1.3).
    pub const fn to_kdf_algorithm(self) -> KdfAlgorithm {
        match self {
            HashAlgorithm::Sha256 => KdfAlgorithm::HkdfSha256,
            HashAlgorithm::Sha384 => KdfAlgorithm::HkdfSha384,
        }
    }

    /// TLS 1.2 PRF variant built on this hash.
    pub const fn to_prf_algorithm(self) -> KdfAlgorithm {
        match self {
            HashAlgorithm::Sha256 => KdfAlgorithm::TlsPrfSha256,
            HashAlgorithm::Sha384 => KdfAlgorithm::TlsPrfSha384,
        }
    }
}

/// Incremental hash function.
///
/// ```rust,no_run
/// use microtls_crypto::{CryptoProvider, HashAlgorithm};
///
/// fn digest<P: CryptoProvider>(provider: &P) -> microtls_crypto::Result<Vec<u8>> {
///     let mut hash = provider.hash(HashAlgorithm::Sha256)?;
///     hash.update(b"hello ");
///     hash.update(b"world");
///     Ok(hash.finalize())
/// }
/// ```
pub trait Hash: Send {
    /// Absorb more input.
    fn update(&mut self, data: &[u8]);

    /// Finish and return the digest, consuming the hasher.
    fn finalize(self: Box<Self>) -> Vec<u8>;

    /// Get the algorithm.
    fn algorithm(&self) -> HashAlgorithm;

    /// Get the output size in bytes.
    fn output_size(&self) -> usize {
        self.algorithm().output_size()
    }
}

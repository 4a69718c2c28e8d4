//! # microtls Cryptographic Provider Interface
//!
//! This crate defines the cryptographic abstraction layer for microtls.
//! The protocol engine never implements a primitive itself; every AEAD,
//! hash, KDF, key exchange and signature operation goes through a
//! [`CryptoProvider`] supplied by the application.
//!
//! ## Architecture
//!
//! ```text
//! CryptoProvider (main trait)
//! ├── Aead (AES-128-GCM, AES-256-GCM, ChaCha20-Poly1305)
//! ├── Hash (SHA-256, SHA-384)
//! ├── Hmac (HMAC-SHA256, HMAC-SHA384)
//! ├── Kdf (HKDF for TLS 1.3, PRF for TLS 1.2)
//! ├── Random (CSPRNG)
//! ├── KeyExchange (X25519, secp256r1, secp384r1)
//! └── Signature (ECDSA, RSA-PSS, RSA PKCS#1 v1.5)
//! ```
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use microtls_crypto::{AeadAlgorithm, CryptoProvider};
//!
//! fn example<P: CryptoProvider>(provider: &P) -> microtls_crypto::Result<()> {
//!     let aead = provider.aead(AeadAlgorithm::Aes128Gcm)?;
//!     let ciphertext = aead.seal(&[0u8; 16], &[0u8; 12], b"aad", b"hello")?;
//!     let plaintext = aead.open(&[0u8; 16], &[0u8; 12], b"aad", &ciphertext)?;
//!     assert_eq!(plaintext, b"hello");
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    unused_qualifications,
    missing_debug_implementations
)]

pub mod aead;
pub mod error;
pub mod hash;
pub mod hmac;
pub mod kdf;
pub mod key_exchange;
pub mod random;
pub mod signature;

pub use aead::{Aead, AeadAlgorithm};
pub use error::{Error, Result};
pub use hash::{Hash, HashAlgorithm};
pub use hmac::Hmac;
pub use kdf::{Kdf, KdfAlgorithm};
pub use key_exchange::{KeyExchange, KeyExchangeAlgorithm, PrivateKey, PublicKey, SharedSecret};
pub use random::Random;
pub use signature::{Signature, SignatureAlgorithm};

/// The main cryptographic provider trait.
///
/// Implementations of this trait provide all cryptographic operations
/// needed by microtls. The trait is object-safe so the protocol layers can
/// take `&dyn CryptoProvider`, while the public client stays generic over
/// the concrete provider type for static dispatch.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync`. A single provider is usually
/// shared by every connection in the process.
pub trait CryptoProvider: Send + Sync + 'static {
    /// Create a new instance of the crypto provider.
    fn new() -> Self
    where
        Self: Sized;

    /// Get an AEAD cipher instance.
    ///
    /// Returns an error if the algorithm is not supported.
    fn aead(&self, algorithm: AeadAlgorithm) -> Result<Box<dyn Aead>>;

    /// Get a hash function instance.
    fn hash(&self, algorithm: HashAlgorithm) -> Result<Box<dyn Hash>>;

    /// Get an HMAC instance keyed with `key`.
    fn hmac(&self, algorithm: HashAlgorithm, key: &[u8]) -> Result<Box<dyn Hmac>>;

    /// Get a KDF (HKDF or TLS 1.2 PRF) instance.
    fn kdf(&self, algorithm: KdfAlgorithm) -> Result<Box<dyn Kdf>>;

    /// Get the random number generator.
    fn random(&self) -> &dyn Random;

    /// Get a key exchange instance for an elliptic-curve group.
    fn key_exchange(&self, algorithm: KeyExchangeAlgorithm) -> Result<Box<dyn KeyExchange>>;

    /// Get a signature scheme instance.
    fn signature(&self, algorithm: SignatureAlgorithm) -> Result<Box<dyn Signature>>;

    /// Check if the provider supports a specific AEAD algorithm.
    fn supports_aead(&self, algorithm: AeadAlgorithm) -> bool {
        self.aead(algorithm).is_ok()
    }

    /// Check if the provider supports a specific key exchange algorithm.
    fn supports_key_exchange(&self, algorithm: KeyExchangeAlgorithm) -> bool {
        self.key_exchange(algorithm).is_ok()
    }

    /// Check if the provider supports a specific signature algorithm.
    fn supports_signature(&self, algorithm: SignatureAlgorithm) -> bool {
        self.signature(algorithm).is_ok()
    }
}

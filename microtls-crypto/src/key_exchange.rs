//! Key exchange algorithms for TLS.
//!
//! Each algorithm corresponds to a TLS `NamedGroup`. The same ephemeral
//! keypair type serves both the TLS 1.3 `key_share` extension and the
//! TLS 1.2 ECDHE `ClientKeyExchange`.

use crate::Result;
use zeroize::Zeroize;

/// Elliptic-curve groups for ECDHE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyExchangeAlgorithm {
    /// X25519 (RFC 7748)
    X25519,
    /// NIST P-256
    Secp256r1,
    /// NIST P-384
    Secp384r1,
}

impl KeyExchangeAlgorithm {
    /// Public key size in bytes (uncompressed SEC1 for the NIST curves).
    pub const fn public_key_size(self) -> usize {
        match self {
            KeyExchangeAlgorithm::X25519 => 32,
            KeyExchangeAlgorithm::Secp256r1 => 65,
            KeyExchangeAlgorithm::Secp384r1 => 97,
        }
    }

    /// Shared secret size in bytes.
    pub const fn shared_secret_size(self) -> usize {
        match self {
            KeyExchangeAlgorithm::X25519 => 32,
            KeyExchangeAlgorithm::Secp256r1 => 32,
            KeyExchangeAlgorithm::Secp384r1 => 48,
        }
    }

    /// IANA `NamedGroup` code point.
    pub const fn iana_codepoint(self) -> u16 {
        match self {
            KeyExchangeAlgorithm::X25519 => 0x001D,
            KeyExchangeAlgorithm::Secp256r1 => 0x0017,
            KeyExchangeAlgorithm::Secp384r1 => 0x0018,
        }
    }

    /// Convert to wire format (u16).
    pub const fn to_u16(self) -> u16 {
        self.iana_codepoint()
    }

    /// Convert from wire format (u16).
    pub const fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x001D => Some(KeyExchangeAlgorithm::X25519),
            0x0017 => Some(KeyExchangeAlgorithm::Secp256r1),
            0x0018 => Some(KeyExchangeAlgorithm::Secp384r1),
            _ => None,
        }
    }

    /// Group name as registered with IANA.
    pub const fn name(self) -> &'static str {
        match self {
            KeyExchangeAlgorithm::X25519 => "x25519",
            KeyExchangeAlgorithm::Secp256r1 => "secp256r1",
            KeyExchangeAlgorithm::Secp384r1 => "secp384r1",
        }
    }
}

/// Ephemeral private key. Wiped on drop.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct PrivateKey {
    bytes: Vec<u8>,
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKey")
            .field("bytes", &"<redacted>")
            .finish()
    }
}

impl PrivateKey {
    /// Wrap raw private key bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Borrow the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Public key in its TLS wire encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    bytes: Vec<u8>,
}

impl PublicKey {
    /// Wrap wire-encoded public key bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Borrow the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Take the raw bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// ECDHE shared secret. Wiped on drop.
#[derive(Zeroize)]
#[zeroize(drop)]
pub struct SharedSecret {
    bytes: Vec<u8>,
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSecret")
            .field("bytes", &"<redacted>")
            .finish()
    }
}

impl SharedSecret {
    /// Wrap raw shared secret bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Borrow the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Ephemeral Diffie-Hellman over one group.
pub trait KeyExchange: Send + Sync {
    /// Generate a fresh ephemeral keypair.
    fn generate_keypair(&self) -> Result<(PrivateKey, PublicKey)>;

    /// Compute the shared secret with the peer's wire-encoded public key.
    ///
    /// # Errors
    ///
    /// - `InvalidPublicKey` if the peer key is not a valid point
    /// - `KeyExchangeFailed` if the result is the identity / all-zero value
    fn exchange(&self, private_key: &PrivateKey, peer_public_key: &[u8]) -> Result<SharedSecret>;

    /// Get the algorithm.
    fn algorithm(&self) -> KeyExchangeAlgorithm;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_codepoints() {
        for group in [
            KeyExchangeAlgorithm::X25519,
            KeyExchangeAlgorithm::Secp256r1,
            KeyExchangeAlgorithm::Secp384r1,
        ] {
            assert_eq!(KeyExchangeAlgorithm::from_u16(group.to_u16()), Some(group));
        }
        assert_eq!(KeyExchangeAlgorithm::from_u16(0x0019), None);
    }

    #[test]
    fn test_private_key_debug_is_redacted() {
        let key = PrivateKey::from_bytes(vec![0x42; 32]);
        let rendered = format!("{:?}", key);
        assert!(rendered.contains("redacted"));
        assert!(!rendered.contains("66"));
    }
}

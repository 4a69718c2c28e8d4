//! AEAD cipher implementations using `aes-gcm` and `chacha20poly1305`.

use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{KeyInit, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm};
use chacha20poly1305::ChaCha20Poly1305;
use microtls_crypto::{Aead, AeadAlgorithm, Error, Result};

/// Create an AEAD cipher instance for the specified algorithm.
pub fn create_aead(algorithm: AeadAlgorithm) -> Result<Box<dyn Aead>> {
    match algorithm {
        AeadAlgorithm::Aes128Gcm => Ok(Box::new(Aes128GcmImpl)),
        AeadAlgorithm::Aes256Gcm => Ok(Box::new(Aes256GcmImpl)),
        AeadAlgorithm::ChaCha20Poly1305 => Ok(Box::new(ChaCha20Poly1305Impl)),
    }
}

fn check_sizes(algorithm: AeadAlgorithm, key: &[u8], nonce: &[u8]) -> Result<()> {
    if key.len() != algorithm.key_size() {
        return Err(Error::InvalidKeySize {
            expected: algorithm.key_size(),
            actual: key.len(),
        });
    }
    if nonce.len() != algorithm.nonce_size() {
        return Err(Error::InvalidNonceSize {
            expected: algorithm.nonce_size(),
            actual: nonce.len(),
        });
    }
    Ok(())
}

fn seal_with<C>(
    algorithm: AeadAlgorithm,
    key: &[u8],
    nonce: &[u8],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>>
where
    C: KeyInit + aes_gcm::aead::Aead,
{
    check_sizes(algorithm, key, nonce)?;
    let cipher = C::new_from_slice(key).map_err(|_| Error::InvalidKeySize {
        expected: algorithm.key_size(),
        actual: key.len(),
    })?;
    cipher
        .encrypt(
            GenericArray::from_slice(nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| Error::EncryptionFailed)
}

fn open_with<C>(
    algorithm: AeadAlgorithm,
    key: &[u8],
    nonce: &[u8],
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>>
where
    C: KeyInit + aes_gcm::aead::Aead,
{
    check_sizes(algorithm, key, nonce)?;
    if ciphertext.len() < algorithm.tag_size() {
        return Err(Error::AuthenticationFailed);
    }
    let cipher = C::new_from_slice(key).map_err(|_| Error::InvalidKeySize {
        expected: algorithm.key_size(),
        actual: key.len(),
    })?;
    cipher
        .decrypt(
            GenericArray::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| Error::AuthenticationFailed)
}

/// AES-128-GCM.
///
/// - Key size: 16 bytes
/// - Nonce size: 12 bytes
/// - Authentication tag: 16 bytes
#[derive(Debug)]
struct Aes128GcmImpl;

impl Aead for Aes128GcmImpl {
    fn seal(&self, key: &[u8], nonce: &[u8], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        seal_with::<Aes128Gcm>(self.algorithm(), key, nonce, aad, plaintext)
    }

    fn open(&self, key: &[u8], nonce: &[u8], aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        open_with::<Aes128Gcm>(self.algorithm(), key, nonce, aad, ciphertext)
    }

    fn algorithm(&self) -> AeadAlgorithm {
        AeadAlgorithm::Aes128Gcm
    }
}

/// AES-256-GCM.
#[derive(Debug)]
struct Aes256GcmImpl;

impl Aead for Aes256GcmImpl {
    fn seal(&self, key: &[u8], nonce: &[u8], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        seal_with::<Aes256Gcm>(self.algorithm(), key, nonce, aad, plaintext)
    }

    fn open(&self, key: &[u8], nonce: &[u8], aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        open_with::<Aes256Gcm>(self.algorithm(), key, nonce, aad, ciphertext)
    }

    fn algorithm(&self) -> AeadAlgorithm {
        AeadAlgorithm::Aes256Gcm
    }
}

/// ChaCha20-Poly1305 (RFC 8439).
#[derive(Debug)]
struct ChaCha20Poly1305Impl;

impl Aead for ChaCha20Poly1305Impl {
    fn seal(&self, key: &[u8], nonce: &[u8], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        seal_with::<ChaCha20Poly1305>(self.algorithm(), key, nonce, aad, plaintext)
    }

    fn open(&self, key: &[u8], nonce: &[u8], aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        open_with::<ChaCha20Poly1305>(self.algorithm(), key, nonce, aad, ciphertext)
    }

    fn algorithm(&self) -> AeadAlgorithm {
        AeadAlgorithm::ChaCha20Poly1305
    }
}

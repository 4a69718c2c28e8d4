//! TLS 1.2 PRF (Pseudorandom Function) - RFC 5246 Section 5
//!
//! The TLS 1.2 PRF is used for key derivation and is based on HMAC.
//!
//! PRF(secret, label, seed) = P_<hash>(secret, label + seed)
//!
//! Where P_hash is defined as:
//! P_hash(secret, seed) = HMAC_hash(secret, A(1) + seed) +
//!                         HMAC_hash(secret, A(2) + seed) +
//!                         HMAC_hash(secret, A(3) + seed) + ...
//!
//! A(0) = seed
//! A(i) = HMAC_hash(secret, A(i-1))

use core::fmt;

use microtls_crypto::{CryptoProvider, HashAlgorithm};
use zeroize::Zeroizing;

use crate::cipher::CipherSuite;
use crate::error::{Error, Result};

/// Master secret length (RFC 5246 Section 8.1).
pub const MASTER_SECRET_LEN: usize = 48;

/// Finished verify_data length.
pub const VERIFY_DATA_LEN: usize = 12;

/// TLS 1.2 PRF implementation
#[derive(Clone, Copy)]
pub struct Tls12Prf<'a> {
    provider: &'a dyn CryptoProvider,
    hash_algorithm: HashAlgorithm,
}

impl fmt::Debug for Tls12Prf<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tls12Prf")
            .field("hash_algorithm", &self.hash_algorithm)
            .finish()
    }
}

impl<'a> Tls12Prf<'a> {
    /// Create a PRF over the given hash.
    pub fn new(provider: &'a dyn CryptoProvider, hash_algorithm: HashAlgorithm) -> Self {
        Self {
            provider,
            hash_algorithm,
        }
    }

    /// Compute `PRF(secret, label, seed)` truncated to `output_len`.
    ///
    /// Uses the provider's PRF when it has one and falls back to P_hash over
    /// the provider's HMAC otherwise.
    pub fn compute(
        &self,
        secret: &[u8],
        label: &[u8],
        seed: &[u8],
        output_len: usize,
    ) -> Result<Vec<u8>> {
        let mut label_seed = Vec::with_capacity(label.len() + seed.len());
        label_seed.extend_from_slice(label);
        label_seed.extend_from_slice(seed);

        match self.provider.kdf(self.hash_algorithm.to_prf_algorithm()) {
            Ok(kdf) => Ok(kdf.expand(secret, &label_seed, output_len)?),
            Err(microtls_crypto::Error::UnsupportedAlgorithm(_)) => {
                self.p_hash(secret, &label_seed, output_len)
            },
            Err(e) => Err(e.into()),
        }
    }

    /// P_hash over the provider's HMAC.
    fn p_hash(&self, secret: &[u8], label_seed: &[u8], output_len: usize) -> Result<Vec<u8>> {
        let mut output = Vec::with_capacity(output_len);

        // A(0) = label + seed
        let mut a = label_seed.to_vec();
        while output.len() < output_len {
            a = self.hmac(secret, &[&a])?;
            let block = self.hmac(secret, &[&a, label_seed])?;
            let take = (output_len - output.len()).min(block.len());
            output.extend_from_slice(&block[..take]);
        }
        Ok(output)
    }

    fn hmac(&self, key: &[u8], parts: &[&[u8]]) -> Result<Vec<u8>> {
        let mut hmac = self.provider.hmac(self.hash_algorithm, key)?;
        for part in parts {
            hmac.update(part);
        }
        Ok(hmac.finalize())
    }
}

fn check_random(name: &str, random: &[u8]) -> Result<()> {
    if random.len() != 32 {
        return Err(Error::InternalError(format!(
            "{} must be 32 bytes, got {}",
            name,
            random.len()
        )));
    }
    Ok(())
}

/// Compute TLS 1.2 master secret from premaster secret.
///
/// master_secret = PRF(pre_master_secret, "master secret",
///                     ClientHello.random + ServerHello.random)[0..47]
pub fn compute_master_secret(
    provider: &dyn CryptoProvider,
    hash_algorithm: HashAlgorithm,
    premaster_secret: &[u8],
    client_random: &[u8],
    server_random: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    check_random("client random", client_random)?;
    check_random("server random", server_random)?;

    let mut seed = Vec::with_capacity(64);
    seed.extend_from_slice(client_random);
    seed.extend_from_slice(server_random);

    Tls12Prf::new(provider, hash_algorithm)
        .compute(premaster_secret, b"master secret", &seed, MASTER_SECRET_LEN)
        .map(Zeroizing::new)
}

/// Compute the extended master secret (RFC 7627 Section 4).
///
/// master_secret = PRF(pre_master_secret, "extended master secret",
///                     session_hash)[0..47]
///
/// `session_hash` is the transcript hash through ClientKeyExchange.
pub fn compute_extended_master_secret(
    provider: &dyn CryptoProvider,
    hash_algorithm: HashAlgorithm,
    premaster_secret: &[u8],
    session_hash: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    Tls12Prf::new(provider, hash_algorithm)
        .compute(
            premaster_secret,
            b"extended master secret",
            session_hash,
            MASTER_SECRET_LEN,
        )
        .map(Zeroizing::new)
}

/// Record keys carved out of the key block.
///
/// AEAD suites have no MAC keys, so the block is
/// `client_key || server_key || client_iv || server_iv`.
pub struct KeyBlock {
    /// client_write_key
    pub client_key: Zeroizing<Vec<u8>>,
    /// server_write_key
    pub server_key: Zeroizing<Vec<u8>>,
    /// client_write_IV (4 bytes for GCM, 12 for ChaCha20-Poly1305)
    pub client_iv: Zeroizing<Vec<u8>>,
    /// server_write_IV
    pub server_iv: Zeroizing<Vec<u8>>,
}

impl fmt::Debug for KeyBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyBlock")
            .field("key_len", &self.client_key.len())
            .field("iv_len", &self.client_iv.len())
            .finish()
    }
}

/// Compute TLS 1.2 key material from master secret.
///
/// key_block = PRF(SecurityParameters.master_secret, "key expansion",
///                 SecurityParameters.server_random +
///                 SecurityParameters.client_random);
pub fn compute_key_block(
    provider: &dyn CryptoProvider,
    cipher_suite: CipherSuite,
    master_secret: &[u8],
    server_random: &[u8],
    client_random: &[u8],
) -> Result<KeyBlock> {
    if master_secret.len() != MASTER_SECRET_LEN {
        return Err(Error::InternalError(format!(
            "Master secret must be 48 bytes, got {}",
            master_secret.len()
        )));
    }
    check_random("server random", server_random)?;
    check_random("client random", client_random)?;

    // Seed order is reversed relative to the master secret.
    let mut seed = Vec::with_capacity(64);
    seed.extend_from_slice(server_random);
    seed.extend_from_slice(client_random);

    let key_len = cipher_suite.key_length();
    let iv_len = cipher_suite.iv_length();
    let block = Zeroizing::new(
        Tls12Prf::new(provider, cipher_suite.hash_algorithm()).compute(
            master_secret,
            b"key expansion",
            &seed,
            2 * (key_len + iv_len),
        )?,
    );

    let (client_key, rest) = block.split_at(key_len);
    let (server_key, rest) = rest.split_at(key_len);
    let (client_iv, server_iv) = rest.split_at(iv_len);
    Ok(KeyBlock {
        client_key: Zeroizing::new(client_key.to_vec()),
        server_key: Zeroizing::new(server_key.to_vec()),
        client_iv: Zeroizing::new(client_iv.to_vec()),
        server_iv: Zeroizing::new(server_iv.to_vec()),
    })
}

/// Compute TLS 1.2 verify data for Finished message.
///
/// verify_data = PRF(master_secret, finished_label, Hash(handshake_messages))[0..11]
pub fn compute_verify_data(
    provider: &dyn CryptoProvider,
    hash_algorithm: HashAlgorithm,
    master_secret: &[u8],
    finished_label: &[u8],
    handshake_hash: &[u8],
) -> Result<Vec<u8>> {
    Tls12Prf::new(provider, hash_algorithm).compute(
        master_secret,
        finished_label,
        handshake_hash,
        VERIFY_DATA_LEN,
    )
}

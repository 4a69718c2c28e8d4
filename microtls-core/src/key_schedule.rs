//! TLS 1.3 Key Schedule (RFC 8446 Section 7.1).
//!
//! The TLS 1.3 key schedule uses HKDF to derive all cryptographic keys and IVs
//! from the (EC)DHE shared secret. Without PSKs the early secret is fixed, so
//! the client only walks the lower two stages:
//!
//! ```text
//!              0
//!              |
//!              v
//!     0 ->  HKDF-Extract = Early Secret
//!              |
//!              v
//!        Derive-Secret(., "derived", "")
//!              |
//!              v
//!   (EC)DHE -> HKDF-Extract = Handshake Secret
//!              |
//!              +-----> Derive-Secret(., "c hs traffic",
//!              |                     ClientHello...ServerHello)
//!              |                     = client_handshake_traffic_secret
//!              |
//!              +-----> Derive-Secret(., "s hs traffic",
//!              |                     ClientHello...ServerHello)
//!              |                     = server_handshake_traffic_secret
//!              v
//!        Derive-Secret(., "derived", "")
//!              |
//!              v
//!   0 -> HKDF-Extract = Master Secret
//!              |
//!              +-----> Derive-Secret(., "c ap traffic",
//!              |                     ClientHello...server Finished)
//!              |                     = client_application_traffic_secret_0
//!              |
//!              +-----> Derive-Secret(., "s ap traffic",
//!                                    ClientHello...server Finished)
//!                                    = server_application_traffic_secret_0
//! ```
//!
//! The hash function is fixed by the cipher suite; nothing here accepts a
//! separate hash parameter.

use core::fmt;

use crate::cipher::CipherSuite;
use crate::error::{Error, ProtocolError, Result};
use crate::transcript::hkdf_expand_label;
use microtls_crypto::{CryptoProvider, HashAlgorithm};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

/// Client and server traffic secrets from one stage of the schedule.
pub struct TrafficSecrets {
    /// Secret protecting client-to-server records
    pub client: Zeroizing<Vec<u8>>,
    /// Secret protecting server-to-client records
    pub server: Zeroizing<Vec<u8>>,
}

impl fmt::Debug for TrafficSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrafficSecrets")
            .field("client", &"<redacted>")
            .field("server", &"<redacted>")
            .finish()
    }
}

/// AEAD key and IV expanded from a traffic secret.
pub struct TrafficKeys {
    /// write_key
    pub key: Zeroizing<Vec<u8>>,
    /// write_iv
    pub iv: Zeroizing<Vec<u8>>,
}

impl fmt::Debug for TrafficKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrafficKeys")
            .field("key_len", &self.key.len())
            .field("iv_len", &self.iv.len())
            .finish()
    }
}

impl TrafficKeys {
    /// Expand a traffic secret into the suite's key and 12-byte IV.
    ///
    /// ```text
    /// [sender]_write_key = HKDF-Expand-Label(Secret, "key", "", key_length)
    /// [sender]_write_iv  = HKDF-Expand-Label(Secret, "iv", "", iv_length)
    /// ```
    pub fn derive(
        provider: &dyn CryptoProvider,
        cipher_suite: CipherSuite,
        traffic_secret: &[u8],
    ) -> Result<Self> {
        let hash = cipher_suite.hash_algorithm();
        let key = hkdf_expand_label(
            provider,
            hash,
            traffic_secret,
            b"key",
            &[],
            cipher_suite.key_length(),
        )?;
        let iv = hkdf_expand_label(
            provider,
            hash,
            traffic_secret,
            b"iv",
            &[],
            cipher_suite.iv_length(),
        )?;
        Ok(Self {
            key: Zeroizing::new(key),
            iv: Zeroizing::new(iv),
        })
    }
}

/// TLS 1.3 key schedule for one connection.
///
/// Intermediate secrets are wiped as soon as the next stage no longer needs
/// them: the handshake secret once the master secret exists, the master
/// secret once the application traffic secrets are out.
pub struct KeySchedule {
    /// Selected cipher suite
    cipher_suite: CipherSuite,

    /// Hash algorithm for this cipher suite
    hash_algorithm: HashAlgorithm,

    /// Handshake secret (derived from (EC)DHE)
    handshake_secret: Option<Zeroizing<Vec<u8>>>,
}

impl fmt::Debug for KeySchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeySchedule")
            .field("cipher_suite", &self.cipher_suite)
            .field("has_handshake_secret", &self.handshake_secret.is_some())
            .finish()
    }
}

impl KeySchedule {
    /// Create a new key schedule for the given cipher suite.
    ///
    /// # Errors
    ///
    /// `InternalError` for a TLS 1.2 suite.
    pub fn new(cipher_suite: CipherSuite) -> Result<Self> {
        if !cipher_suite.is_tls13() {
            return Err(Error::InternalError(format!(
                "{} is not a TLS 1.3 suite",
                cipher_suite.name()
            )));
        }
        Ok(Self {
            cipher_suite,
            hash_algorithm: cipher_suite.hash_algorithm(),
            handshake_secret: None,
        })
    }

    /// Selected cipher suite.
    pub fn cipher_suite(&self) -> CipherSuite {
        self.cipher_suite
    }

    /// Hash algorithm implied by the suite.
    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.hash_algorithm
    }

    fn hash_len(&self) -> usize {
        self.hash_algorithm.output_size()
    }

    /// Derive-Secret(Secret, Label, Messages) =
    ///     HKDF-Expand-Label(Secret, Label, Transcript-Hash(Messages), Hash.length)
    fn derive_secret(
        &self,
        provider: &dyn CryptoProvider,
        secret: &[u8],
        label: &[u8],
        transcript_hash: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>> {
        hkdf_expand_label(
            provider,
            self.hash_algorithm,
            secret,
            label,
            transcript_hash,
            self.hash_len(),
        )
        .map(Zeroizing::new)
    }

    /// Derive-Secret(secret, "derived", "") feeding the next extract.
    fn derived_salt(
        &self,
        provider: &dyn CryptoProvider,
        secret: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>> {
        let empty_hash = provider.hash(self.hash_algorithm)?.finalize();
        self.derive_secret(provider, secret, b"derived", &empty_hash)
    }

    /// Run the (EC)DHE stage and return the handshake traffic secrets.
    ///
    /// `transcript_hash` covers ClientHello..ServerHello.
    pub fn derive_handshake_secrets(
        &mut self,
        provider: &dyn CryptoProvider,
        shared_secret: &[u8],
        transcript_hash: &[u8],
    ) -> Result<TrafficSecrets> {
        let kdf = provider.kdf(self.hash_algorithm.to_kdf_algorithm())?;
        let zeros = vec![0u8; self.hash_len()];

        let early_secret = Zeroizing::new(kdf.extract(&zeros, &zeros));
        let salt = self.derived_salt(provider, &early_secret)?;
        let handshake_secret = Zeroizing::new(kdf.extract(&salt, shared_secret));

        let client = self.derive_secret(
            provider,
            &handshake_secret,
            b"c hs traffic",
            transcript_hash,
        )?;
        let server = self.derive_secret(
            provider,
            &handshake_secret,
            b"s hs traffic",
            transcript_hash,
        )?;

        self.handshake_secret = Some(handshake_secret);
        Ok(TrafficSecrets { client, server })
    }

    /// Run the master stage and return the application traffic secrets.
    ///
    /// `transcript_hash` covers ClientHello..server Finished. The handshake
    /// and master secrets are wiped before returning.
    pub fn derive_application_secrets(
        &mut self,
        provider: &dyn CryptoProvider,
        transcript_hash: &[u8],
    ) -> Result<TrafficSecrets> {
        let handshake_secret = self
            .handshake_secret
            .take()
            .ok_or_else(|| Error::InternalError("Handshake secret not initialized".into()))?;

        let kdf = provider.kdf(self.hash_algorithm.to_kdf_algorithm())?;
        let salt = self.derived_salt(provider, &handshake_secret)?;
        let zeros = vec![0u8; self.hash_len()];
        let master_secret = Zeroizing::new(kdf.extract(&salt, &zeros));

        let client =
            self.derive_secret(provider, &master_secret, b"c ap traffic", transcript_hash)?;
        let server =
            self.derive_secret(provider, &master_secret, b"s ap traffic", transcript_hash)?;
        Ok(TrafficSecrets { client, server })
    }

    /// Finished verify data (RFC 8446 Section 4.4.4).
    ///
    /// ```text
    /// finished_key = HKDF-Expand-Label(BaseKey, "finished", "", Hash.length)
    /// verify_data  = HMAC(finished_key, Transcript-Hash(Handshake Context))
    /// ```
    pub fn finished_verify_data(
        &self,
        provider: &dyn CryptoProvider,
        base_key: &[u8],
        transcript_hash: &[u8],
    ) -> Result<Vec<u8>> {
        let finished_key = Zeroizing::new(hkdf_expand_label(
            provider,
            self.hash_algorithm,
            base_key,
            b"finished",
            &[],
            self.hash_len(),
        )?);
        let mut hmac = provider.hmac(self.hash_algorithm, &finished_key)?;
        hmac.update(transcript_hash);
        Ok(hmac.finalize())
    }

    /// Check a peer's Finished in constant time.
    ///
    /// # Errors
    ///
    /// `ProtocolError(DecryptError)` on mismatch.
    pub fn verify_finished(
        &self,
        provider: &dyn CryptoProvider,
        base_key: &[u8],
        transcript_hash: &[u8],
        received: &[u8],
    ) -> Result<()> {
        let expected = self.finished_verify_data(provider, base_key, transcript_hash)?;
        if expected.len() == received.len() && bool::from(expected.ct_eq(received)) {
            Ok(())
        } else {
            Err(Error::ProtocolError(ProtocolError::DecryptError))
        }
    }

    /// Next-generation traffic secret for KeyUpdate (RFC 8446 Section 7.2).
    ///
    /// ```text
    /// application_traffic_secret_N+1 =
    ///     HKDF-Expand-Label(application_traffic_secret_N, "traffic upd", "", Hash.length)
    /// ```
    pub fn update_traffic_secret(
        provider: &dyn CryptoProvider,
        cipher_suite: CipherSuite,
        current: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>> {
        let hash = cipher_suite.hash_algorithm();
        hkdf_expand_label(provider, hash, current, b"traffic upd", &[], hash.output_size())
            .map(Zeroizing::new)
    }

    /// Wipe any retained secret.
    pub fn clear(&mut self) {
        self.handshake_secret = None;
    }
}

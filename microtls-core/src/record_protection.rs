//! TLS 1.3 Record Protection (AEAD Encryption/Decryption)
//!
//! This module implements the AEAD encryption and decryption for TLS 1.3 records
//! as specified in RFC 8446 Section 5.2.
//!
//! # TLS 1.3 AEAD Construction
//!
//! - Additional Data (AD): record header (type, version, length)
//! - Nonce: per-record nonce derived from IV and sequence number
//! - Plaintext: content + content_type + optional padding
//! - Output: encrypted_record = AEAD-Encrypt(key, nonce, plaintext, ad)
//!
//! # Nonce Construction (RFC 8446 Section 5.3)
//!
//! ```text
//! nonce = per_record_nonce XOR iv
//! where per_record_nonce = sequence_number (padded to IV length)
//! ```

use core::fmt;

use crate::cipher::CipherSuite;
use crate::error::{Error, ProtocolError, Result};
use crate::key_schedule::{KeySchedule, TrafficKeys};
use crate::protocol::{ContentType, ProtocolVersion};
use crate::record::{RecordHeader, MAX_FRAGMENT_SIZE, RECORD_HEADER_SIZE};
use microtls_crypto::{Aead, CryptoProvider};
use zeroize::Zeroizing;

/// Default record limit per key: the whole sequence space.
pub const DEFAULT_MAX_RECORDS_PER_KEY: u64 = u64::MAX;

/// Per-direction record sequence number.
///
/// A value is never handed out twice. Once the limit is reached every call
/// fails, before any nonce could repeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceNumber {
    next: u64,
    limit: u64,
}

impl SequenceNumber {
    /// Start at zero with the given record limit.
    pub const fn new(limit: u64) -> Self {
        Self { next: 0, limit }
    }

    /// Sequence number the next record will use.
    pub const fn current(&self) -> u64 {
        self.next
    }

    /// Take the next sequence number.
    ///
    /// # Errors
    ///
    /// `InternalError("sequence number exhausted")` at the limit.
    pub fn advance(&mut self) -> Result<u64> {
        let seq = self.next;
        if seq >= self.limit {
            return Err(Error::InternalError("sequence number exhausted".into()));
        }
        self.next = seq
            .checked_add(1)
            .ok_or_else(|| Error::InternalError("sequence number exhausted".into()))?;
        Ok(seq)
    }

    /// Restart at zero (new key).
    pub fn reset(&mut self) {
        self.next = 0;
    }
}

impl Default for SequenceNumber {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RECORDS_PER_KEY)
    }
}

/// XOR the big-endian sequence number into the low 8 bytes of a 12-byte IV.
pub(crate) fn xor_nonce(iv: &[u8], seq: u64) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce.copy_from_slice(&iv[..12]);
    for (n, s) in nonce[4..].iter_mut().zip(seq.to_be_bytes()) {
        *n ^= s;
    }
    nonce
}

/// Map an AEAD open failure onto the record-layer error.
pub(crate) fn open_error(e: microtls_crypto::Error) -> Error {
    match e {
        microtls_crypto::Error::AuthenticationFailed => Error::DecryptionFailed,
        other => Error::from(other),
    }
}

/// TLS 1.3 record protection for one direction (read or write).
pub struct RecordProtection {
    /// Cipher suite in use
    cipher_suite: CipherSuite,
    /// AEAD instance for the suite
    aead: Box<dyn Aead>,
    /// Key and IV in use
    keys: TrafficKeys,
    /// Application traffic secret, retained only where KeyUpdate may need it
    traffic_secret: Option<Zeroizing<Vec<u8>>>,
    /// Sequence number (incremented per record)
    sequence: SequenceNumber,
}

impl fmt::Debug for RecordProtection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordProtection")
            .field("cipher_suite", &self.cipher_suite)
            .field("sequence", &self.sequence)
            .field("updatable", &self.traffic_secret.is_some())
            .finish()
    }
}

impl RecordProtection {
    /// Protection keyed from a handshake traffic secret.
    ///
    /// The secret itself is not retained.
    pub fn new(
        provider: &dyn CryptoProvider,
        cipher_suite: CipherSuite,
        traffic_secret: &[u8],
    ) -> Result<Self> {
        Ok(Self {
            cipher_suite,
            aead: provider.aead(cipher_suite.aead_algorithm())?,
            keys: TrafficKeys::derive(provider, cipher_suite, traffic_secret)?,
            traffic_secret: None,
            sequence: SequenceNumber::default(),
        })
    }

    /// Protection keyed from an application traffic secret, which is kept
    /// so that [`RecordProtection::update_keys`] can ratchet it.
    pub fn new_application(
        provider: &dyn CryptoProvider,
        cipher_suite: CipherSuite,
        traffic_secret: Zeroizing<Vec<u8>>,
    ) -> Result<Self> {
        let mut protection = Self::new(provider, cipher_suite, &traffic_secret)?;
        protection.traffic_secret = Some(traffic_secret);
        Ok(protection)
    }

    /// Cap the number of records under this key.
    pub fn with_record_limit(mut self, limit: u64) -> Self {
        self.sequence = SequenceNumber::new(limit);
        self
    }

    /// Cipher suite in use.
    pub fn cipher_suite(&self) -> CipherSuite {
        self.cipher_suite
    }

    /// Sequence number of the next record.
    pub fn sequence_number(&self) -> u64 {
        self.sequence.current()
    }

    /// Encrypt one fragment and append the complete record to `out`.
    ///
    /// ```text
    /// TLSInnerPlaintext = content || content_type
    /// TLSCiphertext     = 0x17 0x0303 length || AEAD(inner)
    /// ```
    pub fn seal(
        &mut self,
        content_type: ContentType,
        fragment: &[u8],
        out: &mut Vec<u8>,
    ) -> Result<()> {
        if fragment.len() > MAX_FRAGMENT_SIZE {
            return Err(Error::ProtocolError(ProtocolError::RecordOverflow));
        }
        let mut inner = Zeroizing::new(Vec::with_capacity(fragment.len() + 1));
        inner.extend_from_slice(fragment);
        inner.push(content_type.to_u8());

        let length = inner.len() + self.aead.tag_size();
        let header =
            RecordHeader::encode(ContentType::ApplicationData, ProtocolVersion::Tls12, length)?;
        let seq = self.sequence.advance()?;
        let nonce = xor_nonce(&self.keys.iv, seq);
        let ciphertext = self.aead.seal(&self.keys.key, &nonce, &header, &inner)?;

        out.reserve(RECORD_HEADER_SIZE + ciphertext.len());
        out.extend_from_slice(&header);
        out.extend_from_slice(&ciphertext);
        Ok(())
    }

    /// Decrypt one record body.
    ///
    /// `header` is the 5-byte header exactly as received; it is the AAD.
    /// Returns the inner content type and the content with padding removed.
    ///
    /// # Errors
    ///
    /// - `DecryptionFailed` if authentication fails
    /// - `UnexpectedMessage` if the inner plaintext has no content type
    /// - `ProtocolError(RecordOverflow)` if the inner plaintext is too long
    pub fn open(
        &mut self,
        header: &[u8; RECORD_HEADER_SIZE],
        body: &[u8],
    ) -> Result<(ContentType, Vec<u8>)> {
        if body.len() <= self.aead.tag_size() {
            return Err(Error::DecryptionFailed);
        }
        let seq = self.sequence.advance()?;
        let nonce = xor_nonce(&self.keys.iv, seq);
        let mut inner = self
            .aead
            .open(&self.keys.key, &nonce, header, body)
            .map_err(open_error)?;

        // TLSInnerPlaintext = content || content_type || zeros*
        let type_pos = inner
            .iter()
            .rposition(|&b| b != 0)
            .ok_or_else(|| Error::UnexpectedMessage("Record has no inner content type".into()))?;
        if type_pos > MAX_FRAGMENT_SIZE {
            return Err(Error::ProtocolError(ProtocolError::RecordOverflow));
        }
        let content_type = ContentType::from_u8(inner[type_pos]).ok_or_else(|| {
            Error::UnexpectedMessage(format!("Unknown inner content type: {}", inner[type_pos]))
        })?;
        inner.truncate(type_pos);
        Ok((content_type, inner))
    }

    /// Ratchet to the next application traffic secret (KeyUpdate).
    ///
    /// Re-derives key and IV and restarts the sequence number.
    pub fn update_keys(&mut self, provider: &dyn CryptoProvider) -> Result<()> {
        let current = self
            .traffic_secret
            .as_ref()
            .ok_or_else(|| Error::InternalError("Key update before application keys".into()))?;
        let next = KeySchedule::update_traffic_secret(provider, self.cipher_suite, current)?;
        self.keys = TrafficKeys::derive(provider, self.cipher_suite, &next)?;
        self.traffic_secret = Some(next);
        self.sequence.reset();
        Ok(())
    }
}

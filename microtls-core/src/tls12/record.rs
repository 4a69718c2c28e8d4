//! TLS 1.2 Record Protection (AEAD Encryption/Decryption)
//!
//! TLS 1.2 AEAD construction differs from TLS 1.3:
//! - **Explicit nonce**: AES-GCM records carry 8 nonce bytes in the clear
//! - **No encrypted content type**: Content type is in the record header
//! - **Different AD**: Additional Data includes sequence number explicitly
//! - **Key derivation**: Uses key_block from PRF, not HKDF
//!
//! # Nonce Construction
//!
//! ```text
//! AES-GCM (RFC 5288):
//!   nonce = fixed_iv (4 bytes) || explicit_nonce (8 bytes)
//!   explicit_nonce = seq_num, sent as the first 8 bytes of the record body
//!
//! ChaCha20-Poly1305 (RFC 7905):
//!   nonce = fixed_iv (12 bytes) XOR (0x00000000 || seq_num)
//!   nothing explicit on the wire
//! ```
//!
//! # Additional Data (RFC 5246 Section 6.2.3.3)
//!
//! ```text
//! additional_data = seq_num (8 bytes) +
//!                   TLSCompressed.type (1 byte) +
//!                   TLSCompressed.version (2 bytes) +
//!                   TLSCompressed.length (2 bytes)
//! ```

use core::fmt;

use microtls_crypto::{Aead, AeadAlgorithm, CryptoProvider};
use zeroize::Zeroizing;

use crate::cipher::CipherSuite;
use crate::error::{Error, ProtocolError, Result};
use crate::protocol::{ContentType, ProtocolVersion};
use crate::record::{RecordHeader, MAX_FRAGMENT_SIZE, RECORD_HEADER_SIZE};
use crate::record_protection::{open_error, xor_nonce, SequenceNumber};

/// Explicit nonce length for AES-GCM records.
pub const EXPLICIT_NONCE_LEN: usize = 8;

/// TLS 1.2 record protection for one direction.
pub struct Tls12RecordProtection {
    /// Cipher suite in use
    cipher_suite: CipherSuite,
    /// AEAD instance for the suite
    aead: Box<dyn Aead>,
    /// AEAD key (from key_block)
    key: Zeroizing<Vec<u8>>,
    /// Fixed IV (from key_block, 4 bytes for GCM, 12 bytes for ChaCha20-Poly1305)
    fixed_iv: Zeroizing<Vec<u8>>,
    /// Sequence number (incremented per record)
    sequence: SequenceNumber,
}

impl fmt::Debug for Tls12RecordProtection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tls12RecordProtection")
            .field("cipher_suite", &self.cipher_suite)
            .field("sequence", &self.sequence)
            .finish()
    }
}

impl Tls12RecordProtection {
    /// Create record protection from one side of the key block.
    pub fn new(
        provider: &dyn CryptoProvider,
        cipher_suite: CipherSuite,
        key: &[u8],
        fixed_iv: &[u8],
    ) -> Result<Self> {
        if cipher_suite.is_tls13() {
            return Err(Error::InternalError(format!(
                "{} is not a TLS 1.2 suite",
                cipher_suite.name()
            )));
        }
        if key.len() != cipher_suite.key_length() || fixed_iv.len() != cipher_suite.iv_length() {
            return Err(Error::InternalError("TLS 1.2 key block size mismatch".into()));
        }
        Ok(Self {
            cipher_suite,
            aead: provider.aead(cipher_suite.aead_algorithm())?,
            key: Zeroizing::new(key.to_vec()),
            fixed_iv: Zeroizing::new(fixed_iv.to_vec()),
            sequence: SequenceNumber::default(),
        })
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

    fn has_explicit_nonce(&self) -> bool {
        self.cipher_suite.aead_algorithm() != AeadAlgorithm::ChaCha20Poly1305
    }

    fn nonce(&self, seq: u64, explicit: &[u8]) -> [u8; 12] {
        if self.has_explicit_nonce() {
            let mut nonce = [0u8; 12];
            nonce[..4].copy_from_slice(&self.fixed_iv);
            nonce[4..].copy_from_slice(explicit);
            nonce
        } else {
            xor_nonce(&self.fixed_iv, seq)
        }
    }

    fn additional_data(seq: u64, content_type: ContentType, length: usize) -> [u8; 13] {
        let mut ad = [0u8; 13];
        ad[..8].copy_from_slice(&seq.to_be_bytes());
        ad[8] = content_type.to_u8();
        ad[9..11].copy_from_slice(&ProtocolVersion::Tls12.to_u16().to_be_bytes());
        ad[11..].copy_from_slice(&(length as u16).to_be_bytes());
        ad
    }

    /// Encrypt one fragment and append the complete record to `out`.
    pub fn seal(
        &mut self,
        content_type: ContentType,
        fragment: &[u8],
        out: &mut Vec<u8>,
    ) -> Result<()> {
        if fragment.len() > MAX_FRAGMENT_SIZE {
            return Err(Error::ProtocolError(ProtocolError::RecordOverflow));
        }
        let explicit_len = if self.has_explicit_nonce() {
            EXPLICIT_NONCE_LEN
        } else {
            0
        };
        let length = explicit_len + fragment.len() + self.aead.tag_size();
        let header = RecordHeader::encode(content_type, ProtocolVersion::Tls12, length)?;

        let seq = self.sequence.advance()?;
        let explicit = seq.to_be_bytes();
        let nonce = self.nonce(seq, &explicit);
        let ad = Self::additional_data(seq, content_type, fragment.len());
        let ciphertext = self.aead.seal(&self.key, &nonce, &ad, fragment)?;

        out.reserve(RECORD_HEADER_SIZE + length);
        out.extend_from_slice(&header);
        out.extend_from_slice(&explicit[..explicit_len]);
        out.extend_from_slice(&ciphertext);
        Ok(())
    }

    /// Decrypt one record body of the given content type.
    ///
    /// # Errors
    ///
    /// - `DecryptionFailed` if the body is too short or fails authentication
    /// - `ProtocolError(RecordOverflow)` if the plaintext is too long
    pub fn open(&mut self, content_type: ContentType, body: &[u8]) -> Result<Vec<u8>> {
        let explicit_len = if self.has_explicit_nonce() {
            EXPLICIT_NONCE_LEN
        } else {
            0
        };
        let tag_size = self.aead.tag_size();
        if body.len() < explicit_len + tag_size {
            return Err(Error::DecryptionFailed);
        }
        let (explicit, ciphertext) = body.split_at(explicit_len);
        let plaintext_len = ciphertext.len() - tag_size;
        if plaintext_len > MAX_FRAGMENT_SIZE {
            return Err(Error::ProtocolError(ProtocolError::RecordOverflow));
        }

        let seq = self.sequence.advance()?;
        let nonce = self.nonce(seq, explicit);
        let ad = Self::additional_data(seq, content_type, plaintext_len);
        self.aead
            .open(&self.key, &nonce, &ad, ciphertext)
            .map_err(open_error)
    }
}

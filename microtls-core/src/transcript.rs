//! Handshake transcript and the TLS 1.3 labelled HKDF expansion.
//!
//! The transcript is a running record of every handshake message exchanged,
//! including the 4-byte handshake header. It is used for:
//! - Deriving TLS 1.3 handshake and application traffic secrets
//! - Computing Finished verify data (both versions)
//! - The TLS 1.2 extended master secret session hash
//!
//! The ClientHello is recorded before the cipher suite (and therefore the
//! hash) is known, so raw bytes are kept and the algorithm is bound once the
//! ServerHello has been processed.

use crate::error::{Error, Result};
use microtls_crypto::{CryptoProvider, HashAlgorithm};

/// Running handshake transcript.
#[derive(Debug, Clone, Default)]
pub struct TranscriptHash {
    /// Bound after negotiation
    algorithm: Option<HashAlgorithm>,
    /// Concatenated handshake messages
    buffer: Vec<u8>,
    /// Number of messages recorded
    count: usize,
}

impl TranscriptHash {
    /// Create an empty, unbound transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the negotiated hash algorithm.
    ///
    /// Rebinding to a different algorithm is an internal error: the suite
    /// cannot change mid-handshake.
    pub fn bind(&mut self, algorithm: HashAlgorithm) -> Result<()> {
        match self.algorithm {
            Some(bound) if bound != algorithm => Err(Error::InternalError(format!(
                "transcript already bound to {}",
                bound.name()
            ))),
            _ => {
                self.algorithm = Some(algorithm);
                Ok(())
            },
        }
    }

    /// The bound algorithm, if any.
    pub fn algorithm(&self) -> Option<HashAlgorithm> {
        self.algorithm
    }

    /// Append an encoded handshake message (header included).
    pub fn update(&mut self, message: &[u8]) {
        self.buffer.extend_from_slice(message);
        self.count += 1;
    }

    /// Hash of everything recorded so far under the bound algorithm.
    pub fn current_hash(&self, provider: &dyn CryptoProvider) -> Result<Vec<u8>> {
        let algorithm = self
            .algorithm
            .ok_or_else(|| Error::InternalError("transcript hash not bound".into()))?;
        self.hash_with(provider, algorithm)
    }

    /// Hash of everything recorded so far under an explicit algorithm.
    pub fn hash_with(
        &self,
        provider: &dyn CryptoProvider,
        algorithm: HashAlgorithm,
    ) -> Result<Vec<u8>> {
        let mut hasher = provider.hash(algorithm)?;
        hasher.update(&self.buffer);
        Ok(hasher.finalize())
    }

    /// Number of messages recorded.
    pub fn message_count(&self) -> usize {
        self.count
    }

    /// Total recorded bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Drop all recorded messages and the binding.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.count = 0;
        self.algorithm = None;
    }
}

/// Prefix applied to every TLS 1.3 HKDF label.
const LABEL_PREFIX: &[u8] = b"tls13 ";

/// HKDF-Expand-Label (RFC 8446 Section 7.1).
///
/// ```text
/// HKDF-Expand-Label(Secret, Label, Context, Length) =
///     HKDF-Expand(Secret, HkdfLabel, Length)
///
/// struct {
///     uint16 length = Length;
///     opaque label<7..255> = "tls13 " + Label;
///     opaque context<0..255> = Context;
/// } HkdfLabel;
/// ```
///
/// `label` is given without the `"tls13 "` prefix.
pub fn hkdf_expand_label(
    provider: &dyn CryptoProvider,
    algorithm: HashAlgorithm,
    secret: &[u8],
    label: &[u8],
    context: &[u8],
    length: usize,
) -> Result<Vec<u8>> {
    let full_label_len = LABEL_PREFIX.len() + label.len();
    if full_label_len > 255 || context.len() > 255 {
        return Err(Error::InternalError("HKDF label or context too long".into()));
    }
    let length_u16 = u16::try_from(length)
        .map_err(|_| Error::InternalError("HKDF output length too large".into()))?;

    let mut info = Vec::with_capacity(4 + full_label_len + context.len());
    info.extend_from_slice(&length_u16.to_be_bytes());
    info.push(full_label_len as u8);
    info.extend_from_slice(LABEL_PREFIX);
    info.extend_from_slice(label);
    info.push(context.len() as u8);
    info.extend_from_slice(context);

    let kdf = provider.kdf(algorithm.to_kdf_algorithm())?;
    Ok(kdf.expand(secret, &info, length)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use microtls_crypto_rustcrypto::RustCryptoProvider;

    #[test]
    fn test_transcript_basic() {
        let mut transcript = TranscriptHash::new();
        assert!(transcript.is_empty());
        assert_eq!(transcript.message_count(), 0);
        transcript.update(b"message1");
        transcript.update(b"message2");
        assert_eq!(transcript.message_count(), 2);
        assert_eq!(transcript.len(), 16);
    }

    #[test]
    fn test_unbound_transcript_can_still_hash_explicitly() {
        let provider = RustCryptoProvider::new();
        let mut transcript = TranscriptHash::new();
        transcript.update(b"client hello");

        assert!(transcript.current_hash(&provider).is_err());
        let sha256 = transcript.hash_with(&provider, HashAlgorithm::Sha256).unwrap();
        let sha384 = transcript.hash_with(&provider, HashAlgorithm::Sha384).unwrap();
        assert_eq!(sha256.len(), 32);
        assert_eq!(sha384.len(), 48);

        transcript.bind(HashAlgorithm::Sha384).unwrap();
        assert_eq!(transcript.current_hash(&provider).unwrap(), sha384);
    }

    #[test]
    fn test_message_boundaries_do_not_matter() {
        let provider = RustCryptoProvider::new();
        let mut split = TranscriptHash::new();
        split.update(b"abc");
        split.update(b"def");
        let mut joined = TranscriptHash::new();
        joined.update(b"abcdef");
        assert_eq!(
            split.hash_with(&provider, HashAlgorithm::Sha256).unwrap(),
            joined.hash_with(&provider, HashAlgorithm::Sha256).unwrap()
        );
    }

    #[test]
    fn test_rebind_to_other_algorithm_fails() {
        let mut transcript = TranscriptHash::new();
        transcript.bind(HashAlgorithm::Sha256).unwrap();
        transcript.bind(HashAlgorithm::Sha256).unwrap();
        assert!(transcript.bind(HashAlgorithm::Sha384).is_err());
    }

    #[test]
    fn test_empty_transcript_hash() {
        let provider = RustCryptoProvider::new();
        let mut transcript = TranscriptHash::new();
        transcript.bind(HashAlgorithm::Sha256).unwrap();
        assert_eq!(
            hex::encode(transcript.current_hash(&provider).unwrap()),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_hkdf_expand_label_rfc8448_handshake_key() {
        // RFC 8448 Section 3, server handshake write key and IV.
        let provider = RustCryptoProvider::new();
        let secret = hex::decode(
            "b67b7d690cc16c4e75e54213cb2d37b4e9c912bcded9105d42befd59d391ad38",
        )
        .unwrap();
        let key =
            hkdf_expand_label(&provider, HashAlgorithm::Sha256, &secret, b"key", &[], 16)
                .unwrap();
        let iv = hkdf_expand_label(&provider, HashAlgorithm::Sha256, &secret, b"iv", &[], 12)
            .unwrap();
        assert_eq!(hex::encode(key), "3fce516009c21727d0f2e4e86ee403bc");
        assert_eq!(hex::encode(iv), "5d313eb2671276ee13000b30");
    }

    #[test]
    fn test_hkdf_expand_label_rejects_oversized_inputs() {
        let provider = RustCryptoProvider::new();
        let secret = [0u8; 32];
        let long_label = vec![b'a'; 250];
        assert!(hkdf_expand_label(
            &provider,
            HashAlgorithm::Sha256,
            &secret,
            &long_label,
            &[],
            32
        )
        .is_err());
        assert!(hkdf_expand_label(
            &provider,
            HashAlgorithm::Sha256,
            &secret,
            b"key",
            &[],
            70000
        )
        .is_err());
    }
}

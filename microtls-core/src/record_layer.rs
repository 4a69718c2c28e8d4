//! Record framing over a [`Transport`].
//!
//! [`RecordLayer`] owns the read and write [`Protection`], frames outgoing
//! data into records and reads incoming records one at a time, applying
//! the structural checks that do not depend on handshake state:
//!
//! - declared lengths are bounded before the body is read
//! - the header version must be `0x0303` once a version is negotiated
//! - TLS 1.3 compatibility ChangeCipherSpec records are dropped on read and
//!   written in the clear
//! - under TLS 1.3 keys, every other plaintext record (alerts included) is
//!   rejected

use zeroize::Zeroize;

use microtls_crypto::CryptoProvider;

use crate::error::{Error, Result};
use crate::protocol::{ContentType, ProtocolVersion};
use crate::record::{RecordHeader, MAX_CIPHERTEXT_SIZE, MAX_FRAGMENT_SIZE, RECORD_HEADER_SIZE};
use crate::record_protection::RecordProtection;
use crate::tls12::record::Tls12RecordProtection;
use crate::transport::{recv_exact, send_all, ReadExact, Transport, TransportError};

/// Protection state for one direction.
#[derive(Debug, Default)]
pub enum Protection {
    /// No keys yet; records travel in the clear
    #[default]
    Plaintext,
    /// TLS 1.3 AEAD protection
    Tls13(RecordProtection),
    /// TLS 1.2 AEAD protection
    Tls12(Tls12RecordProtection),
}

impl Protection {
    /// Whether records are encrypted.
    pub fn is_encrypted(&self) -> bool {
        !matches!(self, Protection::Plaintext)
    }

    fn max_body_len(&self) -> usize {
        match self {
            Protection::Plaintext => MAX_FRAGMENT_SIZE,
            _ => MAX_CIPHERTEXT_SIZE,
        }
    }
}

/// One record after decryption.
#[derive(Debug)]
pub struct Record {
    /// Content type (the inner type for TLS 1.3)
    pub content_type: ContentType,
    /// Decrypted payload
    pub payload: Vec<u8>,
}

/// Record reader and writer for one connection.
#[derive(Debug)]
pub struct RecordLayer {
    read: Protection,
    write: Protection,
    version: Option<ProtocolVersion>,
    read_buf: Vec<u8>,
    write_buf: Vec<u8>,
}

impl RecordLayer {
    /// Record layer with empty buffers.
    pub fn new() -> Self {
        Self::with_buffers(Vec::new(), Vec::new())
    }

    /// Record layer that reuses caller-supplied buffers.
    pub fn with_buffers(read_buf: Vec<u8>, write_buf: Vec<u8>) -> Self {
        Self {
            read: Protection::Plaintext,
            write: Protection::Plaintext,
            version: None,
            read_buf,
            write_buf,
        }
    }

    /// Wipe and hand back the buffers.
    pub fn into_buffers(mut self) -> (Vec<u8>, Vec<u8>) {
        self.read_buf.zeroize();
        self.write_buf.zeroize();
        (
            core::mem::take(&mut self.read_buf),
            core::mem::take(&mut self.write_buf),
        )
    }

    /// Fix the negotiated version. Later records must carry `0x0303`.
    pub fn set_version(&mut self, version: ProtocolVersion) {
        self.version = Some(version);
    }

    /// Negotiated version, if any.
    pub fn version(&self) -> Option<ProtocolVersion> {
        self.version
    }

    /// Replace the read protection.
    pub fn set_read_protection(&mut self, protection: Protection) {
        tracing::debug!(encrypted = protection.is_encrypted(), "Installing read protection");
        self.read = protection;
    }

    /// Replace the write protection.
    pub fn set_write_protection(&mut self, protection: Protection) {
        tracing::debug!(encrypted = protection.is_encrypted(), "Installing write protection");
        self.write = protection;
    }

    /// Whether incoming records are encrypted.
    pub fn is_read_encrypted(&self) -> bool {
        self.read.is_encrypted()
    }

    /// Whether outgoing records are encrypted.
    pub fn is_write_encrypted(&self) -> bool {
        self.write.is_encrypted()
    }

    /// Ratchet the TLS 1.3 read keys (KeyUpdate).
    pub fn update_read_keys(&mut self, provider: &dyn CryptoProvider) -> Result<()> {
        match &mut self.read {
            Protection::Tls13(protection) => protection.update_keys(provider),
            _ => Err(Error::UnexpectedMessage("KeyUpdate outside TLS 1.3".into())),
        }
    }

    /// Ratchet the TLS 1.3 write keys (KeyUpdate).
    pub fn update_write_keys(&mut self, provider: &dyn CryptoProvider) -> Result<()> {
        match &mut self.write {
            Protection::Tls13(protection) => protection.update_keys(provider),
            _ => Err(Error::UnexpectedMessage("KeyUpdate outside TLS 1.3".into())),
        }
    }

    /// Drop both protections, wiping their keys, and the buffers' contents.
    pub fn clear(&mut self) {
        self.read = Protection::Plaintext;
        self.write = Protection::Plaintext;
        self.read_buf.zeroize();
        self.write_buf.zeroize();
    }

    fn record_version(&self) -> ProtocolVersion {
        match self.version {
            Some(_) => ProtocolVersion::Tls12,
            // Initial ClientHello (RFC 8446 Section 5.1)
            None => ProtocolVersion::Tls10,
        }
    }

    /// Write `data` as one or more records of `content_type`.
    ///
    /// Data above [`MAX_FRAGMENT_SIZE`] is split across consecutive records.
    pub fn write_record<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        content_type: ContentType,
        data: &[u8],
    ) -> Result<()> {
        let version = self.record_version();
        self.write_buf.clear();
        let mut chunks = data.chunks(MAX_FRAGMENT_SIZE).peekable();
        if chunks.peek().is_none() {
            self.seal_one(content_type, version, &[])?;
        }
        for chunk in chunks {
            self.seal_one(content_type, version, chunk)?;
        }
        tracing::trace!(?content_type, len = data.len(), "Writing record");
        let result = send_all(transport, &self.write_buf);
        self.write_buf.zeroize();
        result.map_err(Error::from)
    }

    fn seal_one(
        &mut self,
        content_type: ContentType,
        version: ProtocolVersion,
        fragment: &[u8],
    ) -> Result<()> {
        match &mut self.write {
            Protection::Plaintext => {
                let header = RecordHeader::encode(content_type, version, fragment.len())?;
                self.write_buf.extend_from_slice(&header);
                self.write_buf.extend_from_slice(fragment);
                Ok(())
            },
            // The TLS 1.3 compatibility ChangeCipherSpec is never protected
            Protection::Tls13(_) if content_type == ContentType::ChangeCipherSpec => {
                let header = RecordHeader::encode(content_type, version, fragment.len())?;
                self.write_buf.extend_from_slice(&header);
                self.write_buf.extend_from_slice(fragment);
                Ok(())
            },
            Protection::Tls13(protection) => {
                protection.seal(content_type, fragment, &mut self.write_buf)
            },
            Protection::Tls12(protection) => {
                protection.seal(content_type, fragment, &mut self.write_buf)
            },
        }
    }

    /// Read the next record the caller has to act on.
    ///
    /// TLS 1.3 compatibility ChangeCipherSpec records are consumed here.
    ///
    /// # Errors
    ///
    /// - `IoError(Closed)` if the stream ends between records
    /// - `InvalidMessage` if it ends inside a record
    /// - `UnexpectedMessage` for a bad header version or misplaced plaintext
    /// - `ProtocolError(RecordOverflow)` for an oversized record
    /// - `DecryptionFailed` if authentication fails
    pub fn read_record<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<Record> {
        loop {
            let mut header_bytes = [0u8; RECORD_HEADER_SIZE];
            match recv_exact(transport, &mut header_bytes)? {
                ReadExact::Complete => {},
                ReadExact::Eof(0) => return Err(Error::IoError(TransportError::Closed)),
                ReadExact::Eof(_) => {
                    return Err(Error::InvalidMessage("Stream ended inside record header".into()))
                },
            }
            let header = RecordHeader::parse(&header_bytes, self.read.max_body_len())?;
            self.check_version(header.version)?;

            self.read_buf.clear();
            self.read_buf.resize(header.length, 0);
            if let ReadExact::Eof(_) = recv_exact(transport, &mut self.read_buf)? {
                return Err(Error::InvalidMessage("Stream ended inside record body".into()));
            }
            tracing::trace!(
                content_type = ?header.content_type,
                len = header.length,
                "Read record"
            );

            if let Some(record) = self.open(&header_bytes, header)? {
                return Ok(record);
            }
        }
    }

    fn check_version(&self, version: u16) -> Result<()> {
        let valid = match self.version {
            Some(_) => version == ProtocolVersion::Tls12.to_u16(),
            None => (0x0301..=0x0303).contains(&version),
        };
        if valid {
            Ok(())
        } else {
            Err(Error::UnexpectedMessage(format!(
                "Record version {:#06x} not allowed",
                version
            )))
        }
    }

    /// Decrypt the body in `read_buf`. `None` means the record was dropped.
    fn open(
        &mut self,
        header_bytes: &[u8; RECORD_HEADER_SIZE],
        header: RecordHeader,
    ) -> Result<Option<Record>> {
        let content_type = header.content_type;
        if content_type == ContentType::ChangeCipherSpec
            && self.version == Some(ProtocolVersion::Tls13)
        {
            if self.read_buf.as_slice() != [1] {
                return Err(Error::UnexpectedMessage("Malformed ChangeCipherSpec".into()));
            }
            tracing::trace!("Dropping compatibility ChangeCipherSpec");
            return Ok(None);
        }

        let payload = match &mut self.read {
            Protection::Plaintext => {
                if content_type == ContentType::ApplicationData {
                    return Err(Error::UnexpectedMessage(
                        "Application data before handshake completion".into(),
                    ));
                }
                return Ok(Some(Record {
                    content_type,
                    payload: self.read_buf.clone(),
                }));
            },
            Protection::Tls13(protection) => {
                // Only the compatibility ChangeCipherSpec may arrive in the clear,
                // so an injected plaintext alert cannot end the stream early
                if content_type != ContentType::ApplicationData {
                    return Err(Error::UnexpectedMessage(format!(
                        "Plaintext {:?} record after encryption started",
                        content_type
                    )));
                }
                let (inner_type, payload) = protection.open(header_bytes, &self.read_buf)?;
                return Ok(Some(Record {
                    content_type: inner_type,
                    payload,
                }));
            },
            Protection::Tls12(protection) => protection.open(content_type, &self.read_buf)?,
        };
        Ok(Some(Record {
            content_type,
            payload,
        }))
    }
}

impl Default for RecordLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RecordLayer {
    fn drop(&mut self) {
        self.read_buf.zeroize();
        self.write_buf.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::CipherSuite;
    use crate::testing::MemoryTransport;
    use microtls_crypto_rustcrypto::RustCryptoProvider;

    const SECRET: [u8; 32] = [0x42; 32];

    fn tls13_pair(provider: &RustCryptoProvider) -> (RecordLayer, RecordLayer) {
        let suite = CipherSuite::Aes128GcmSha256;
        let mut writer = RecordLayer::new();
        writer.set_version(ProtocolVersion::Tls13);
        writer.set_write_protection(Protection::Tls13(
            RecordProtection::new(provider, suite, &SECRET).unwrap(),
        ));
        let mut reader = RecordLayer::new();
        reader.set_version(ProtocolVersion::Tls13);
        reader.set_read_protection(Protection::Tls13(
            RecordProtection::new(provider, suite, &SECRET).unwrap(),
        ));
        (writer, reader)
    }

    #[test]
    fn test_plaintext_roundtrip_and_initial_version() {
        let mut layer = RecordLayer::new();
        let mut transport = MemoryTransport::with_incoming(&[]);
        layer
            .write_record(&mut transport, ContentType::Handshake, b"hello")
            .unwrap();
        assert_eq!(&transport.outgoing[..5], &[22, 3, 1, 0, 5]);

        let mut transport = MemoryTransport::with_incoming(&transport.outgoing);
        transport.chunk = 2;
        let record = RecordLayer::new().read_record(&mut transport).unwrap();
        assert_eq!(record.content_type, ContentType::Handshake);
        assert_eq!(record.payload, b"hello");
    }

    #[test]
    fn test_large_write_is_fragmented() {
        let provider = RustCryptoProvider::new();
        let (mut writer, mut reader) = tls13_pair(&provider);
        let data = vec![0xAB; MAX_FRAGMENT_SIZE * 2 + 10];
        let mut transport = MemoryTransport::with_incoming(&[]);
        writer
            .write_record(&mut transport, ContentType::ApplicationData, &data)
            .unwrap();

        let mut transport = MemoryTransport::with_incoming(&transport.outgoing);
        let mut received = Vec::new();
        for expected in [MAX_FRAGMENT_SIZE, MAX_FRAGMENT_SIZE, 10] {
            let record = reader.read_record(&mut transport).unwrap();
            assert_eq!(record.content_type, ContentType::ApplicationData);
            assert_eq!(record.payload.len(), expected);
            received.extend(record.payload);
        }
        assert_eq!(received, data);
    }

    #[test]
    fn test_eof_handling() {
        let mut transport = MemoryTransport::with_incoming(&[]);
        let err = RecordLayer::new().read_record(&mut transport).unwrap_err();
        assert_eq!(err, Error::IoError(TransportError::Closed));

        let mut transport = MemoryTransport::with_incoming(&[22, 3, 3]);
        let err = RecordLayer::new().read_record(&mut transport).unwrap_err();
        assert!(matches!(err, Error::InvalidMessage(_)));

        let mut transport = MemoryTransport::with_incoming(&[22, 3, 3, 0, 4, 1, 2]);
        let err = RecordLayer::new().read_record(&mut transport).unwrap_err();
        assert!(matches!(err, Error::InvalidMessage(_)));
    }

    #[test]
    fn test_version_rules() {
        let mut transport = MemoryTransport::with_incoming(&[22, 3, 1, 0, 1, 0]);
        assert!(RecordLayer::new().read_record(&mut transport).is_ok());

        let mut layer = RecordLayer::new();
        layer.set_version(ProtocolVersion::Tls12);
        let mut transport = MemoryTransport::with_incoming(&[22, 3, 1, 0, 1, 0]);
        let err = layer.read_record(&mut transport).unwrap_err();
        assert!(matches!(err, Error::UnexpectedMessage(_)));

        let mut transport = MemoryTransport::with_incoming(&[22, 3, 4, 0, 1, 0]);
        let err = RecordLayer::new().read_record(&mut transport).unwrap_err();
        assert!(matches!(err, Error::UnexpectedMessage(_)));
    }

    #[test]
    fn test_length_bounds_depend_on_protection() {
        let mut oversized = vec![22, 3, 3, 0x40, 0x01];
        oversized.resize(5 + MAX_FRAGMENT_SIZE + 1, 0);
        let mut transport = MemoryTransport::with_incoming(&oversized);
        let err = RecordLayer::new().read_record(&mut transport).unwrap_err();
        assert_eq!(err, Error::ProtocolError(crate::error::ProtocolError::RecordOverflow));

        let provider = RustCryptoProvider::new();
        let (_, mut reader) = tls13_pair(&provider);
        let len = (MAX_CIPHERTEXT_SIZE + 1) as u16;
        let header = [23, 3, 3, (len >> 8) as u8, len as u8];
        let mut transport = MemoryTransport::with_incoming(&header);
        let err = reader.read_record(&mut transport).unwrap_err();
        assert_eq!(err, Error::ProtocolError(crate::error::ProtocolError::RecordOverflow));
    }

    #[test]
    fn test_tls13_change_cipher_spec_handling() {
        let provider = RustCryptoProvider::new();
        let (mut writer, mut reader) = tls13_pair(&provider);
        let mut wire = vec![20, 3, 3, 0, 1, 1];
        let mut transport = MemoryTransport::with_incoming(&[]);
        writer
            .write_record(&mut transport, ContentType::Handshake, b"finished")
            .unwrap();
        wire.extend_from_slice(&transport.outgoing);

        let mut transport = MemoryTransport::with_incoming(&wire);
        let record = reader.read_record(&mut transport).unwrap();
        assert_eq!(record.content_type, ContentType::Handshake);
        assert_eq!(record.payload, b"finished");

        let mut transport = MemoryTransport::with_incoming(&[20, 3, 3, 0, 1, 2]);
        let err = reader.read_record(&mut transport).unwrap_err();
        assert!(matches!(err, Error::UnexpectedMessage(_)));

        // Written in the clear even with keys installed
        let mut transport = MemoryTransport::default();
        writer
            .write_record(&mut transport, ContentType::ChangeCipherSpec, &[1])
            .unwrap();
        assert_eq!(transport.outgoing, [20, 3, 3, 0, 1, 1]);
    }

    #[test]
    fn test_misplaced_plaintext_rejected() {
        let mut transport = MemoryTransport::with_incoming(&[23, 3, 3, 0, 1, 0]);
        let err = RecordLayer::new().read_record(&mut transport).unwrap_err();
        assert!(matches!(err, Error::UnexpectedMessage(_)));

        let provider = RustCryptoProvider::new();
        let (_, mut reader) = tls13_pair(&provider);
        let mut transport = MemoryTransport::with_incoming(&[22, 3, 3, 0, 1, 0]);
        let err = reader.read_record(&mut transport).unwrap_err();
        assert!(matches!(err, Error::UnexpectedMessage(_)));

        let mut transport = MemoryTransport::with_incoming(&[21, 3, 3, 0, 2, 2, 40]);
        let err = reader.read_record(&mut transport).unwrap_err();
        assert!(matches!(err, Error::UnexpectedMessage(_)));
    }

    #[test]
    fn test_tampered_record_fails_authentication() {
        let provider = RustCryptoProvider::new();
        let (mut writer, mut reader) = tls13_pair(&provider);
        let mut transport = MemoryTransport::with_incoming(&[]);
        writer
            .write_record(&mut transport, ContentType::ApplicationData, b"payload")
            .unwrap();
        let mut wire = transport.outgoing.clone();
        let last = wire.len() - 1;
        wire[last] ^= 0x80;

        let mut transport = MemoryTransport::with_incoming(&wire);
        assert_eq!(reader.read_record(&mut transport).unwrap_err(), Error::DecryptionFailed);
    }

    #[test]
    fn test_tls12_protection_keeps_outer_type() {
        let provider = RustCryptoProvider::new();
        let suite = CipherSuite::Tls12EcdheRsaWithChacha20Poly1305Sha256;
        let key = vec![7u8; suite.key_length()];
        let iv = vec![9u8; suite.iv_length()];
        let mut writer = RecordLayer::new();
        writer.set_version(ProtocolVersion::Tls12);
        writer.set_write_protection(Protection::Tls12(
            Tls12RecordProtection::new(&provider, suite, &key, &iv).unwrap(),
        ));
        let mut reader = RecordLayer::new();
        reader.set_version(ProtocolVersion::Tls12);
        reader.set_read_protection(Protection::Tls12(
            Tls12RecordProtection::new(&provider, suite, &key, &iv).unwrap(),
        ));

        let mut transport = MemoryTransport::with_incoming(&[]);
        writer
            .write_record(&mut transport, ContentType::Handshake, b"verify")
            .unwrap();
        assert_eq!(transport.outgoing[0], 22);

        let mut transport = MemoryTransport::with_incoming(&transport.outgoing);
        let record = reader.read_record(&mut transport).unwrap();
        assert_eq!(record.content_type, ContentType::Handshake);
        assert_eq!(record.payload, b"verify");
    }
}

//! Record layer integration tests
//!
//! Two record layers talk through an in-memory pipe that hands out at most
//! a few bytes per read, so every record is reassembled from partial reads.

use std::collections::VecDeque;
use std::net::Ipv4Addr;

use microtls_core::cipher::CipherSuite;
use microtls_core::record::MAX_FRAGMENT_SIZE;
use microtls_core::record_layer::{Protection, RecordLayer};
use microtls_core::record_protection::RecordProtection;
use microtls_core::tls12::Tls12RecordProtection;
use microtls_core::{ContentType, Error, ProtocolVersion, Transport, TransportError};
use microtls_crypto::CryptoProvider;
use microtls_crypto_rustcrypto::RustCryptoProvider;
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

/// Byte pipe delivering at most `chunk` bytes per `recv`
struct Pipe {
    buffer: VecDeque<u8>,
    chunk: usize,
}

impl Pipe {
    fn new(chunk: usize) -> Self {
        Self {
            buffer: VecDeque::new(),
            chunk,
        }
    }
}

impl Transport for Pipe {
    fn tcp() -> Result<Self, TransportError> {
        Ok(Self::new(usize::MAX))
    }

    fn connect(&mut self, _addr: Ipv4Addr, _port: u16) -> Result<(), TransportError> {
        Ok(())
    }

    fn send(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        self.buffer.extend(data.iter().copied());
        Ok(data.len())
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let n = buf.len().min(self.chunk).min(self.buffer.len());
        for (slot, byte) in buf.iter_mut().zip(self.buffer.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn set_recv_timeout(&mut self, _timeout_ms: u32) -> Result<(), TransportError> {
        Ok(())
    }

    fn set_send_timeout(&mut self, _timeout_ms: u32) -> Result<(), TransportError> {
        Ok(())
    }

    fn close(&mut self) {}
}

/// Route engine logs to the test output, filtered by `RUST_LOG`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn tls13_pair(provider: &RustCryptoProvider, suite: CipherSuite) -> (RecordLayer, RecordLayer) {
    init_tracing();
    let secret = vec![0x42u8; suite.hash_algorithm().output_size()];
    let seal = RecordProtection::new_application(provider, suite, Zeroizing::new(secret.clone()))
        .unwrap();
    let open =
        RecordProtection::new_application(provider, suite, Zeroizing::new(secret)).unwrap();

    let mut writer = RecordLayer::new();
    let mut reader = RecordLayer::new();
    writer.set_version(ProtocolVersion::Tls13);
    reader.set_version(ProtocolVersion::Tls13);
    writer.set_write_protection(Protection::Tls13(seal));
    reader.set_read_protection(Protection::Tls13(open));
    (writer, reader)
}

fn tls12_pair(provider: &RustCryptoProvider, suite: CipherSuite) -> (RecordLayer, RecordLayer) {
    init_tracing();
    let key = vec![0x11u8; suite.key_length()];
    let iv = vec![0x22u8; suite.iv_length()];
    let seal = Tls12RecordProtection::new(provider, suite, &key, &iv).unwrap();
    let open = Tls12RecordProtection::new(provider, suite, &key, &iv).unwrap();

    let mut writer = RecordLayer::new();
    let mut reader = RecordLayer::new();
    writer.set_version(ProtocolVersion::Tls12);
    reader.set_version(ProtocolVersion::Tls12);
    writer.set_write_protection(Protection::Tls12(seal));
    reader.set_read_protection(Protection::Tls12(open));
    (writer, reader)
}

fn read_all(reader: &mut RecordLayer, pipe: &mut Pipe) -> Vec<u8> {
    let mut data = Vec::new();
    loop {
        match reader.read_record(pipe) {
            Ok(record) => {
                assert_eq!(record.content_type, ContentType::ApplicationData);
                assert!(record.payload.len() <= MAX_FRAGMENT_SIZE);
                data.extend_from_slice(&record.payload);
            },
            Err(Error::IoError(TransportError::Closed)) => return data,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
}

/// Test TLS 1.3 records through partial reads for every suite
#[test]
fn test_tls13_partial_reads() {
    let provider = RustCryptoProvider::new();
    let suites = [
        CipherSuite::Aes128GcmSha256,
        CipherSuite::Aes256GcmSha384,
        CipherSuite::ChaCha20Poly1305Sha256,
    ];
    for suite in suites {
        let (mut writer, mut reader) = tls13_pair(&provider, suite);
        let mut pipe = Pipe::new(7);
        let data: Vec<u8> = (0..40_000u32).map(|i| i as u8).collect();
        writer
            .write_record(&mut pipe, ContentType::ApplicationData, &data)
            .unwrap();
        assert_eq!(read_all(&mut reader, &mut pipe), data, "{}", suite.name());
    }
}

/// Test TLS 1.2 records through partial reads for every suite
#[test]
fn test_tls12_partial_reads() {
    let provider = RustCryptoProvider::new();
    let suites = [
        CipherSuite::Tls12EcdheEcdsaWithAes128GcmSha256,
        CipherSuite::Tls12EcdheRsaWithAes256GcmSha384,
        CipherSuite::Tls12EcdheRsaWithChacha20Poly1305Sha256,
    ];
    for suite in suites {
        let (mut writer, mut reader) = tls12_pair(&provider, suite);
        let mut pipe = Pipe::new(3);
        let data = vec![0xA5u8; 2 * MAX_FRAGMENT_SIZE + 1];
        writer
            .write_record(&mut pipe, ContentType::ApplicationData, &data)
            .unwrap();
        assert_eq!(read_all(&mut reader, &mut pipe), data, "{}", suite.name());
    }
}

/// Test that both ends ratchet together across a key update
#[test]
fn test_key_update_in_stream() {
    let provider = RustCryptoProvider::new();
    let (mut writer, mut reader) = tls13_pair(&provider, CipherSuite::Aes128GcmSha256);
    let mut pipe = Pipe::new(usize::MAX);

    writer
        .write_record(&mut pipe, ContentType::ApplicationData, b"generation 0")
        .unwrap();
    writer.update_write_keys(&provider).unwrap();
    writer
        .write_record(&mut pipe, ContentType::ApplicationData, b"generation 1")
        .unwrap();

    assert_eq!(reader.read_record(&mut pipe).unwrap().payload, b"generation 0");
    reader.update_read_keys(&provider).unwrap();
    assert_eq!(reader.read_record(&mut pipe).unwrap().payload, b"generation 1");
}

/// Test that records opened under the wrong key fail authentication
#[test]
fn test_wrong_key_fails() {
    let provider = RustCryptoProvider::new();
    let (mut writer, _) = tls13_pair(&provider, CipherSuite::Aes128GcmSha256);
    let (_, mut reader) = tls13_pair(&provider, CipherSuite::Aes128GcmSha256);
    reader.update_read_keys(&provider).unwrap();

    let mut pipe = Pipe::new(usize::MAX);
    writer
        .write_record(&mut pipe, ContentType::ApplicationData, b"secret")
        .unwrap();
    assert_eq!(reader.read_record(&mut pipe).unwrap_err(), Error::DecryptionFailed);
}

/// Test that a stream cut inside a record is malformed, not a clean close
#[test]
fn test_truncated_stream() {
    let provider = RustCryptoProvider::new();
    let (mut writer, mut reader) = tls13_pair(&provider, CipherSuite::Aes128GcmSha256);
    let mut pipe = Pipe::new(usize::MAX);
    writer
        .write_record(&mut pipe, ContentType::ApplicationData, b"cut short")
        .unwrap();
    pipe.buffer.truncate(pipe.buffer.len() - 1);
    assert!(matches!(reader.read_record(&mut pipe), Err(Error::InvalidMessage(_))));
}

/// Test that a plaintext alert spliced between protected records is rejected
#[test]
fn test_injected_plaintext_alert() {
    let provider = RustCryptoProvider::new();
    let (mut writer, mut reader) = tls13_pair(&provider, CipherSuite::Aes128GcmSha256);
    let mut pipe = Pipe::new(2);
    writer
        .write_record(&mut pipe, ContentType::ApplicationData, b"first")
        .unwrap();
    pipe.buffer.extend([21, 3, 3, 0, 2, 1, 0]);
    writer
        .write_record(&mut pipe, ContentType::ApplicationData, b"second")
        .unwrap();

    assert_eq!(reader.read_record(&mut pipe).unwrap().payload, b"first");
    assert!(matches!(reader.read_record(&mut pipe), Err(Error::UnexpectedMessage(_))));
}

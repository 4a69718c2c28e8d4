//! Blocking TLS client connection.
//!
//! [`Connection`] is the I/O driver: it reads records through the
//! [`RecordLayer`], feeds handshake messages to the [`Handshake`] state
//! machine, carries out the actions it returns and, once established,
//! moves application data.
//!
//! Every error is fatal. Before returning it the connection sends the
//! matching alert (best effort), wipes its secrets and enters
//! [`ConnectionPhase::Failed`].

use core::fmt;

use microtls_crypto::CryptoProvider;
use zeroize::Zeroize;

use crate::alert::{Alert, AlertDescription};
use crate::cipher::CipherSuite;
use crate::error::{Error, Result};
use crate::handshake::{Handshake, HandshakeAction};
use crate::handshake_io::{HandshakeMessage, HandshakeReassembler};
use crate::messages::{KeyUpdate, NewSessionTicket};
use crate::protocol::{ContentType, HandshakeType, ProtocolVersion};
use crate::record::MAX_FRAGMENT_SIZE;
use crate::record_layer::RecordLayer;
use crate::state::ConnectionPhase;
use crate::transport::Transport;
use crate::Config;

/// A TLS client connection over a borrowed transport.
///
/// # Example
///
/// ```rust,no_run
/// use microtls_core::{Config, Connection};
/// # fn example<T: microtls_core::Transport, P: microtls_core::microtls_crypto::CryptoProvider>(
/// #     transport: &mut T,
/// #     provider: &P,
/// # ) -> microtls_core::Result<()> {
/// let config = Config::builder()
///     .with_hostname("example.com")
///     .with_verify_certificate_chain(false)
///     .build()?;
/// let mut connection = Connection::new(transport, provider, config);
/// connection.handshake()?;
/// connection.send_all(b"GET / HTTP/1.0\r\n\r\n")?;
/// let mut buf = [0u8; 1024];
/// let n = connection.recv(&mut buf)?;
/// connection.close();
/// # Ok(())
/// # }
/// ```
pub struct Connection<'a, T: Transport, P: CryptoProvider> {
    transport: &'a mut T,
    provider: &'a P,
    config: Config,
    phase: ConnectionPhase,
    records: RecordLayer,
    reassembler: HandshakeReassembler,
    handshake: Handshake,
    /// Decrypted application data not yet handed to the caller
    pending: Vec<u8>,
    pending_offset: usize,
}

impl<T: Transport, P: CryptoProvider> fmt::Debug for Connection<'_, T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("phase", &self.phase)
            .field("version", &self.version())
            .field("cipher_suite", &self.cipher_suite())
            .finish_non_exhaustive()
    }
}

impl<'a, T: Transport, P: CryptoProvider> Connection<'a, T, P> {
    /// Connection that allocates its own record buffers.
    pub fn new(transport: &'a mut T, provider: &'a P, config: Config) -> Self {
        Self::with_buffers(transport, provider, config, Vec::new(), Vec::new())
    }

    /// Connection that reuses caller-supplied record buffers.
    pub fn with_buffers(
        transport: &'a mut T,
        provider: &'a P,
        config: Config,
        read_buf: Vec<u8>,
        write_buf: Vec<u8>,
    ) -> Self {
        let handshake = Handshake::new(&config);
        let reassembler = HandshakeReassembler::new(config.max_handshake_message_size);
        Self {
            transport,
            provider,
            config,
            phase: ConnectionPhase::Start,
            records: RecordLayer::with_buffers(read_buf, write_buf),
            reassembler,
            handshake,
            pending: Vec::new(),
            pending_offset: 0,
        }
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    /// Whether application data may flow.
    pub fn is_established(&self) -> bool {
        self.phase == ConnectionPhase::Established
    }

    /// Negotiated protocol version.
    pub fn version(&self) -> Option<ProtocolVersion> {
        match self.phase {
            ConnectionPhase::Established => self.handshake.version(),
            _ => None,
        }
    }

    /// Negotiated cipher suite.
    pub fn cipher_suite(&self) -> Option<CipherSuite> {
        match self.phase {
            ConnectionPhase::Established => self.handshake.cipher_suite(),
            _ => None,
        }
    }

    /// Protocol the server selected through ALPN.
    pub fn alpn_protocol(&self) -> Option<&[u8]> {
        match self.phase {
            ConnectionPhase::Established => self.handshake.alpn_protocol(),
            _ => None,
        }
    }

    /// The configuration in use.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Wipe and hand back the record buffers, leaving empty ones behind.
    pub fn take_buffers(&mut self) -> (Vec<u8>, Vec<u8>) {
        core::mem::take(&mut self.records).into_buffers()
    }

    /// Run the handshake to completion.
    ///
    /// Returns immediately if the connection is already established.
    ///
    /// # Errors
    ///
    /// - `ConnectionClosed` if the connection already closed or failed
    /// - any handshake error, after which the connection is `Failed`
    pub fn handshake(&mut self) -> Result<()> {
        match self.phase {
            ConnectionPhase::Established => return Ok(()),
            ConnectionPhase::Closed | ConnectionPhase::Failed => {
                return Err(Error::ConnectionClosed)
            },
            ConnectionPhase::Start | ConnectionPhase::Handshaking => {},
        }
        self.phase = ConnectionPhase::Handshaking;
        tracing::debug!(hostname = %self.config.hostname, "Starting handshake");

        match self.drive_handshake() {
            Ok(()) => {
                self.phase = ConnectionPhase::Established;
                tracing::info!(
                    version = ?self.handshake.version(),
                    cipher_suite = ?self.handshake.cipher_suite(),
                    "Handshake complete"
                );
                Ok(())
            },
            Err(e) => Err(self.abort(e)),
        }
    }

    fn drive_handshake(&mut self) -> Result<()> {
        self.transport.set_recv_timeout(self.config.timeout_ms)?;
        self.transport.set_send_timeout(self.config.timeout_ms)?;

        let actions = self.handshake.start(self.provider, &self.config)?;
        self.execute(actions)?;

        while !self.handshake.is_established() {
            let record = self.records.read_record(self.transport)?;
            match record.content_type {
                ContentType::Handshake => {
                    self.reassembler.push(&record.payload)?;
                    while let Some(message) = self.reassembler.next_message()? {
                        if self.handshake.is_established() {
                            self.post_handshake_message(message)?;
                            continue;
                        }
                        let actions =
                            self.handshake.handle(self.provider, &self.config, &message)?;
                        if self.records.version().is_none() {
                            if let Some(version) = self.handshake.version() {
                                self.records.set_version(version);
                            }
                        }
                        self.execute(actions)?;
                    }
                },
                ContentType::ChangeCipherSpec => {
                    if record.payload != [1] {
                        return Err(Error::UnexpectedMessage("Malformed ChangeCipherSpec".into()));
                    }
                    let actions = self.handshake.change_cipher_spec()?;
                    self.execute(actions)?;
                },
                ContentType::Alert => {
                    if self.handle_alert(&record.payload)? {
                        return Err(Error::AlertReceived(AlertDescription::CloseNotify));
                    }
                },
                ContentType::ApplicationData => {
                    return Err(Error::UnexpectedMessage(
                        "Application data before handshake completion".into(),
                    ));
                },
            }
        }
        Ok(())
    }

    fn execute(&mut self, actions: Vec<HandshakeAction>) -> Result<()> {
        let mut sent = false;
        for action in actions {
            match action {
                HandshakeAction::SendHandshake(message) => {
                    self.records
                        .write_record(self.transport, ContentType::Handshake, &message)?;
                    sent = true;
                },
                HandshakeAction::SendChangeCipherSpec => {
                    self.records
                        .write_record(self.transport, ContentType::ChangeCipherSpec, &[1])?;
                },
                HandshakeAction::InstallReadProtection(protection) => {
                    // RFC 8446 Section 5.1: no message may straddle a key change.
                    if !self.reassembler.is_empty() {
                        return Err(Error::UnexpectedMessage(
                            "Handshake message spans a key change".into(),
                        ));
                    }
                    self.records.set_read_protection(protection);
                },
                HandshakeAction::InstallWriteProtection(protection) => {
                    self.records.set_write_protection(protection);
                },
            }
        }
        if sent {
            self.handshake.flight_sent();
        }
        Ok(())
    }

    /// Returns `true` for close_notify.
    fn handle_alert(&mut self, payload: &[u8]) -> Result<bool> {
        let alert = Alert::decode(payload)?;
        if alert.is_close_notify() {
            tracing::debug!("Peer sent close_notify");
            self.phase = ConnectionPhase::Closed;
            return Ok(true);
        }
        if alert.is_fatal() {
            tracing::warn!(description = %alert.description, "Peer sent fatal alert");
            return Err(Error::AlertReceived(alert.description));
        }
        tracing::warn!(description = %alert.description, "Ignoring warning alert");
        Ok(false)
    }

    fn post_handshake_message(&mut self, message: HandshakeMessage) -> Result<()> {
        let tls13 = self.handshake.version() == Some(ProtocolVersion::Tls13);
        match message.msg_type {
            HandshakeType::NewSessionTicket if tls13 => {
                NewSessionTicket::decode(&message.body)?;
                tracing::debug!("Discarding NewSessionTicket");
                Ok(())
            },
            HandshakeType::KeyUpdate if tls13 => {
                let request = KeyUpdate::decode(&message.body)?;
                if !self.reassembler.is_empty() {
                    return Err(Error::UnexpectedMessage(
                        "Handshake message spans a key change".into(),
                    ));
                }
                self.records.update_read_keys(self.provider)?;
                tracing::debug!(?request, "Peer updated its traffic keys");
                if request == KeyUpdate::UpdateRequested {
                    let reply = HandshakeMessage::new(
                        HandshakeType::KeyUpdate,
                        KeyUpdate::UpdateNotRequested.encode(),
                    );
                    self.records.write_record(
                        self.transport,
                        ContentType::Handshake,
                        &reply.encode()?,
                    )?;
                    self.records.update_write_keys(self.provider)?;
                }
                Ok(())
            },
            other => Err(Error::UnexpectedMessage(format!(
                "{:?} after handshake completion",
                other
            ))),
        }
    }

    fn check_established(&self) -> Result<()> {
        match self.phase {
            ConnectionPhase::Established => Ok(()),
            ConnectionPhase::Closed | ConnectionPhase::Failed => Err(Error::ConnectionClosed),
            ConnectionPhase::Start | ConnectionPhase::Handshaking => Err(Error::InternalError(
                "Connection used before the handshake completed".into(),
            )),
        }
    }

    /// Send up to one record's worth of `data`, returning the count sent.
    pub fn send(&mut self, data: &[u8]) -> Result<usize> {
        self.check_established()?;
        let len = data.len().min(MAX_FRAGMENT_SIZE);
        match self
            .records
            .write_record(self.transport, ContentType::ApplicationData, &data[..len])
        {
            Ok(()) => Ok(len),
            Err(e) => Err(self.abort(e)),
        }
    }

    /// Send all of `data`.
    pub fn send_all(&mut self, data: &[u8]) -> Result<()> {
        let mut offset = 0;
        while offset < data.len() {
            offset += self.send(&data[offset..])?;
        }
        Ok(())
    }

    /// Read application data into `buf`.
    ///
    /// Returns `Ok(0)` once the peer sent close_notify. Zero-length
    /// records are skipped.
    pub fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.phase == ConnectionPhase::Closed && self.pending_offset >= self.pending.len() {
            return Ok(0);
        }
        if self.pending_offset < self.pending.len() {
            return Ok(self.drain_pending(buf));
        }
        self.check_established()?;
        if buf.is_empty() {
            return Ok(0);
        }

        match self.next_application_data() {
            Ok(true) => Ok(self.drain_pending(buf)),
            Ok(false) => Ok(0),
            Err(e) => Err(self.abort(e)),
        }
    }

    /// Fill `pending` with the next non-empty application data record.
    /// `false` means the peer closed the connection.
    fn next_application_data(&mut self) -> Result<bool> {
        loop {
            let record = self.records.read_record(self.transport)?;
            match record.content_type {
                ContentType::ApplicationData if record.payload.is_empty() => continue,
                ContentType::ApplicationData => {
                    self.pending.zeroize();
                    self.pending = record.payload;
                    self.pending_offset = 0;
                    return Ok(true);
                },
                ContentType::Handshake => {
                    self.reassembler.push(&record.payload)?;
                    while let Some(message) = self.reassembler.next_message()? {
                        self.post_handshake_message(message)?;
                    }
                },
                ContentType::Alert => {
                    if self.handle_alert(&record.payload)? {
                        self.wipe();
                        return Ok(false);
                    }
                },
                ContentType::ChangeCipherSpec => {
                    return Err(Error::UnexpectedMessage(
                        "ChangeCipherSpec after handshake completion".into(),
                    ));
                },
            }
        }
    }

    fn drain_pending(&mut self, buf: &mut [u8]) -> usize {
        let available = &self.pending[self.pending_offset..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.pending_offset += n;
        if self.pending_offset == self.pending.len() {
            self.pending.zeroize();
            self.pending_offset = 0;
        }
        n
    }

    /// Send close_notify (best effort), close the transport and enter `Closed`.
    pub fn close(&mut self) {
        if self.phase.is_terminal() {
            return;
        }
        if self.phase == ConnectionPhase::Established {
            let alert = Alert::close_notify().encode();
            if let Err(e) = self.records.write_record(self.transport, ContentType::Alert, &alert) {
                tracing::debug!(error = %e, "Failed to send close_notify");
            }
        }
        self.wipe();
        self.transport.close();
        self.phase = ConnectionPhase::Closed;
        tracing::debug!("Connection closed");
    }

    /// Send the alert for `error`, wipe state and enter `Failed`.
    fn abort(&mut self, error: Error) -> Error {
        if !self.phase.is_terminal() {
            if let Some(description) = error.alert_to_send() {
                let alert = Alert::fatal(description).encode();
                let sent = self.records.write_record(self.transport, ContentType::Alert, &alert);
                if let Err(e) = sent {
                    tracing::debug!(error = %e, "Failed to send alert");
                }
            }
            self.phase = ConnectionPhase::Failed;
        }
        tracing::warn!(error = %error, phase = %self.phase, "Connection aborted");
        self.wipe();
        error
    }

    fn wipe(&mut self) {
        self.handshake.fail();
        self.records.clear();
        self.reassembler.clear();
        self.pending.zeroize();
        self.pending_offset = 0;
    }
}

impl<T: Transport, P: CryptoProvider> Drop for Connection<'_, T, P> {
    fn drop(&mut self) {
        self.wipe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate_validator::ValidationError;
    use crate::error::ProtocolError;
    use crate::testing::{self, LoopbackTransport, MemoryTransport, TestServer};
    use crate::transport::TransportError;
    use microtls_crypto_rustcrypto::RustCryptoProvider;

    fn tls13() -> TestServer {
        TestServer::tls13(CipherSuite::Aes128GcmSha256)
    }

    fn echo<T: Transport, P: CryptoProvider>(connection: &mut Connection<'_, T, P>, data: &[u8]) {
        connection.send_all(data).unwrap();
        let mut received = Vec::new();
        let mut buf = vec![0u8; 4096];
        while received.len() < data.len() {
            let n = connection.recv(&mut buf).unwrap();
            assert!(n > 0);
            received.extend_from_slice(&buf[..n]);
        }
        assert_eq!(received, data);
    }

    #[test]
    fn test_tls13_handshake_and_echo() {
        let provider = RustCryptoProvider::new();
        let mut transport = LoopbackTransport::new(&provider, tls13());
        let peer = transport.peer();
        let mut connection = Connection::new(&mut transport, &provider, testing::config());
        assert_eq!(connection.version(), None);

        connection.handshake().unwrap();
        assert_eq!(connection.phase(), ConnectionPhase::Established);
        assert_eq!(connection.version(), Some(ProtocolVersion::Tls13));
        assert_eq!(connection.cipher_suite(), Some(CipherSuite::Aes128GcmSha256));
        echo(&mut connection, b"hello over tls 1.3");
        echo(&mut connection, &vec![0x5A; 3 * MAX_FRAGMENT_SIZE + 17]);

        // A second call is a no-op
        connection.handshake().unwrap();
        connection.close();
        assert_eq!(connection.phase(), ConnectionPhase::Closed);
        assert_eq!(connection.send(b"late"), Err(Error::ConnectionClosed));

        let peer = peer.borrow();
        assert!(peer.session.is_established());
        assert!(peer.session.peer_alert().unwrap().is_close_notify());
    }

    #[test]
    fn test_tls12_handshake_and_echo() {
        let provider = RustCryptoProvider::new();
        let server = TestServer::tls12(CipherSuite::Tls12EcdheEcdsaWithChacha20Poly1305Sha256);
        let mut transport = LoopbackTransport::new(&provider, server);
        let mut connection = Connection::new(&mut transport, &provider, testing::config());
        connection.handshake().unwrap();
        assert_eq!(connection.version(), Some(ProtocolVersion::Tls12));
        echo(&mut connection, b"hello over tls 1.2");
        echo(&mut connection, &vec![0xC3; 40_000]);
    }

    #[test]
    fn test_handshake_messages_split_across_records() {
        let provider = RustCryptoProvider::new();
        for size in [1, 37, 700] {
            let servers = [
                tls13(),
                TestServer::tls13(CipherSuite::ChaCha20Poly1305Sha256),
                TestServer::tls12(CipherSuite::Tls12EcdheEcdsaWithAes128GcmSha256),
            ];
            for server in servers {
                let suite = server.cipher_suite();
                let server = server.with_handshake_fragments(size);
                let mut transport = LoopbackTransport::new(&provider, server);
                let mut connection =
                    Connection::new(&mut transport, &provider, testing::config());
                connection.handshake().unwrap();
                assert_eq!(connection.cipher_suite(), Some(suite));
                echo(&mut connection, b"reassembled");
            }
        }

        let rsa = Config::builder()
            .with_hostname("localhost")
            .with_trust_anchor(testing::CA_RSA)
            .with_current_time(testing::NOW)
            .build()
            .unwrap();
        let server = TestServer::tls12(CipherSuite::Tls12EcdheRsaWithAes256GcmSha384)
            .with_certificate(testing::LEAF_RSA, testing::LEAF_RSA_KEY)
            .with_handshake_fragments(500);
        let mut transport = LoopbackTransport::new(&provider, server);
        let mut connection = Connection::new(&mut transport, &provider, rsa);
        connection.handshake().unwrap();
        echo(&mut connection, b"reassembled");
    }

    #[test]
    fn test_recv_returns_zero_after_close_notify() {
        let provider = RustCryptoProvider::new();
        let mut transport = LoopbackTransport::new(&provider, tls13().with_alpn(b"h2"));
        let peer = transport.peer();
        let mut config = testing::config();
        config.alpn_protocols = vec![b"h2".to_vec()];
        let mut connection = Connection::new(&mut transport, &provider, config);
        connection.handshake().unwrap();
        assert_eq!(connection.alpn_protocol(), Some(&b"h2"[..]));
        echo(&mut connection, b"ping");

        {
            let mut peer = peer.borrow_mut();
            let bye = peer.session.send_alert(Alert::close_notify()).unwrap();
            peer.inject(&bye);
        }
        let mut buf = [0u8; 16];
        assert_eq!(connection.recv(&mut buf).unwrap(), 0);
        assert_eq!(connection.phase(), ConnectionPhase::Closed);
        assert_eq!(connection.recv(&mut buf).unwrap(), 0);
        assert_eq!(connection.send(b"late"), Err(Error::ConnectionClosed));
    }

    #[test]
    fn test_plaintext_close_notify_after_handshake_rejected() {
        let provider = RustCryptoProvider::new();
        let mut transport = LoopbackTransport::new(&provider, tls13());
        let peer = transport.peer();
        let mut connection = Connection::new(&mut transport, &provider, testing::config());
        connection.handshake().unwrap();

        {
            let mut peer = peer.borrow_mut();
            let first = peer.session.send_application_data(b"first half").unwrap();
            peer.inject(&first);
            peer.inject(&[21, 3, 3, 0, 2, 1, 0]);
            let second = peer.session.send_application_data(b"second half").unwrap();
            peer.inject(&second);
        }
        let mut buf = [0u8; 32];
        let n = connection.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"first half");

        let err = connection.recv(&mut buf).unwrap_err();
        assert!(matches!(err, Error::UnexpectedMessage(_)));
        assert_eq!(connection.phase(), ConnectionPhase::Failed);
        drop(connection);

        let alert = peer.borrow().session.peer_alert().unwrap();
        assert_eq!(alert.description, AlertDescription::UnexpectedMessage);
    }

    #[test]
    fn test_post_handshake_messages() {
        let provider = RustCryptoProvider::new();
        let mut transport = LoopbackTransport::new(&provider, tls13());
        let peer = transport.peer();
        let mut connection = Connection::new(&mut transport, &provider, testing::config());
        connection.handshake().unwrap();

        {
            let mut peer = peer.borrow_mut();
            let ticket = peer.session.send_new_session_ticket().unwrap();
            peer.inject(&ticket);
            let update = peer
                .session
                .send_key_update(&provider, KeyUpdate::UpdateRequested)
                .unwrap();
            peer.inject(&update);
            let data = peer.session.send_application_data(b"after update").unwrap();
            peer.inject(&data);
        }
        let mut buf = [0u8; 64];
        let n = connection.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"after update");

        // Both directions moved to the next generation of keys
        echo(&mut connection, b"still talking");
    }

    #[test]
    fn test_unexpected_post_handshake_message() {
        let provider = RustCryptoProvider::new();
        let server = TestServer::tls12(CipherSuite::Tls12EcdheEcdsaWithAes128GcmSha256);
        let mut transport = LoopbackTransport::new(&provider, server);
        let peer = transport.peer();
        let mut connection = Connection::new(&mut transport, &provider, testing::config());
        connection.handshake().unwrap();

        {
            let mut peer = peer.borrow_mut();
            let ticket = peer.session.send_new_session_ticket().unwrap();
            peer.inject(&ticket);
        }
        let mut buf = [0u8; 16];
        let err = connection.recv(&mut buf).unwrap_err();
        assert!(matches!(err, Error::UnexpectedMessage(_)));
        assert_eq!(connection.phase(), ConnectionPhase::Failed);
        assert_eq!(connection.recv(&mut buf), Err(Error::ConnectionClosed));
        drop(connection);

        let alert = peer.borrow().session.peer_alert().unwrap();
        assert_eq!(alert.description, AlertDescription::UnexpectedMessage);
    }

    #[test]
    fn test_fatal_alert_from_peer() {
        let provider = RustCryptoProvider::new();
        let mut transport = LoopbackTransport::new(&provider, tls13());
        let peer = transport.peer();
        let mut connection = Connection::new(&mut transport, &provider, testing::config());
        connection.handshake().unwrap();

        {
            let mut peer = peer.borrow_mut();
            let alert = Alert::fatal(AlertDescription::InternalError);
            let bytes = peer.session.send_alert(alert).unwrap();
            peer.inject(&bytes);
        }
        let mut buf = [0u8; 16];
        assert_eq!(
            connection.recv(&mut buf),
            Err(Error::AlertReceived(AlertDescription::InternalError))
        );
        assert_eq!(connection.phase(), ConnectionPhase::Failed);
    }

    #[test]
    fn test_certificate_failure_sends_alert() {
        let provider = RustCryptoProvider::new();
        let server =
            tls13().with_certificate(testing::UNTRUSTED_P256, testing::UNTRUSTED_P256_KEY);
        let mut transport = LoopbackTransport::new(&provider, server);
        let peer = transport.peer();
        let mut connection = Connection::new(&mut transport, &provider, testing::config());

        let err = connection.handshake().unwrap_err();
        assert_eq!(err, Error::CertificateVerificationFailed(ValidationError::UnknownIssuer));
        assert_eq!(connection.phase(), ConnectionPhase::Failed);
        assert_eq!(connection.handshake(), Err(Error::ConnectionClosed));
        drop(connection);

        let alert = peer.borrow().session.peer_alert().unwrap();
        assert_eq!(alert.description, AlertDescription::UnknownCa);
        assert!(alert.is_fatal());
    }

    #[test]
    fn test_tampered_server_finished() {
        let provider = RustCryptoProvider::new();
        let mut transport = LoopbackTransport::new(&provider, tls13().tamper_finished());
        let mut connection = Connection::new(&mut transport, &provider, testing::config());
        let err = connection.handshake().unwrap_err();
        assert_eq!(err, Error::ProtocolError(ProtocolError::DecryptError));
    }

    #[test]
    fn test_timeout_propagates() {
        let provider = RustCryptoProvider::new();
        let mut transport = MemoryTransport::default();
        transport.timeout_on_empty = true;
        let mut connection = Connection::new(&mut transport, &provider, testing::config());
        let err = connection.handshake().unwrap_err();
        assert_eq!(err, Error::IoError(TransportError::Timeout));
        assert_eq!(connection.phase(), ConnectionPhase::Failed);
        drop(connection);

        // Only the ClientHello record: timeouts carry no alert
        let out = &transport.outgoing;
        assert_eq!(out[0], 22);
        assert_eq!(out.len(), 5 + u16::from_be_bytes([out[3], out[4]]) as usize);
    }

    #[test]
    fn test_plaintext_application_data_during_handshake() {
        let provider = RustCryptoProvider::new();
        let mut transport = MemoryTransport::with_incoming(&[23, 3, 3, 0, 2, 0xAB, 0xCD]);
        let mut connection = Connection::new(&mut transport, &provider, testing::config());
        let err = connection.handshake().unwrap_err();
        assert!(matches!(err, Error::UnexpectedMessage(_)));
        drop(connection);

        // ClientHello followed by a plaintext unexpected_message alert
        let alert = [21, 3, 1, 0, 2, 2, 10];
        assert!(transport.outgoing.ends_with(&alert));
    }

    #[test]
    fn test_use_before_handshake() {
        let provider = RustCryptoProvider::new();
        let mut transport = MemoryTransport::default();
        let mut connection = Connection::new(&mut transport, &provider, testing::config());
        assert!(matches!(connection.send(b"x"), Err(Error::InternalError(_))));
        // Misuse does not poison the connection
        assert_eq!(connection.phase(), ConnectionPhase::Start);
        connection.close();
        assert_eq!(connection.phase(), ConnectionPhase::Closed);
        drop(connection);
        assert!(transport.closed);
        assert!(transport.outgoing.is_empty());
    }

    #[test]
    fn test_pooled_buffers_are_returned_wiped() {
        let provider = RustCryptoProvider::new();
        let mut transport = LoopbackTransport::new(&provider, tls13());
        let mut connection = Connection::with_buffers(
            &mut transport,
            &provider,
            testing::config(),
            Vec::with_capacity(1024),
            Vec::with_capacity(1024),
        );
        connection.handshake().unwrap();
        echo(&mut connection, b"secret payload");
        let (read_buf, write_buf) = connection.take_buffers();
        assert!(read_buf.is_empty());
        assert!(write_buf.is_empty());
    }
}

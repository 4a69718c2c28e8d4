//! Test peers for the client engine.
//!
//! [`TestServer`] speaks just enough server-side TLS 1.3 and TLS 1.2 to
//! finish a full handshake against the client machines, with switches to
//! misbehave. [`ServerSession`] puts it behind a server-side
//! [`RecordLayer`] so it can sit at the far end of a byte stream, and
//! [`LoopbackTransport`] wires such a session straight into a
//! [`Connection`](crate::Connection) without threads.
//!
//! Only built for tests and with the `testing` feature.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::rc::Rc;

use bytes::BytesMut;
use microtls_crypto::{CryptoProvider, KeyExchangeAlgorithm, SignatureAlgorithm};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::alert::Alert;
use crate::cipher::CipherSuite;
use crate::codec::{self, Reader};
use crate::error::{Error, ProtocolError, Result};
use crate::extensions::{Extension, Extensions};
use crate::handshake::hello::EphemeralShare;
use crate::handshake::HandshakeAction;
use crate::handshake_io::{HandshakeMessage, HandshakeReassembler};
use crate::key_schedule::{KeySchedule, TrafficSecrets};
use crate::messages::{
    Certificate, CertificateVerify, ClientHello, EncryptedExtensions, Finished, KeyUpdate,
    NewSessionTicket, ServerHello,
};
use crate::protocol::{ContentType, ExtensionType, HandshakeType};
use crate::record_layer::{Protection, RecordLayer};
use crate::record_protection::RecordProtection;
use crate::signature_verify::sign_certificate_verify;
use crate::tls12::messages::{
    ClientKeyExchange, ServerHelloDone, ServerKeyExchange, Tls12Certificate,
};
use crate::tls12::{
    compute_extended_master_secret, compute_key_block, compute_master_secret,
    compute_verify_data, KeyBlock, Tls12RecordProtection,
};
use crate::transcript::TranscriptHash;
use crate::transport::{Transport, TransportError};
use crate::x509::{KeyAlgorithm, X509Certificate};
use crate::Config;

/// P-256 test CA.
pub const CA_P256: &[u8] = include_bytes!("../tests/data/ca_p256.der");
/// RSA-2048 test CA.
pub const CA_RSA: &[u8] = include_bytes!("../tests/data/ca_rsa.der");
/// `localhost` leaf under [`CA_P256`].
pub const LEAF_P256: &[u8] = include_bytes!("../tests/data/leaf_p256.der");
/// Private scalar of [`LEAF_P256`].
pub const LEAF_P256_KEY: &[u8] = include_bytes!("../tests/data/leaf_p256.key");
/// `localhost` leaf under [`CA_RSA`].
pub const LEAF_RSA: &[u8] = include_bytes!("../tests/data/leaf_rsa.der");
/// PKCS#8 key of [`LEAF_RSA`].
pub const LEAF_RSA_KEY: &[u8] = include_bytes!("../tests/data/leaf_rsa.pk8");
/// Leaf under [`CA_P256`] whose validity ended before [`NOW`]. Shares [`LEAF_P256_KEY`].
pub const EXPIRED_P256: &[u8] = include_bytes!("../tests/data/expired_p256.der");
/// Self-signed `localhost` certificate no anchor vouches for.
pub const UNTRUSTED_P256: &[u8] = include_bytes!("../tests/data/untrusted_p256.der");
/// Private scalar of [`UNTRUSTED_P256`].
pub const UNTRUSTED_P256_KEY: &[u8] = include_bytes!("../tests/data/untrusted_p256.key");

/// 2025-06-01, inside the test leaves' validity window.
pub const NOW: u64 = 1_748_736_000;

/// Client configuration trusting the P-256 test CA.
pub fn config() -> Config {
    Config::builder()
        .with_hostname("localhost")
        .with_trust_anchor(CA_P256)
        .with_current_time(NOW)
        .build()
        .unwrap()
}

/// Handshake messages among `actions`, as the server would read them.
pub fn sent_messages(actions: Vec<HandshakeAction>) -> Vec<HandshakeMessage> {
    actions
        .into_iter()
        .filter_map(|action| match action {
            HandshakeAction::SendHandshake(bytes) => {
                Some(HandshakeMessage::decode(&bytes).unwrap())
            },
            _ => None,
        })
        .collect()
}

/// What the server sends back.
#[derive(Debug)]
pub enum ServerRecord {
    /// A handshake message
    Handshake(HandshakeMessage),
    /// A TLS 1.2 ChangeCipherSpec
    ChangeCipherSpec,
}

/// Sans-I/O server handshake.
#[derive(Debug)]
pub struct TestServer {
    suite: CipherSuite,
    group: KeyExchangeAlgorithm,
    chain: Vec<Vec<u8>>,
    signing_key: Vec<u8>,
    alpn: Option<Vec<u8>>,
    extended_master_secret: bool,
    tamper_signature: bool,
    tamper_finished: bool,
    fragment_size: Option<usize>,

    transcript: TranscriptHash,
    client_random: [u8; 32],
    server_random: [u8; 32],
    share: Option<EphemeralShare>,
    key_schedule: Option<KeySchedule>,
    handshake_secrets: Option<TrafficSecrets>,
    application_secrets: Option<TrafficSecrets>,
    master_secret: Option<Zeroizing<Vec<u8>>>,
    key_block: Option<KeyBlock>,
    /// Transcript hash the client Finished covers
    finished_hash: Vec<u8>,
    client_finished_verified: bool,
}

impl TestServer {
    fn new(suite: CipherSuite) -> Self {
        Self {
            suite,
            group: KeyExchangeAlgorithm::X25519,
            chain: vec![LEAF_P256.to_vec(), CA_P256.to_vec()],
            signing_key: LEAF_P256_KEY.to_vec(),
            alpn: None,
            extended_master_secret: true,
            tamper_signature: false,
            tamper_finished: false,
            fragment_size: None,
            transcript: TranscriptHash::new(),
            client_random: [0; 32],
            server_random: [0; 32],
            share: None,
            key_schedule: None,
            handshake_secrets: None,
            application_secrets: None,
            master_secret: None,
            key_block: None,
            finished_hash: Vec::new(),
            client_finished_verified: false,
        }
    }

    /// TLS 1.3 server choosing `suite`, with the P-256 leaf and CA.
    pub fn tls13(suite: CipherSuite) -> Self {
        assert!(suite.is_tls13());
        Self::new(suite)
    }

    /// TLS 1.2 server choosing `suite`, with the P-256 leaf and CA.
    ///
    /// ECDHE-RSA suites need [`TestServer::with_certificate`] with the RSA leaf.
    pub fn tls12(suite: CipherSuite) -> Self {
        assert!(!suite.is_tls13());
        Self::new(suite)
    }

    /// Present `leaf` alone, signing with `key`.
    pub fn with_certificate(mut self, leaf: &[u8], key: &[u8]) -> Self {
        self.chain = vec![leaf.to_vec()];
        self.signing_key = key.to_vec();
        self
    }

    /// Key exchange group to pick from the client's offer.
    pub fn with_group(mut self, group: KeyExchangeAlgorithm) -> Self {
        self.group = group;
        self
    }

    /// Select `protocol` through ALPN.
    pub fn with_alpn(mut self, protocol: &[u8]) -> Self {
        self.alpn = Some(protocol.to_vec());
        self
    }

    /// Do not echo extended_master_secret (TLS 1.2).
    pub fn without_extended_master_secret(mut self) -> Self {
        self.extended_master_secret = false;
        self
    }

    /// Corrupt the CertificateVerify or ServerKeyExchange signature.
    pub fn tamper_signature(mut self) -> Self {
        self.tamper_signature = true;
        self
    }

    /// Corrupt the server Finished.
    pub fn tamper_finished(mut self) -> Self {
        self.tamper_finished = true;
        self
    }

    /// Write each flight's handshake messages back to back, cut into
    /// records of at most `size` bytes regardless of message boundaries.
    pub fn with_handshake_fragments(mut self, size: usize) -> Self {
        assert!(size > 0);
        self.fragment_size = Some(size);
        self
    }

    /// Suite this server selects.
    pub fn cipher_suite(&self) -> CipherSuite {
        self.suite
    }

    /// Whether the client's Finished matched.
    pub fn client_finished_verified(&self) -> bool {
        self.client_finished_verified
    }

    /// Process the client's messages and return the server's replies.
    pub fn respond(
        &mut self,
        provider: &dyn CryptoProvider,
        messages: &[HandshakeMessage],
    ) -> Result<Vec<ServerRecord>> {
        let mut out = Vec::new();
        for message in messages {
            match message.msg_type {
                HandshakeType::ClientHello if self.suite.is_tls13() => {
                    out.extend(self.tls13_flight(provider, message)?)
                },
                HandshakeType::ClientHello => out.extend(self.tls12_flight(provider, message)?),
                HandshakeType::ClientKeyExchange => self.client_key_exchange(provider, message)?,
                HandshakeType::Finished => out.extend(self.client_finished(provider, message)?),
                other => return Err(Error::UnexpectedMessage(format!("{:?}", other))),
            }
        }
        Ok(out)
    }

    fn record(&mut self, msg_type: HandshakeType, body: Vec<u8>) -> Result<ServerRecord> {
        let message = HandshakeMessage::new(msg_type, body);
        self.transcript.update(&message.encode()?);
        Ok(ServerRecord::Handshake(message))
    }

    fn scheme(&self, tls13: bool) -> Result<SignatureAlgorithm> {
        let leaf = X509Certificate::parse(&self.chain[0])?;
        Ok(match leaf.public_key.algorithm {
            KeyAlgorithm::EcdsaP384 => SignatureAlgorithm::EcdsaSecp384r1Sha384,
            KeyAlgorithm::Rsa if tls13 => SignatureAlgorithm::RsaPssRsaeSha256,
            KeyAlgorithm::Rsa => SignatureAlgorithm::RsaPkcs1Sha256,
            _ => SignatureAlgorithm::EcdsaSecp256r1Sha256,
        })
    }

    fn receive_client_hello(
        &mut self,
        provider: &dyn CryptoProvider,
        message: &HandshakeMessage,
    ) -> Result<ClientHello> {
        let client_hello = ClientHello::decode(&message.body)?;
        self.transcript.bind(self.suite.hash_algorithm())?;
        self.transcript.update(&message.encode()?);
        self.client_random = client_hello.random;
        provider.random().fill(&mut self.server_random)?;
        Ok(client_hello)
    }

    fn tls13_flight(
        &mut self,
        provider: &dyn CryptoProvider,
        message: &HandshakeMessage,
    ) -> Result<Vec<ServerRecord>> {
        let client_hello = self.receive_client_hello(provider, message)?;
        let client_share = client_key_share(&client_hello, self.group.to_u16())?;
        let share = EphemeralShare::generate(provider, self.group)?;
        let shared_secret = share.agree(provider, &client_share)?;

        let mut key_share = BytesMut::new();
        bytes::BufMut::put_u16(&mut key_share, self.group.to_u16());
        codec::put_vec_u16(&mut key_share, &share.public)?;
        let mut extensions = Extensions::new();
        extensions.add(Extension::new(ExtensionType::SupportedVersions, vec![3, 4]));
        extensions.add(Extension::new(ExtensionType::KeyShare, key_share.to_vec()));
        let server_hello = ServerHello::new(self.server_random, self.suite.to_u16())
            .with_session_id_echo(client_hello.legacy_session_id.clone())
            .with_extensions(extensions);

        let mut out = vec![self.record(HandshakeType::ServerHello, server_hello.encode()?)?];
        let mut key_schedule = KeySchedule::new(self.suite)?;
        let transcript_hash = self.transcript.current_hash(provider)?;
        let secrets = key_schedule.derive_handshake_secrets(
            provider,
            shared_secret.as_bytes(),
            &transcript_hash,
        )?;

        let mut encrypted = Extensions::new();
        if let Some(protocol) = &self.alpn {
            encrypted.add(alpn_extension(protocol)?);
        }
        let body = EncryptedExtensions::new(encrypted).encode()?;
        out.push(self.record(HandshakeType::EncryptedExtensions, body)?);

        let body = Certificate::new(self.chain.clone()).encode()?;
        out.push(self.record(HandshakeType::Certificate, body)?);

        let transcript_hash = self.transcript.current_hash(provider)?;
        let mut certificate_verify = sign_certificate_verify(
            provider,
            self.scheme(true)?,
            &self.signing_key,
            &transcript_hash,
        )?;
        if self.tamper_signature {
            flip_last(&mut certificate_verify.signature);
        }
        out.push(self.record(HandshakeType::CertificateVerify, certificate_verify.encode()?)?);

        let transcript_hash = self.transcript.current_hash(provider)?;
        let mut verify_data =
            key_schedule.finished_verify_data(provider, &secrets.server, &transcript_hash)?;
        if self.tamper_finished {
            flip_last(&mut verify_data);
        }
        out.push(self.record(HandshakeType::Finished, verify_data)?);

        self.finished_hash = self.transcript.current_hash(provider)?;
        self.application_secrets =
            Some(key_schedule.derive_application_secrets(provider, &self.finished_hash)?);
        self.key_schedule = Some(key_schedule);
        self.handshake_secrets = Some(secrets);
        Ok(out)
    }

    fn tls12_flight(
        &mut self,
        provider: &dyn CryptoProvider,
        message: &HandshakeMessage,
    ) -> Result<Vec<ServerRecord>> {
        let client_hello = self.receive_client_hello(provider, message)?;

        let mut extensions = Extensions::new();
        extensions.add(Extension::new(ExtensionType::RenegotiationInfo, vec![0]));
        if self.extended_master_secret {
            extensions.add(Extension::new(ExtensionType::ExtendedMasterSecret, Vec::new()));
        }
        if let Some(protocol) = &self.alpn {
            extensions.add(alpn_extension(protocol)?);
        }
        let server_hello = ServerHello::new(self.server_random, self.suite.to_u16())
            .with_session_id_echo(client_hello.legacy_session_id.clone())
            .with_extensions(extensions);

        let mut out = vec![self.record(HandshakeType::ServerHello, server_hello.encode()?)?];
        let body = Tls12Certificate::new(self.chain.clone()).encode()?;
        out.push(self.record(HandshakeType::Certificate, body)?);

        let share = EphemeralShare::generate(provider, self.group)?;
        let scheme = self.scheme(false)?;
        let mut server_key_exchange = ServerKeyExchange {
            named_curve: self.group.to_u16(),
            public_key: share.public.clone(),
            signed: CertificateVerify::new(scheme, Vec::new()),
        };
        let signed = server_key_exchange.signed_message(&self.client_random, &self.server_random)?;
        let mut signature = provider.signature(scheme)?.sign(&self.signing_key, &signed)?;
        if self.tamper_signature {
            flip_last(&mut signature);
        }
        server_key_exchange.signed.signature = signature;
        out.push(self.record(HandshakeType::ServerKeyExchange, server_key_exchange.encode()?)?);
        out.push(self.record(HandshakeType::ServerHelloDone, ServerHelloDone.encode())?);

        self.share = Some(share);
        Ok(out)
    }

    fn client_key_exchange(
        &mut self,
        provider: &dyn CryptoProvider,
        message: &HandshakeMessage,
    ) -> Result<()> {
        let client_key_exchange = ClientKeyExchange::decode(&message.body)?;
        self.transcript.update(&message.encode()?);
        let share = self
            .share
            .take()
            .ok_or_else(|| Error::UnexpectedMessage("ClientKeyExchange".into()))?;
        let premaster_secret = share.agree(provider, &client_key_exchange.public_key)?;

        let hash = self.suite.hash_algorithm();
        self.finished_hash = self.transcript.current_hash(provider)?;
        let master_secret = if self.extended_master_secret {
            compute_extended_master_secret(
                provider,
                hash,
                premaster_secret.as_bytes(),
                &self.finished_hash,
            )?
        } else {
            compute_master_secret(
                provider,
                hash,
                premaster_secret.as_bytes(),
                &self.client_random,
                &self.server_random,
            )?
        };
        self.key_block = Some(compute_key_block(
            provider,
            self.suite,
            &master_secret,
            &self.server_random,
            &self.client_random,
        )?);
        self.master_secret = Some(master_secret);
        Ok(())
    }

    fn client_finished(
        &mut self,
        provider: &dyn CryptoProvider,
        message: &HandshakeMessage,
    ) -> Result<Vec<ServerRecord>> {
        let hash = self.suite.hash_algorithm();
        if self.suite.is_tls13() {
            let (Some(key_schedule), Some(secrets)) = (&self.key_schedule, &self.handshake_secrets)
            else {
                return Err(Error::UnexpectedMessage("Finished before ServerHello".into()));
            };
            let expected =
                key_schedule.finished_verify_data(provider, &secrets.client, &self.finished_hash)?;
            self.client_finished_verified = bool::from(expected.ct_eq(&message.body));
            return Ok(Vec::new());
        }

        let master_secret = self
            .master_secret
            .clone()
            .ok_or_else(|| Error::UnexpectedMessage("Finished before ClientKeyExchange".into()))?;
        let expected = compute_verify_data(
            provider,
            hash,
            &master_secret,
            b"client finished",
            &self.finished_hash,
        )?;
        self.client_finished_verified = bool::from(expected.ct_eq(&message.body));
        self.transcript.update(&message.encode()?);

        let transcript_hash = self.transcript.current_hash(provider)?;
        let mut verify_data = compute_verify_data(
            provider,
            hash,
            &master_secret,
            b"server finished",
            &transcript_hash,
        )?;
        if self.tamper_finished {
            flip_last(&mut verify_data);
        }
        Ok(vec![
            ServerRecord::ChangeCipherSpec,
            self.record(HandshakeType::Finished, Finished::new(verify_data).encode())?,
        ])
    }
}

fn flip_last(bytes: &mut [u8]) {
    if let Some(last) = bytes.last_mut() {
        *last ^= 0x01;
    }
}

fn alpn_extension(protocol: &[u8]) -> Result<Extension> {
    let mut list = BytesMut::new();
    codec::put_vec_u8(&mut list, protocol)?;
    let mut body = BytesMut::new();
    codec::put_vec_u16(&mut body, &list)?;
    Ok(Extension::new(
        ExtensionType::ApplicationLayerProtocolNegotiation,
        body.to_vec(),
    ))
}

/// The client's key share for `group`.
fn client_key_share(client_hello: &ClientHello, group: u16) -> Result<Vec<u8>> {
    let ext = client_hello
        .extensions
        .get(ExtensionType::KeyShare)
        .ok_or_else(|| Error::InvalidMessage("no key_share".into()))?;
    let mut r = Reader::new(&ext.data, "key_share");
    let mut entries = r.sub_u16()?;
    while !entries.is_empty() {
        let entry_group = entries.u16()?;
        let key = entries.vec_u16()?;
        if entry_group == group {
            return Ok(key.to_vec());
        }
    }
    Err(Error::InvalidMessage("no share for the server's group".into()))
}

/// A [`TestServer`] behind a server-side record layer.
///
/// Bytes from the client go in through [`ServerSession::feed`]; whatever
/// the server answers comes back out. After the handshake, application
/// data is echoed. A failure is answered with the matching fatal alert and
/// kept for inspection.
#[derive(Debug)]
pub struct ServerSession {
    server: TestServer,
    records: RecordLayer,
    reassembler: HandshakeReassembler,
    inbox: Vec<u8>,
    /// Handshake bytes held back for fragmented writing
    unflushed: Vec<u8>,
    established: bool,
    closed: bool,
    received: Vec<u8>,
    peer_alert: Option<Alert>,
    failure: Option<Error>,
}

impl ServerSession {
    /// Session around `server`.
    pub fn new(server: TestServer) -> Self {
        Self {
            server,
            records: RecordLayer::new(),
            reassembler: HandshakeReassembler::default(),
            inbox: Vec::new(),
            unflushed: Vec::new(),
            established: false,
            closed: false,
            received: Vec::new(),
            peer_alert: None,
            failure: None,
        }
    }

    /// Whether the server saw and accepted the client Finished.
    pub fn is_established(&self) -> bool {
        self.established
    }

    /// Whether the session ended, gracefully or not.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// All application data received so far.
    pub fn received(&self) -> &[u8] {
        &self.received
    }

    /// Last alert the client sent.
    pub fn peer_alert(&self) -> Option<Alert> {
        self.peer_alert
    }

    /// Error that ended the session on the server side.
    pub fn failure(&self) -> Option<&Error> {
        self.failure.as_ref()
    }

    /// The wrapped handshake.
    pub fn server(&self) -> &TestServer {
        &self.server
    }

    /// Consume client bytes and return the server's answer.
    pub fn feed(&mut self, provider: &dyn CryptoProvider, bytes: &[u8]) -> Vec<u8> {
        let mut out = MemoryTransport::default();
        if self.closed {
            return Vec::new();
        }
        self.inbox.extend_from_slice(bytes);
        if let Err(e) = self.process(provider, &mut out) {
            if let Some(description) = e.alert_to_send() {
                let alert = Alert::fatal(description).encode();
                let _ = self.records.write_record(&mut out, ContentType::Alert, &alert);
            }
            self.failure = Some(e);
            self.closed = true;
        }
        out.outgoing
    }

    /// Application data from the server.
    pub fn send_application_data(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        self.write(ContentType::ApplicationData, data)
    }

    /// An alert from the server. Ends the session.
    pub fn send_alert(&mut self, alert: Alert) -> Result<Vec<u8>> {
        self.closed = true;
        self.write(ContentType::Alert, &alert.encode())
    }

    /// A NewSessionTicket the client is expected to discard.
    pub fn send_new_session_ticket(&mut self) -> Result<Vec<u8>> {
        let ticket = NewSessionTicket {
            ticket_lifetime: 7200,
            ticket_age_add: 0x0102_0304,
            ticket_nonce: vec![0],
            ticket: vec![0xAA; 32],
            extensions: Extensions::new(),
        };
        let message = HandshakeMessage::new(HandshakeType::NewSessionTicket, ticket.encode()?);
        self.write(ContentType::Handshake, &message.encode()?)
    }

    /// A KeyUpdate, after which the server writes under the next key.
    pub fn send_key_update(
        &mut self,
        provider: &dyn CryptoProvider,
        request: KeyUpdate,
    ) -> Result<Vec<u8>> {
        let message = HandshakeMessage::new(HandshakeType::KeyUpdate, request.encode());
        let out = self.write(ContentType::Handshake, &message.encode()?)?;
        self.records.update_write_keys(provider)?;
        Ok(out)
    }

    fn write(&mut self, content_type: ContentType, data: &[u8]) -> Result<Vec<u8>> {
        let mut out = MemoryTransport::default();
        self.records.write_record(&mut out, content_type, data)?;
        Ok(out.outgoing)
    }

    fn process(&mut self, provider: &dyn CryptoProvider, out: &mut MemoryTransport) -> Result<()> {
        let mut end = 0;
        while self.inbox.len() >= end + 5 {
            let length = u16::from_be_bytes([self.inbox[end + 3], self.inbox[end + 4]]) as usize;
            if self.inbox.len() < end + 5 + length {
                break;
            }
            end += 5 + length;
        }
        let mut input = MemoryTransport::with_incoming(&self.inbox[..end]);
        self.inbox.drain(..end);

        while !input.incoming.is_empty() && !self.closed {
            let record = match self.records.read_record(&mut input) {
                Ok(record) => record,
                // A trailing compatibility ChangeCipherSpec was dropped
                Err(Error::IoError(TransportError::Closed)) => break,
                Err(e) => return Err(e),
            };
            match record.content_type {
                ContentType::Handshake => {
                    self.reassembler.push(&record.payload)?;
                    while let Some(message) = self.reassembler.next_message()? {
                        self.handshake_message(provider, message, out)?;
                    }
                },
                ContentType::ChangeCipherSpec => {
                    let key_block = self.server.key_block.as_ref().ok_or_else(|| {
                        Error::UnexpectedMessage("ChangeCipherSpec before key exchange".into())
                    })?;
                    let protection = Tls12RecordProtection::new(
                        provider,
                        self.server.suite,
                        &key_block.client_key,
                        &key_block.client_iv,
                    )?;
                    self.records.set_read_protection(Protection::Tls12(protection));
                },
                ContentType::Alert => {
                    let alert = Alert::decode(&record.payload)?;
                    self.peer_alert = Some(alert);
                    if alert.is_close_notify() {
                        let reply = Alert::close_notify().encode();
                        self.records.write_record(out, ContentType::Alert, &reply)?;
                    }
                    self.closed = true;
                },
                ContentType::ApplicationData => {
                    self.received.extend_from_slice(&record.payload);
                    self.records.write_record(out, ContentType::ApplicationData, &record.payload)?;
                },
            }
        }
        Ok(())
    }

    fn handshake_message(
        &mut self,
        provider: &dyn CryptoProvider,
        message: HandshakeMessage,
        out: &mut MemoryTransport,
    ) -> Result<()> {
        let suite = self.server.suite;
        if message.msg_type == HandshakeType::KeyUpdate {
            KeyUpdate::decode(&message.body)?;
            return self.records.update_read_keys(provider);
        }

        let replies = self.server.respond(provider, std::slice::from_ref(&message))?;
        match message.msg_type {
            HandshakeType::ClientHello => {
                self.records.set_version(suite.version());
                let mut replies = replies.into_iter();
                if let Some(server_hello) = replies.next() {
                    self.write_reply(out, server_hello)?;
                }
                if self.server.handshake_secrets.is_some() {
                    self.flush(out)?;
                }
                if let Some(secrets) = &self.server.handshake_secrets {
                    let write = RecordProtection::new(provider, suite, &secrets.server)?;
                    let read = RecordProtection::new(provider, suite, &secrets.client)?;
                    self.records.set_write_protection(Protection::Tls13(write));
                    self.records.set_read_protection(Protection::Tls13(read));
                }
                for reply in replies {
                    self.write_reply(out, reply)?;
                }
            },
            HandshakeType::Finished => {
                if !self.server.client_finished_verified {
                    return Err(Error::ProtocolError(ProtocolError::DecryptError));
                }
                if let Some(secrets) = &self.server.application_secrets {
                    let read = RecordProtection::new_application(
                        provider,
                        suite,
                        secrets.client.clone(),
                    )?;
                    let write = RecordProtection::new_application(
                        provider,
                        suite,
                        secrets.server.clone(),
                    )?;
                    self.records.set_read_protection(Protection::Tls13(read));
                    self.records.set_write_protection(Protection::Tls13(write));
                }
                for reply in replies {
                    if let (ServerRecord::Handshake(_), Some(key_block)) =
                        (&reply, &self.server.key_block)
                    {
                        let write = Tls12RecordProtection::new(
                            provider,
                            suite,
                            &key_block.server_key,
                            &key_block.server_iv,
                        )?;
                        self.records.set_write_protection(Protection::Tls12(write));
                    }
                    self.write_reply(out, reply)?;
                }
                self.established = true;
            },
            _ => {
                for reply in replies {
                    self.write_reply(out, reply)?;
                }
            },
        }
        self.flush(out)
    }

    fn write_reply(&mut self, out: &mut MemoryTransport, reply: ServerRecord) -> Result<()> {
        match reply {
            ServerRecord::Handshake(message) if self.server.fragment_size.is_some() => {
                self.unflushed.extend_from_slice(&message.encode()?);
                Ok(())
            },
            ServerRecord::Handshake(message) => {
                self.records.write_record(out, ContentType::Handshake, &message.encode()?)
            },
            ServerRecord::ChangeCipherSpec => {
                self.flush(out)?;
                self.records.write_record(out, ContentType::ChangeCipherSpec, &[1])
            },
        }
    }

    /// Write held-back handshake bytes under the current write protection.
    fn flush(&mut self, out: &mut MemoryTransport) -> Result<()> {
        let size = match self.server.fragment_size {
            Some(size) if !self.unflushed.is_empty() => size,
            _ => return Ok(()),
        };
        let bytes = std::mem::take(&mut self.unflushed);
        for chunk in bytes.chunks(size) {
            self.records.write_record(out, ContentType::Handshake, chunk)?;
        }
        Ok(())
    }
}

/// In-memory transport: reads come from `incoming` in chunks of at most
/// `chunk` bytes, writes accumulate in `outgoing`.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    /// Bytes still to be read
    pub incoming: VecDeque<u8>,
    /// Everything written so far
    pub outgoing: Vec<u8>,
    /// Largest single read or write; `0` means unlimited
    pub chunk: usize,
    /// Fail reads with `Timeout` instead of reporting EOF once drained
    pub timeout_on_empty: bool,
    /// Set by `close`
    pub closed: bool,
}

impl MemoryTransport {
    /// Transport that will read `data`.
    pub fn with_incoming(data: &[u8]) -> Self {
        Self {
            incoming: data.iter().copied().collect(),
            ..Self::default()
        }
    }

    fn limit(&self, len: usize) -> usize {
        match self.chunk {
            0 => len,
            chunk => len.min(chunk),
        }
    }
}

impl Transport for MemoryTransport {
    fn tcp() -> core::result::Result<Self, TransportError> {
        Ok(Self::default())
    }

    fn connect(&mut self, _addr: Ipv4Addr, _port: u16) -> core::result::Result<(), TransportError> {
        Ok(())
    }

    fn send(&mut self, data: &[u8]) -> core::result::Result<usize, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let n = self.limit(data.len());
        self.outgoing.extend_from_slice(&data[..n]);
        Ok(n)
    }

    fn recv(&mut self, buf: &mut [u8]) -> core::result::Result<usize, TransportError> {
        if self.incoming.is_empty() && self.timeout_on_empty {
            return Err(TransportError::Timeout);
        }
        let n = self.limit(buf.len()).min(self.incoming.len());
        for (slot, byte) in buf.iter_mut().zip(self.incoming.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn set_recv_timeout(&mut self, _timeout_ms: u32) -> core::result::Result<(), TransportError> {
        Ok(())
    }

    fn set_send_timeout(&mut self, _timeout_ms: u32) -> core::result::Result<(), TransportError> {
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

/// Far end of a [`LoopbackTransport`], shared with the test.
#[derive(Debug)]
pub struct Loopback {
    /// The server
    pub session: ServerSession,
    incoming: VecDeque<u8>,
}

impl Loopback {
    /// Queue bytes for the client, e.g. from [`ServerSession::send_alert`].
    pub fn inject(&mut self, bytes: &[u8]) {
        self.incoming.extend(bytes.iter().copied());
    }
}

/// Transport whose far end is a [`ServerSession`] driven inline.
///
/// Every `send` is fed to the session at once and its answer queued for
/// `recv`. Reading past the answer fails with `Timeout`, unless the
/// session has closed, in which case it reports EOF. The test keeps a
/// [`LoopbackTransport::peer`] handle to script the server while a
/// connection borrows the transport.
#[derive(Debug)]
pub struct LoopbackTransport<'p, P: CryptoProvider> {
    peer: Rc<RefCell<Loopback>>,
    provider: &'p P,
    closed: bool,
}

impl<'p, P: CryptoProvider> LoopbackTransport<'p, P> {
    /// Loopback to `server`, using `provider` on the server side.
    pub fn new(provider: &'p P, server: TestServer) -> Self {
        Self {
            peer: Rc::new(RefCell::new(Loopback {
                session: ServerSession::new(server),
                incoming: VecDeque::new(),
            })),
            provider,
            closed: false,
        }
    }

    /// Shared handle on the server end.
    pub fn peer(&self) -> Rc<RefCell<Loopback>> {
        Rc::clone(&self.peer)
    }
}

impl<P: CryptoProvider> Transport for LoopbackTransport<'_, P> {
    fn tcp() -> core::result::Result<Self, TransportError> {
        Err(TransportError::ConnectionFailed)
    }

    fn connect(&mut self, _addr: Ipv4Addr, _port: u16) -> core::result::Result<(), TransportError> {
        Ok(())
    }

    fn send(&mut self, data: &[u8]) -> core::result::Result<usize, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let mut peer = self.peer.borrow_mut();
        let answer = peer.session.feed(self.provider, data);
        peer.incoming.extend(answer);
        Ok(data.len())
    }

    fn recv(&mut self, buf: &mut [u8]) -> core::result::Result<usize, TransportError> {
        let mut peer = self.peer.borrow_mut();
        if peer.incoming.is_empty() {
            return if peer.session.is_closed() {
                Ok(0)
            } else {
                Err(TransportError::Timeout)
            };
        }
        let n = buf.len().min(peer.incoming.len());
        for (slot, byte) in buf.iter_mut().zip(peer.incoming.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn set_recv_timeout(&mut self, _timeout_ms: u32) -> core::result::Result<(), TransportError> {
        Ok(())
    }

    fn set_send_timeout(&mut self, _timeout_ms: u32) -> core::result::Result<(), TransportError> {
        Ok(())
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

//! TLS 1.3 client handshake state machine (RFC 8446, full handshake).
//!
//! ## State Transitions
//! ```text
//! Start
//!   | send ClientHello
//! SentClientHello
//!   | flight written
//! WaitServerHello
//!   | recv ServerHello, derive handshake keys
//! WaitEncryptedExtensions
//!   | recv EncryptedExtensions
//! WaitCertificateOrFinished
//!   | recv Certificate
//! WaitCertificateVerify
//!   | recv CertificateVerify
//! WaitServerFinished
//!   | recv Finished, derive application keys
//!   | send [ChangeCipherSpec], Finished
//! SentClientFinished
//!   | flight written
//! Established
//! ```
//!
//! Any error moves the machine to `Failed`; the connection wipes it.

use microtls_crypto::CryptoProvider;

use crate::cipher::CipherSuite;
use crate::error::{Error, ProtocolError, Result};
use crate::handshake::hello::{ClientOffer, Negotiated};
use crate::handshake::HandshakeAction;
use crate::handshake_io::HandshakeMessage;
use crate::key_schedule::{KeySchedule, TrafficSecrets};
use crate::messages::{
    Certificate, CertificateVerify, EncryptedExtensions, Finished, ServerHello,
};
use crate::protocol::HandshakeType;
use crate::record_layer::Protection;
use crate::record_protection::RecordProtection;
use crate::signature_verify::verify_certificate_verify;
use crate::x509::SubjectPublicKey;
use crate::Config;

/// Client handshake state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Nothing sent yet
    Start,
    /// ClientHello produced, not yet written
    SentClientHello,
    /// Waiting for ServerHello
    WaitServerHello,
    /// Waiting for EncryptedExtensions
    WaitEncryptedExtensions,
    /// Waiting for Certificate (a bare Finished is rejected)
    WaitCertificateOrFinished,
    /// Waiting for CertificateVerify
    WaitCertificateVerify,
    /// Waiting for server Finished
    WaitServerFinished,
    /// Client Finished produced, not yet written
    SentClientFinished,
    /// Handshake complete
    Established,
    /// Handshake aborted
    Failed,
}

/// TLS 1.3 client handshake.
#[derive(Debug)]
pub struct ClientHandshake {
    /// Current state
    state: ClientState,
    /// ClientHello commitments and the transcript
    offer: Option<ClientOffer>,
    /// Negotiated suite
    cipher_suite: Option<CipherSuite>,
    /// Key schedule, from ServerHello to server Finished
    key_schedule: Option<KeySchedule>,
    /// Handshake traffic secrets, kept for the two Finished messages
    handshake_secrets: Option<TrafficSecrets>,
    /// Leaf certificate key for CertificateVerify
    server_key: Option<SubjectPublicKey>,
    /// Negotiated ALPN protocol
    alpn_protocol: Option<Vec<u8>>,
}

impl Default for ClientHandshake {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientHandshake {
    /// Create a new client handshake.
    pub fn new() -> Self {
        Self {
            state: ClientState::Start,
            offer: None,
            cipher_suite: None,
            key_schedule: None,
            handshake_secrets: None,
            server_key: None,
            alpn_protocol: None,
        }
    }

    /// Get the current state.
    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Check if the handshake is complete.
    pub fn is_established(&self) -> bool {
        self.state == ClientState::Established
    }

    /// Get the negotiated cipher suite.
    pub fn cipher_suite(&self) -> Option<CipherSuite> {
        self.cipher_suite
    }

    /// Get the negotiated ALPN protocol.
    pub fn alpn_protocol(&self) -> Option<&[u8]> {
        self.alpn_protocol.as_deref()
    }

    /// The ClientHello commitments, until the handshake completes.
    pub fn offer(&self) -> Option<&ClientOffer> {
        self.offer.as_ref()
    }

    /// Hand the offer over to the TLS 1.2 machine.
    pub fn take_offer(&mut self) -> Result<ClientOffer> {
        self.expect_state(ClientState::WaitServerHello, "ServerHello")?;
        self.offer
            .take()
            .ok_or_else(|| Error::InternalError("ClientHello offer missing".into()))
    }

    fn expect_state(&self, expected: ClientState, what: &str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(Error::UnexpectedMessage(format!(
                "{} received in unexpected state: {:?}",
                what, self.state
            )))
        }
    }

    fn offer_mut(&mut self) -> Result<&mut ClientOffer> {
        self.offer
            .as_mut()
            .ok_or_else(|| Error::InternalError("ClientHello offer missing".into()))
    }

    fn suite(&self) -> Result<CipherSuite> {
        self.cipher_suite
            .ok_or_else(|| Error::InternalError("Cipher suite not negotiated".into()))
    }

    fn set_state(&mut self, state: ClientState) {
        tracing::debug!("TLS 1.3 client: {:?} -> {:?}", self.state, state);
        self.state = state;
    }

    /// Build the ClientHello.
    pub fn start(
        &mut self,
        provider: &dyn CryptoProvider,
        config: &Config,
    ) -> Result<Vec<HandshakeAction>> {
        self.expect_state(ClientState::Start, "start")?;
        let (offer, client_hello) = ClientOffer::new(provider, config)?;
        self.offer = Some(offer);
        self.set_state(ClientState::SentClientHello);
        Ok(vec![HandshakeAction::SendHandshake(client_hello)])
    }

    /// The connection wrote the pending flight.
    pub fn flight_sent(&mut self) {
        match self.state {
            ClientState::SentClientHello => self.set_state(ClientState::WaitServerHello),
            ClientState::SentClientFinished => self.set_state(ClientState::Established),
            _ => {},
        }
    }

    /// Process a ServerHello already checked against the offer.
    ///
    /// Agrees on the ECDHE secret, derives the handshake traffic secrets and
    /// installs server handshake read protection.
    pub fn process_server_hello(
        &mut self,
        provider: &dyn CryptoProvider,
        config: &Config,
        server_hello: &ServerHello,
        negotiated: Negotiated,
        raw: &[u8],
    ) -> Result<Vec<HandshakeAction>> {
        self.expect_state(ClientState::WaitServerHello, "ServerHello")?;
        let suite = negotiated.cipher_suite;
        let offer = self.offer_mut()?;

        let entry = server_hello.extensions.get_key_share_server()?.ok_or_else(|| {
            tracing::warn!("TLS 1.3 ServerHello without key_share");
            Error::ProtocolError(ProtocolError::IllegalParameter)
        })?;
        let share = offer.share_for(entry.group).ok_or_else(|| {
            tracing::warn!("Server key share for group 0x{:04x} was not offered", entry.group);
            Error::ProtocolError(ProtocolError::IllegalParameter)
        })?;
        let shared_secret = share.agree(provider, &entry.key_exchange)?;

        offer.transcript.bind(suite.hash_algorithm())?;
        offer.transcript.update(raw);
        let transcript_hash = offer.transcript.current_hash(provider)?;

        let mut key_schedule = KeySchedule::new(suite)?;
        let secrets = key_schedule.derive_handshake_secrets(
            provider,
            shared_secret.as_bytes(),
            &transcript_hash,
        )?;
        // The ephemeral keys are spent.
        offer.shares.clear();

        let limit = config.max_records_per_key;
        let read =
            RecordProtection::new(provider, suite, &secrets.server)?.with_record_limit(limit);
        // Alerts sent from here on are protected (RFC 8446 Section 6)
        let write =
            RecordProtection::new(provider, suite, &secrets.client)?.with_record_limit(limit);

        self.cipher_suite = Some(suite);
        self.key_schedule = Some(key_schedule);
        self.handshake_secrets = Some(secrets);
        self.set_state(ClientState::WaitEncryptedExtensions);
        Ok(vec![
            HandshakeAction::InstallReadProtection(Protection::Tls13(read)),
            HandshakeAction::InstallWriteProtection(Protection::Tls13(write)),
        ])
    }

    /// Process a server message after ServerHello.
    pub fn handle_message(
        &mut self,
        provider: &dyn CryptoProvider,
        config: &Config,
        message: &HandshakeMessage,
    ) -> Result<Vec<HandshakeAction>> {
        let raw = message.encode()?;
        match (self.state, message.msg_type) {
            (ClientState::WaitEncryptedExtensions, HandshakeType::EncryptedExtensions) => {
                self.process_encrypted_extensions(&message.body, &raw)
            },
            (ClientState::WaitCertificateOrFinished, HandshakeType::Certificate) => {
                self.process_certificate(provider, config, &message.body, &raw)
            },
            (ClientState::WaitCertificateOrFinished, HandshakeType::CertificateRequest) => Err(
                Error::UnsupportedFeature("Client certificates are not supported".into()),
            ),
            (ClientState::WaitCertificateOrFinished, HandshakeType::Finished) => {
                tracing::warn!("Server skipped certificate authentication");
                Err(Error::UnexpectedMessage(
                    "Finished received without server Certificate".into(),
                ))
            },
            (ClientState::WaitCertificateVerify, HandshakeType::CertificateVerify) => {
                self.process_certificate_verify(provider, config, &message.body, &raw)
            },
            (ClientState::WaitServerFinished, HandshakeType::Finished) => {
                self.process_finished(provider, config, &message.body, &raw)
            },
            (state, msg_type) => Err(Error::UnexpectedMessage(format!(
                "{:?} received in unexpected state: {:?}",
                msg_type, state
            ))),
        }
    }

    fn process_encrypted_extensions(
        &mut self,
        body: &[u8],
        raw: &[u8],
    ) -> Result<Vec<HandshakeAction>> {
        let encrypted_extensions = EncryptedExtensions::decode(body)?;
        let offer = self.offer_mut()?;
        let extensions = &encrypted_extensions.extensions;
        extensions.check_allowed(&offer.extensions.allowed_in_encrypted_extensions())?;

        let alpn = extensions.get_alpn_selected()?;
        if let Some(protocol) = &alpn {
            if !offer.extensions.alpn_protocols.contains(protocol) {
                tracing::warn!("Server selected an ALPN protocol that was not offered");
                return Err(Error::ProtocolError(ProtocolError::IllegalParameter));
            }
        }
        offer.transcript.update(raw);

        if let Some(protocol) = &alpn {
            tracing::info!("ALPN: {}", String::from_utf8_lossy(protocol));
        }
        self.alpn_protocol = alpn;
        self.set_state(ClientState::WaitCertificateOrFinished);
        Ok(Vec::new())
    }

    fn process_certificate(
        &mut self,
        provider: &dyn CryptoProvider,
        config: &Config,
        body: &[u8],
        raw: &[u8],
    ) -> Result<Vec<HandshakeAction>> {
        let certificate = Certificate::decode(body)?;
        if !certificate.certificate_request_context.is_empty() {
            return Err(Error::ProtocolError(ProtocolError::IllegalParameter));
        }

        let leaf = config.validator().verify_server(
            provider,
            &certificate.chain(),
            &config.hostname,
            &config.validation_policy(),
        )?;
        tracing::debug!(
            "Server certificate accepted: {} certificate(s), subject {:?}",
            certificate.certificate_list.len(),
            leaf.subject_cn
        );

        self.offer_mut()?.transcript.update(raw);
        self.server_key = Some(leaf.public_key);
        self.set_state(ClientState::WaitCertificateVerify);
        Ok(Vec::new())
    }

    fn process_certificate_verify(
        &mut self,
        provider: &dyn CryptoProvider,
        config: &Config,
        body: &[u8],
        raw: &[u8],
    ) -> Result<Vec<HandshakeAction>> {
        let certificate_verify = CertificateVerify::decode(body)?;
        let key = self
            .server_key
            .as_ref()
            .ok_or_else(|| Error::InternalError("Server key missing".into()))?;
        let offer = self
            .offer
            .as_mut()
            .ok_or_else(|| Error::InternalError("ClientHello offer missing".into()))?;

        // Signed over ClientHello..Certificate
        let transcript_hash = offer.transcript.current_hash(provider)?;
        verify_certificate_verify(
            provider,
            &certificate_verify,
            &config.signature_algorithms,
            key,
            &transcript_hash,
        )?;
        offer.transcript.update(raw);

        self.set_state(ClientState::WaitServerFinished);
        Ok(Vec::new())
    }

    fn process_finished(
        &mut self,
        provider: &dyn CryptoProvider,
        config: &Config,
        body: &[u8],
        raw: &[u8],
    ) -> Result<Vec<HandshakeAction>> {
        let suite = self.suite()?;
        let finished = Finished::decode(body, suite.hash_algorithm().output_size())?;

        let mut key_schedule = self
            .key_schedule
            .take()
            .ok_or_else(|| Error::InternalError("Key schedule missing".into()))?;
        let secrets = self
            .handshake_secrets
            .take()
            .ok_or_else(|| Error::InternalError("Handshake secrets missing".into()))?;
        let mut offer = self
            .offer
            .take()
            .ok_or_else(|| Error::InternalError("ClientHello offer missing".into()))?;

        let transcript_hash = offer.transcript.current_hash(provider)?;
        key_schedule
            .verify_finished(provider, &secrets.server, &transcript_hash, &finished.verify_data)
            .map_err(|e| {
                tracing::warn!("Server Finished verification failed");
                e
            })?;
        offer.transcript.update(raw);

        // Application secrets and the client Finished both cover
        // ClientHello..server Finished.
        let transcript_hash = offer.transcript.current_hash(provider)?;
        let TrafficSecrets { client, server } =
            key_schedule.derive_application_secrets(provider, &transcript_hash)?;
        let verify_data =
            key_schedule.finished_verify_data(provider, &secrets.client, &transcript_hash)?;
        let client_finished =
            HandshakeMessage::new(HandshakeType::Finished, Finished::new(verify_data).encode())
                .encode()?;

        let limit = config.max_records_per_key;
        let application_read =
            RecordProtection::new_application(provider, suite, server)?.with_record_limit(limit);
        let application_write =
            RecordProtection::new_application(provider, suite, client)?.with_record_limit(limit);

        key_schedule.clear();
        drop(secrets);
        drop(offer);

        self.set_state(ClientState::SentClientFinished);
        Ok(vec![
            HandshakeAction::InstallReadProtection(Protection::Tls13(application_read)),
            HandshakeAction::SendChangeCipherSpec,
            HandshakeAction::SendHandshake(client_finished),
            HandshakeAction::InstallWriteProtection(Protection::Tls13(application_write)),
        ])
    }

    /// Wipe every secret and enter `Failed`.
    pub fn fail(&mut self) {
        if let Some(mut key_schedule) = self.key_schedule.take() {
            key_schedule.clear();
        }
        self.handshake_secrets = None;
        self.offer = None;
        self.server_key = None;
        self.set_state(ClientState::Failed);
    }
}

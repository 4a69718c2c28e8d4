//! TLS 1.2 Client Handshake State Machine
//!
//! Implements the client-side ECDHE handshake per RFC 5246, RFC 8422 and
//! RFC 7627 (extended master secret).
//!
//! ## State Transitions
//! ```text
//! Start
//!   | send ClientHello
//! SentClientHello
//!   | flight written
//! WaitServerHello
//!   | recv ServerHello
//! WaitCertificate
//!   | recv Certificate
//! WaitServerKeyExchange
//!   | recv ServerKeyExchange (ECDHE only)
//! WaitServerHelloDone
//!   | recv ServerHelloDone: ClientKeyExchange, ChangeCipherSpec,
//!   | install client write keys, Finished (one flight)
//! SentFinished
//!   | flight written
//! WaitServerChangeCipherSpec
//!   | recv ChangeCipherSpec, install server read keys
//! WaitServerFinished
//!   | recv Finished
//! Established
//! ```

use microtls_crypto::{CryptoProvider, KeyExchangeAlgorithm};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::cipher::CipherSuite;
use crate::error::{Error, ProtocolError, Result};
use crate::handshake::hello::{ClientOffer, EphemeralShare, Negotiated};
use crate::handshake::HandshakeAction;
use crate::handshake_io::HandshakeMessage;
use crate::messages::{Finished, ServerHello};
use crate::protocol::HandshakeType;
use crate::record_layer::Protection;
use crate::signature_verify::verify_server_key_exchange;
use crate::tls12::messages::{
    ClientKeyExchange, ServerHelloDone, ServerKeyExchange, Tls12Certificate,
};
use crate::tls12::prf::{KeyBlock, VERIFY_DATA_LEN};
use crate::tls12::record::Tls12RecordProtection;
use crate::tls12::{
    compute_extended_master_secret, compute_key_block, compute_master_secret,
    compute_verify_data,
};
use crate::x509::{KeyAlgorithm, SubjectPublicKey};
use crate::Config;

/// TLS 1.2 client handshake state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tls12ClientState {
    /// Nothing sent yet
    Start,
    /// ClientHello produced, not yet written
    SentClientHello,
    /// Waiting for ServerHello
    WaitServerHello,
    /// Waiting for Certificate
    WaitCertificate,
    /// Waiting for ServerKeyExchange (ECDHE)
    WaitServerKeyExchange,
    /// Waiting for ServerHelloDone
    WaitServerHelloDone,
    /// ClientKeyExchange through Finished produced, not yet written
    SentFinished,
    /// Waiting for ChangeCipherSpec
    WaitServerChangeCipherSpec,
    /// Waiting for Finished
    WaitServerFinished,
    /// Handshake complete
    Established,
    /// Handshake aborted
    Failed,
}

/// TLS 1.2 client handshake context.
#[derive(Debug)]
pub struct Tls12ClientHandshake {
    /// Current state
    state: Tls12ClientState,
    /// ClientHello commitments and the transcript
    offer: Option<ClientOffer>,
    /// Selected cipher suite
    cipher_suite: Option<CipherSuite>,
    /// Server random (32 bytes)
    server_random: [u8; 32],
    /// Whether the server agreed to RFC 7627
    extended_master_secret: bool,
    /// Leaf certificate key
    server_key: Option<SubjectPublicKey>,
    /// Server's ephemeral ECDHE key (from ServerKeyExchange)
    server_share: Option<(KeyExchangeAlgorithm, Vec<u8>)>,
    /// Master secret, until the server Finished is checked
    master_secret: Option<Zeroizing<Vec<u8>>>,
    /// Server write protection, installed on ChangeCipherSpec
    pending_read: Option<Tls12RecordProtection>,
    /// Negotiated ALPN protocol
    alpn_protocol: Option<Vec<u8>>,
}

impl Default for Tls12ClientHandshake {
    fn default() -> Self {
        Self::new()
    }
}

impl Tls12ClientHandshake {
    /// Create a new TLS 1.2 client handshake.
    pub fn new() -> Self {
        Self {
            state: Tls12ClientState::Start,
            offer: None,
            cipher_suite: None,
            server_random: [0u8; 32],
            extended_master_secret: false,
            server_key: None,
            server_share: None,
            master_secret: None,
            pending_read: None,
            alpn_protocol: None,
        }
    }

    /// Continue from a ClientHello sent by the TLS 1.3 machine.
    pub fn from_offer(mut offer: ClientOffer) -> Self {
        // TLS 1.3 key shares are never used here.
        offer.shares.clear();
        Self {
            state: Tls12ClientState::WaitServerHello,
            offer: Some(offer),
            ..Self::new()
        }
    }

    /// Get the current state.
    pub fn state(&self) -> Tls12ClientState {
        self.state
    }

    /// Check if the handshake is complete.
    pub fn is_established(&self) -> bool {
        self.state == Tls12ClientState::Established
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

    fn expect_state(&self, expected: Tls12ClientState, what: &str) -> Result<()> {
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

    fn set_state(&mut self, state: Tls12ClientState) {
        tracing::debug!("TLS 1.2 client: {:?} -> {:?}", self.state, state);
        self.state = state;
    }

    /// Build the ClientHello.
    pub fn start(
        &mut self,
        provider: &dyn CryptoProvider,
        config: &Config,
    ) -> Result<Vec<HandshakeAction>> {
        self.expect_state(Tls12ClientState::Start, "start")?;
        let (offer, client_hello) = ClientOffer::new(provider, config)?;
        self.offer = Some(offer);
        self.set_state(Tls12ClientState::SentClientHello);
        Ok(vec![HandshakeAction::SendHandshake(client_hello)])
    }

    /// The connection wrote the pending flight.
    pub fn flight_sent(&mut self) {
        match self.state {
            Tls12ClientState::SentClientHello => self.set_state(Tls12ClientState::WaitServerHello),
            Tls12ClientState::SentFinished => {
                self.set_state(Tls12ClientState::WaitServerChangeCipherSpec)
            },
            _ => {},
        }
    }

    /// Process a ServerHello already checked against the offer.
    pub fn process_server_hello(
        &mut self,
        _provider: &dyn CryptoProvider,
        _config: &Config,
        server_hello: &ServerHello,
        negotiated: Negotiated,
        raw: &[u8],
    ) -> Result<Vec<HandshakeAction>> {
        self.expect_state(Tls12ClientState::WaitServerHello, "ServerHello")?;
        let suite = negotiated.cipher_suite;
        let extensions = &server_hello.extensions;
        extensions.check_renegotiation_info()?;

        let offer = self.offer_mut()?;
        let alpn = extensions.get_alpn_selected()?;
        if let Some(protocol) = &alpn {
            if !offer.extensions.alpn_protocols.contains(protocol) {
                tracing::warn!("Server selected an ALPN protocol that was not offered");
                return Err(Error::ProtocolError(ProtocolError::IllegalParameter));
            }
            tracing::info!("ALPN: {}", String::from_utf8_lossy(protocol));
        }
        offer.transcript.bind(suite.hash_algorithm())?;
        offer.transcript.update(raw);

        self.extended_master_secret = extensions.has_extended_master_secret();
        if !self.extended_master_secret {
            tracing::debug!("Server did not negotiate extended_master_secret");
        }
        self.server_random = server_hello.random;
        self.cipher_suite = Some(suite);
        self.alpn_protocol = alpn;
        self.set_state(Tls12ClientState::WaitCertificate);
        Ok(Vec::new())
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
            (Tls12ClientState::WaitCertificate, HandshakeType::Certificate) => {
                self.process_certificate(provider, config, &message.body, &raw)
            },
            (Tls12ClientState::WaitServerKeyExchange, HandshakeType::ServerKeyExchange) => {
                self.process_server_key_exchange(provider, config, &message.body, &raw)
            },
            (Tls12ClientState::WaitServerHelloDone, HandshakeType::CertificateRequest) => Err(
                Error::UnsupportedFeature("Client certificates are not supported".into()),
            ),
            (Tls12ClientState::WaitServerHelloDone, HandshakeType::ServerHelloDone) => {
                self.process_server_hello_done(provider, config, &message.body, &raw)
            },
            (Tls12ClientState::WaitServerFinished, HandshakeType::Finished) => {
                self.process_finished(provider, &message.body)
            },
            (state, msg_type) => Err(Error::UnexpectedMessage(format!(
                "{:?} received in unexpected state: {:?}",
                msg_type, state
            ))),
        }
    }

    fn process_certificate(
        &mut self,
        provider: &dyn CryptoProvider,
        config: &Config,
        body: &[u8],
        raw: &[u8],
    ) -> Result<Vec<HandshakeAction>> {
        let suite = self.suite()?;
        let certificate = Tls12Certificate::decode(body)?;
        let leaf = config.validator().verify_server(
            provider,
            &certificate.chain(),
            &config.hostname,
            &config.validation_policy(),
        )?;

        let key_matches_suite = match leaf.public_key.algorithm {
            KeyAlgorithm::EcdsaP256 | KeyAlgorithm::EcdsaP384 => suite.is_ecdsa(),
            KeyAlgorithm::Rsa => !suite.is_ecdsa(),
            KeyAlgorithm::Ed25519 => false,
        };
        if !key_matches_suite {
            tracing::warn!(
                "{:?} certificate cannot authenticate {}",
                leaf.public_key.algorithm,
                suite.name()
            );
            return Err(Error::ProtocolError(ProtocolError::UnsupportedCertificate));
        }

        self.offer_mut()?.transcript.update(raw);
        self.server_key = Some(leaf.public_key);
        self.set_state(Tls12ClientState::WaitServerKeyExchange);
        Ok(Vec::new())
    }

    fn process_server_key_exchange(
        &mut self,
        provider: &dyn CryptoProvider,
        config: &Config,
        body: &[u8],
        raw: &[u8],
    ) -> Result<Vec<HandshakeAction>> {
        let server_key_exchange = ServerKeyExchange::decode(body)?;
        let group = KeyExchangeAlgorithm::from_u16(server_key_exchange.named_curve)
            .filter(|g| config.groups.contains(g))
            .ok_or_else(|| {
                tracing::warn!(
                    "ServerKeyExchange uses group 0x{:04x}, which was not offered",
                    server_key_exchange.named_curve
                );
                Error::ProtocolError(ProtocolError::IllegalParameter)
            })?;

        let key = self
            .server_key
            .as_ref()
            .ok_or_else(|| Error::InternalError("Server key missing".into()))?;
        let offer = self
            .offer
            .as_mut()
            .ok_or_else(|| Error::InternalError("ClientHello offer missing".into()))?;
        verify_server_key_exchange(
            provider,
            &server_key_exchange,
            &config.signature_algorithms,
            key,
            &offer.random,
            &self.server_random,
        )?;
        offer.transcript.update(raw);

        self.server_share = Some((group, server_key_exchange.public_key));
        self.set_state(Tls12ClientState::WaitServerHelloDone);
        Ok(Vec::new())
    }

    /// Answer ServerHelloDone with ClientKeyExchange, ChangeCipherSpec and
    /// the encrypted Finished.
    fn process_server_hello_done(
        &mut self,
        provider: &dyn CryptoProvider,
        config: &Config,
        body: &[u8],
        raw: &[u8],
    ) -> Result<Vec<HandshakeAction>> {
        ServerHelloDone::decode(body)?;
        let suite = self.suite()?;
        let hash = suite.hash_algorithm();
        let (group, server_public) = self
            .server_share
            .take()
            .ok_or_else(|| Error::InternalError("ServerKeyExchange missing".into()))?;
        let server_random = self.server_random;
        let extended_master_secret = self.extended_master_secret;
        let offer = self.offer_mut()?;
        offer.transcript.update(raw);

        let share = EphemeralShare::generate(provider, group)?;
        let premaster_secret = share.agree(provider, &server_public)?;
        let client_key_exchange = HandshakeMessage::new(
            HandshakeType::ClientKeyExchange,
            ClientKeyExchange::new(share.public.clone()).encode()?,
        )
        .encode()?;
        offer.transcript.update(&client_key_exchange);

        // Both the session hash and the client Finished cover ClientHello..ClientKeyExchange.
        let transcript_hash = offer.transcript.current_hash(provider)?;
        let master_secret = if extended_master_secret {
            compute_extended_master_secret(
                provider,
                hash,
                premaster_secret.as_bytes(),
                &transcript_hash,
            )?
        } else {
            compute_master_secret(
                provider,
                hash,
                premaster_secret.as_bytes(),
                &offer.random,
                &server_random,
            )?
        };
        let key_block =
            compute_key_block(provider, suite, &master_secret, &server_random, &offer.random)?;

        let verify_data = compute_verify_data(
            provider,
            hash,
            &master_secret,
            b"client finished",
            &transcript_hash,
        )?;
        let client_finished =
            HandshakeMessage::new(HandshakeType::Finished, Finished::new(verify_data).encode())
                .encode()?;
        offer.transcript.update(&client_finished);

        let limit = config.max_records_per_key;
        let KeyBlock {
            client_key,
            server_key,
            client_iv,
            server_iv,
        } = &key_block;
        let write = Tls12RecordProtection::new(provider, suite, client_key, client_iv)?
            .with_record_limit(limit);
        let read = Tls12RecordProtection::new(provider, suite, server_key, server_iv)?
            .with_record_limit(limit);

        self.master_secret = Some(master_secret);
        self.pending_read = Some(read);
        self.set_state(Tls12ClientState::SentFinished);
        Ok(vec![
            HandshakeAction::SendHandshake(client_key_exchange),
            HandshakeAction::SendChangeCipherSpec,
            HandshakeAction::InstallWriteProtection(Protection::Tls12(write)),
            HandshakeAction::SendHandshake(client_finished),
        ])
    }

    /// Process the server's ChangeCipherSpec: switch to the server write keys.
    pub fn process_change_cipher_spec(&mut self) -> Result<Vec<HandshakeAction>> {
        self.expect_state(Tls12ClientState::WaitServerChangeCipherSpec, "ChangeCipherSpec")?;
        let read = self
            .pending_read
            .take()
            .ok_or_else(|| Error::InternalError("Server keys missing".into()))?;
        self.set_state(Tls12ClientState::WaitServerFinished);
        Ok(vec![HandshakeAction::InstallReadProtection(Protection::Tls12(read))])
    }

    fn process_finished(
        &mut self,
        provider: &dyn CryptoProvider,
        body: &[u8],
    ) -> Result<Vec<HandshakeAction>> {
        let suite = self.suite()?;
        let finished = Finished::decode(body, VERIFY_DATA_LEN)?;
        let master_secret = self
            .master_secret
            .take()
            .ok_or_else(|| Error::InternalError("Master secret missing".into()))?;
        let offer = self
            .offer
            .take()
            .ok_or_else(|| Error::InternalError("ClientHello offer missing".into()))?;

        let transcript_hash = offer.transcript.current_hash(provider)?;
        let expected = compute_verify_data(
            provider,
            suite.hash_algorithm(),
            &master_secret,
            b"server finished",
            &transcript_hash,
        )?;
        if !bool::from(expected.ct_eq(&finished.verify_data)) {
            tracing::warn!("Server Finished verification failed");
            return Err(Error::ProtocolError(ProtocolError::DecryptError));
        }

        self.server_key = None;
        self.set_state(Tls12ClientState::Established);
        Ok(Vec::new())
    }

    /// Wipe every secret and enter `Failed`.
    pub fn fail(&mut self) {
        self.offer = None;
        self.server_key = None;
        self.server_share = None;
        self.master_secret = None;
        self.pending_read = None;
        self.set_state(Tls12ClientState::Failed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate_validator::ValidationError;
    use crate::testing::{self, ServerRecord, TestServer};
    use crate::handshake::Handshake;
    use microtls_crypto_rustcrypto::RustCryptoProvider;

    /// Run the handshake, returning the first error.
    fn drive(config: &Config, server: &mut TestServer) -> Result<Handshake> {
        let provider = RustCryptoProvider::default();
        let mut handshake = Handshake::new(config);
        let mut to_server = testing::sent_messages(handshake.start(&provider, config)?);
        handshake.flight_sent();

        while !handshake.is_established() {
            let replies = server.respond(&provider, &to_server)?;
            if replies.is_empty() {
                return Err(Error::InternalError("server stalled".into()));
            }
            to_server = Vec::new();
            for reply in replies {
                let actions = match reply {
                    ServerRecord::Handshake(message) => {
                        handshake.handle(&provider, config, &message)?
                    },
                    ServerRecord::ChangeCipherSpec => handshake.change_cipher_spec()?,
                };
                if actions
                    .iter()
                    .any(|a| matches!(a, HandshakeAction::SendHandshake(_)))
                {
                    to_server.extend(testing::sent_messages(actions));
                    handshake.flight_sent();
                }
            }
        }
        Ok(handshake)
    }

    fn rsa_config() -> Config {
        Config::builder()
            .with_hostname("localhost")
            .with_trust_anchor(testing::CA_RSA)
            .with_current_time(testing::NOW)
            .build()
            .unwrap()
    }

    #[test]
    fn test_ecdsa_suites() {
        let config = testing::config();
        for suite in [
            CipherSuite::Tls12EcdheEcdsaWithAes128GcmSha256,
            CipherSuite::Tls12EcdheEcdsaWithAes256GcmSha384,
            CipherSuite::Tls12EcdheEcdsaWithChacha20Poly1305Sha256,
        ] {
            let mut server = TestServer::tls12(suite);
            let handshake = drive(&config, &mut server).unwrap();
            assert_eq!(handshake.cipher_suite(), Some(suite));
            assert!(server.client_finished_verified());
        }
    }

    #[test]
    fn test_rsa_suites() {
        let config = rsa_config();
        for suite in [
            CipherSuite::Tls12EcdheRsaWithAes128GcmSha256,
            CipherSuite::Tls12EcdheRsaWithAes256GcmSha384,
            CipherSuite::Tls12EcdheRsaWithChacha20Poly1305Sha256,
        ] {
            let mut server = TestServer::tls12(suite)
                .with_certificate(testing::LEAF_RSA, testing::LEAF_RSA_KEY);
            assert!(drive(&config, &mut server).unwrap().is_established());
        }
    }

    #[test]
    fn test_without_extended_master_secret() {
        let config = testing::config();
        let mut server = TestServer::tls12(CipherSuite::Tls12EcdheEcdsaWithAes128GcmSha256)
            .without_extended_master_secret();
        assert!(drive(&config, &mut server).unwrap().is_established());
        assert!(server.client_finished_verified());
    }

    #[test]
    fn test_certificate_must_match_suite() {
        let config = rsa_config();
        let mut server = TestServer::tls12(CipherSuite::Tls12EcdheEcdsaWithAes128GcmSha256)
            .with_certificate(testing::LEAF_RSA, testing::LEAF_RSA_KEY);
        assert_eq!(
            drive(&config, &mut server).unwrap_err(),
            Error::ProtocolError(ProtocolError::UnsupportedCertificate)
        );
    }

    #[test]
    fn test_expired_certificate() {
        let config = testing::config();
        let mut server = TestServer::tls12(CipherSuite::Tls12EcdheEcdsaWithAes128GcmSha256)
            .with_certificate(testing::EXPIRED_P256, testing::LEAF_P256_KEY);
        assert_eq!(
            drive(&config, &mut server).unwrap_err(),
            Error::CertificateVerificationFailed(ValidationError::Expired)
        );
    }

    #[test]
    fn test_tampered_server_key_exchange() {
        let config = testing::config();
        let mut server =
            TestServer::tls12(CipherSuite::Tls12EcdheEcdsaWithAes128GcmSha256).tamper_signature();
        assert_eq!(
            drive(&config, &mut server).unwrap_err(),
            Error::ProtocolError(ProtocolError::DecryptError)
        );
    }

    #[test]
    fn test_tampered_server_finished() {
        let config = testing::config();
        let mut server =
            TestServer::tls12(CipherSuite::Tls12EcdheEcdsaWithAes128GcmSha256).tamper_finished();
        assert_eq!(
            drive(&config, &mut server).unwrap_err(),
            Error::ProtocolError(ProtocolError::DecryptError)
        );
    }

    #[test]
    fn test_client_flight_is_one_transition() {
        let provider = RustCryptoProvider::default();
        let config = testing::config();
        let mut server = TestServer::tls12(CipherSuite::Tls12EcdheEcdsaWithAes128GcmSha256);
        let mut handshake = Handshake::new(&config);
        let hello = testing::sent_messages(handshake.start(&provider, &config).unwrap());
        handshake.flight_sent();

        let mut flight = Vec::new();
        for reply in server.respond(&provider, &hello).unwrap() {
            if let ServerRecord::Handshake(message) = reply {
                flight = handshake.handle(&provider, &config, &message).unwrap();
            }
        }
        let kinds: Vec<_> = flight
            .iter()
            .map(|action| match action {
                HandshakeAction::SendHandshake(bytes) if bytes[0] == 16 => "client_key_exchange",
                HandshakeAction::SendHandshake(bytes) if bytes[0] == 20 => "finished",
                HandshakeAction::SendChangeCipherSpec => "change_cipher_spec",
                HandshakeAction::InstallWriteProtection(_) => "write_keys",
                _ => "other",
            })
            .collect();
        assert_eq!(
            kinds,
            ["client_key_exchange", "change_cipher_spec", "write_keys", "finished"]
        );

        let Handshake::Tls12(client) = &mut handshake else {
            panic!("expected a TLS 1.2 handshake");
        };
        assert_eq!(client.state(), Tls12ClientState::SentFinished);
        client.flight_sent();
        assert_eq!(client.state(), Tls12ClientState::WaitServerChangeCipherSpec);
    }

    #[test]
    fn test_out_of_order_messages() {
        let provider = RustCryptoProvider::default();
        let config = testing::config();
        let mut client = Tls12ClientHandshake::new();

        let done = HandshakeMessage::new(HandshakeType::ServerHelloDone, Vec::new());
        let err = client.handle_message(&provider, &config, &done).unwrap_err();
        assert!(matches!(err, Error::UnexpectedMessage(_)));

        let err = client.process_change_cipher_spec().unwrap_err();
        assert!(matches!(err, Error::UnexpectedMessage(_)));

        client.state = Tls12ClientState::WaitServerHelloDone;
        let request = HandshakeMessage::new(HandshakeType::CertificateRequest, vec![0]);
        let err = client.handle_message(&provider, &config, &request).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFeature(_)));
    }

    #[test]
    fn test_fail_wipes_secrets() {
        let mut client = Tls12ClientHandshake::new();
        client.master_secret = Some(Zeroizing::new(vec![1; 48]));
        client.fail();
        assert_eq!(client.state(), Tls12ClientState::Failed);
        assert!(client.master_secret.is_none());
        assert!(client.offer().is_none());
    }
}

//! Client handshake state machines.
//!
//! The machines are sans-I/O. They consume reassembled handshake messages
//! and answer with [`HandshakeAction`]s, which the connection carries out in
//! order. One ClientHello offers both versions; the ServerHello picks the
//! machine that finishes the handshake:
//!
//! ```text
//! ClientHello ──▶ ServerHello ─┬─ supported_versions = 0x0304 ─▶ ClientHandshake
//!                              └─ legacy_version = 0x0303 ─────▶ Tls12ClientHandshake
//! ```

pub mod client;
pub mod hello;

pub use client::{ClientHandshake, ClientState};
pub use hello::{ClientOffer, EphemeralShare, Negotiated};

use microtls_crypto::CryptoProvider;

use crate::cipher::CipherSuite;
use crate::error::{Error, Result};
use crate::handshake_io::HandshakeMessage;
use crate::messages::ServerHello;
use crate::protocol::{HandshakeType, ProtocolVersion};
use crate::record_layer::Protection;
use crate::tls12::client::Tls12ClientHandshake;
use crate::Config;

/// One step the connection performs on behalf of a state machine.
#[derive(Debug)]
pub enum HandshakeAction {
    /// Write a framed handshake message under the current write protection
    SendHandshake(Vec<u8>),
    /// Write a ChangeCipherSpec record
    SendChangeCipherSpec,
    /// Replace the read protection
    InstallReadProtection(Protection),
    /// Replace the write protection
    InstallWriteProtection(Protection),
}

/// The running client handshake, whichever version it negotiated.
#[derive(Debug)]
pub enum Handshake {
    /// TLS 1.3, or not yet decided while 1.3 is offered
    Tls13(ClientHandshake),
    /// TLS 1.2
    Tls12(Tls12ClientHandshake),
}

impl Handshake {
    /// Machine for the versions `config` offers.
    pub fn new(config: &Config) -> Self {
        if config.versions().contains(&ProtocolVersion::Tls13) {
            Handshake::Tls13(ClientHandshake::new())
        } else {
            Handshake::Tls12(Tls12ClientHandshake::new())
        }
    }

    /// Produce the ClientHello.
    pub fn start(
        &mut self,
        provider: &dyn CryptoProvider,
        config: &Config,
    ) -> Result<Vec<HandshakeAction>> {
        match self {
            Handshake::Tls13(h) => h.start(provider, config),
            Handshake::Tls12(h) => h.start(provider, config),
        }
    }

    /// Process one server handshake message.
    pub fn handle(
        &mut self,
        provider: &dyn CryptoProvider,
        config: &Config,
        message: &HandshakeMessage,
    ) -> Result<Vec<HandshakeAction>> {
        if message.msg_type == HandshakeType::ServerHello {
            return self.handle_server_hello(provider, config, message);
        }
        match self {
            Handshake::Tls13(h) => h.handle_message(provider, config, message),
            Handshake::Tls12(h) => h.handle_message(provider, config, message),
        }
    }

    fn handle_server_hello(
        &mut self,
        provider: &dyn CryptoProvider,
        config: &Config,
        message: &HandshakeMessage,
    ) -> Result<Vec<HandshakeAction>> {
        let server_hello = ServerHello::decode(&message.body)?;
        let negotiated = {
            let offer = match self {
                Handshake::Tls13(h) => h.offer(),
                Handshake::Tls12(h) => h.offer(),
            }
            .ok_or_else(|| Error::UnexpectedMessage("ServerHello received out of order".into()))?;
            offer.check_server_hello(&server_hello)?
        };
        let raw = message.encode()?;

        if negotiated.version == ProtocolVersion::Tls12 {
            if let Handshake::Tls13(h) = self {
                let offer = h.take_offer()?;
                tracing::debug!("Server chose TLS 1.2; switching state machines");
                *self = Handshake::Tls12(Tls12ClientHandshake::from_offer(offer));
            }
        }

        match self {
            Handshake::Tls13(h) => {
                h.process_server_hello(provider, config, &server_hello, negotiated, &raw)
            },
            Handshake::Tls12(h) => {
                h.process_server_hello(provider, config, &server_hello, negotiated, &raw)
            },
        }
    }

    /// Process a ChangeCipherSpec record from the server.
    ///
    /// TLS 1.3 compatibility CCS records never get here; the record layer
    /// drops them.
    pub fn change_cipher_spec(&mut self) -> Result<Vec<HandshakeAction>> {
        match self {
            Handshake::Tls12(h) => h.process_change_cipher_spec(),
            Handshake::Tls13(_) => Err(Error::UnexpectedMessage(
                "ChangeCipherSpec in TLS 1.3 handshake".into(),
            )),
        }
    }

    /// The connection finished writing the last flight.
    pub fn flight_sent(&mut self) {
        match self {
            Handshake::Tls13(h) => h.flight_sent(),
            Handshake::Tls12(h) => h.flight_sent(),
        }
    }

    /// Whether the handshake completed.
    pub fn is_established(&self) -> bool {
        match self {
            Handshake::Tls13(h) => h.is_established(),
            Handshake::Tls12(h) => h.is_established(),
        }
    }

    /// Negotiated version, once the ServerHello is accepted.
    pub fn version(&self) -> Option<ProtocolVersion> {
        self.cipher_suite().map(CipherSuite::version)
    }

    /// Negotiated cipher suite, once the ServerHello is accepted.
    pub fn cipher_suite(&self) -> Option<CipherSuite> {
        match self {
            Handshake::Tls13(h) => h.cipher_suite(),
            Handshake::Tls12(h) => h.cipher_suite(),
        }
    }

    /// Protocol selected through ALPN.
    pub fn alpn_protocol(&self) -> Option<&[u8]> {
        match self {
            Handshake::Tls13(h) => h.alpn_protocol(),
            Handshake::Tls12(h) => h.alpn_protocol(),
        }
    }

    /// Abort: wipe every secret and enter `Failed`.
    pub fn fail(&mut self) {
        match self {
            Handshake::Tls13(h) => h.fail(),
            Handshake::Tls12(h) => h.fail(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, TestServer};
    use microtls_crypto_rustcrypto::RustCryptoProvider;

    fn run(config: &Config, server: &mut TestServer) -> Handshake {
        let provider = RustCryptoProvider::default();
        let mut handshake = Handshake::new(config);
        let hello = testing::sent_messages(handshake.start(&provider, config).unwrap());
        handshake.flight_sent();

        let mut to_server = hello;
        while !handshake.is_established() {
            let replies = server.respond(&provider, &to_server).unwrap();
            to_server = Vec::new();
            for reply in replies {
                let actions = match reply {
                    testing::ServerRecord::Handshake(message) => {
                        handshake.handle(&provider, config, &message).unwrap()
                    },
                    testing::ServerRecord::ChangeCipherSpec => {
                        handshake.change_cipher_spec().unwrap()
                    },
                };
                if !actions.is_empty() {
                    to_server.extend(testing::sent_messages(actions));
                    handshake.flight_sent();
                }
            }
        }
        handshake
    }

    #[test]
    fn test_tls13_and_tls12_selection() {
        let config = testing::config();
        let mut server = TestServer::tls13(CipherSuite::Aes128GcmSha256);
        let handshake = run(&config, &mut server);
        assert!(matches!(handshake, Handshake::Tls13(_)));
        assert_eq!(handshake.version(), Some(ProtocolVersion::Tls13));

        let mut server = TestServer::tls12(CipherSuite::Tls12EcdheEcdsaWithAes128GcmSha256);
        let handshake = run(&config, &mut server);
        assert!(matches!(handshake, Handshake::Tls12(_)));
        assert_eq!(handshake.version(), Some(ProtocolVersion::Tls12));
        assert!(server.client_finished_verified());
    }

    #[test]
    fn test_tls12_only_config_starts_tls12_machine() {
        let config = Config::builder()
            .with_hostname("localhost")
            .with_trust_anchor(testing::CA_P256)
            .with_current_time(testing::NOW)
            .with_cipher_suites(&[CipherSuite::Tls12EcdheEcdsaWithAes256GcmSha384])
            .build()
            .unwrap();
        assert!(matches!(Handshake::new(&config), Handshake::Tls12(_)));

        let mut server = TestServer::tls12(CipherSuite::Tls12EcdheEcdsaWithAes256GcmSha384);
        assert!(run(&config, &mut server).is_established());
    }

    #[test]
    fn test_server_hello_out_of_order() {
        let provider = RustCryptoProvider::default();
        let config = testing::config();
        let mut handshake = Handshake::new(&config);
        let message = HandshakeMessage::new(HandshakeType::ServerHello, vec![0; 38]);
        assert!(handshake.handle(&provider, &config, &message).is_err());

        let err = handshake.change_cipher_spec().unwrap_err();
        assert!(matches!(err, Error::UnexpectedMessage(_)));
    }
}

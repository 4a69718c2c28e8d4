//! ClientHello construction and ServerHello negotiation.
//!
//! One ClientHello serves both versions: it lists the TLS 1.3 suites first,
//! offers `supported_versions` (0x0304, 0x0303) and carries one key share per
//! configured group. The server's ServerHello then decides which state
//! machine runs the rest of the handshake.

use core::fmt;

use microtls_crypto::key_exchange::{PrivateKey, SharedSecret};
use microtls_crypto::{CryptoProvider, KeyExchangeAlgorithm};

use crate::cipher::CipherSuite;
use crate::error::{Error, ProtocolError, Result};
use crate::extension_types::{ClientHelloExtensions, KeyShareEntry};
use crate::extensions::selected_version;
use crate::handshake_io::HandshakeMessage;
use crate::messages::{ClientHello, ServerHello};
use crate::protocol::{HandshakeType, ProtocolVersion};
use crate::transcript::TranscriptHash;
use crate::Config;

/// Length of the legacy session id sent for middlebox compatibility.
const SESSION_ID_LEN: usize = 32;

/// Ephemeral ECDHE keypair for one group.
pub struct EphemeralShare {
    /// Group of this keypair
    pub group: KeyExchangeAlgorithm,
    /// Public key in the group's wire encoding
    pub public: Vec<u8>,
    private: PrivateKey,
}

impl fmt::Debug for EphemeralShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EphemeralShare")
            .field("group", &self.group)
            .field("public_len", &self.public.len())
            .finish()
    }
}

impl EphemeralShare {
    /// Generate a fresh keypair for `group`.
    pub fn generate(provider: &dyn CryptoProvider, group: KeyExchangeAlgorithm) -> Result<Self> {
        let (private, public) = provider.key_exchange(group)?.generate_keypair()?;
        Ok(Self {
            group,
            public: public.into_bytes(),
            private,
        })
    }

    /// Agree on the shared secret with the peer's public key.
    ///
    /// # Errors
    ///
    /// `ProtocolError(IllegalParameter)` if the peer key is invalid for the
    /// group (wrong length, off-curve point, all-zero X25519 output).
    pub fn agree(&self, provider: &dyn CryptoProvider, peer: &[u8]) -> Result<SharedSecret> {
        let kex = provider.key_exchange(self.group)?;
        kex.exchange(&self.private, peer).map_err(|e| {
            tracing::warn!("{} key exchange rejected peer key: {}", self.group.name(), e);
            Error::ProtocolError(ProtocolError::IllegalParameter)
        })
    }
}

/// Version and suite the server selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Negotiated {
    /// Selected protocol version
    pub version: ProtocolVersion,
    /// Selected cipher suite
    pub cipher_suite: CipherSuite,
}

/// Everything the client committed to in its ClientHello.
#[derive(Debug)]
pub struct ClientOffer {
    /// client_random
    pub random: [u8; 32],
    /// legacy_session_id, echoed by the server
    pub session_id: Vec<u8>,
    /// Offered suites, in preference order
    pub cipher_suites: Vec<CipherSuite>,
    /// Offered extensions
    pub extensions: ClientHelloExtensions,
    /// TLS 1.3 key shares, one per offered group
    pub shares: Vec<EphemeralShare>,
    /// Transcript holding the ClientHello
    pub transcript: TranscriptHash,
}

impl ClientOffer {
    /// Build the offer and the framed ClientHello to send.
    pub fn new(provider: &dyn CryptoProvider, config: &Config) -> Result<(Self, Vec<u8>)> {
        let mut random = [0u8; 32];
        provider.random().fill(&mut random)?;
        let session_id = provider.random().generate(SESSION_ID_LEN)?;

        let versions = config.versions();
        let shares = if versions.contains(&ProtocolVersion::Tls13) {
            config
                .groups
                .iter()
                .map(|&group| EphemeralShare::generate(provider, group))
                .collect::<Result<Vec<_>>>()?
        } else {
            Vec::new()
        };

        let extensions = ClientHelloExtensions {
            hostname: config.hostname.clone(),
            versions,
            groups: config.groups.clone(),
            signature_algorithms: config.signature_algorithms.clone(),
            key_shares: shares
                .iter()
                .map(|s| KeyShareEntry::new(s.group.to_u16(), s.public.clone()))
                .collect(),
            alpn_protocols: config.alpn_protocols.clone(),
        };

        let hello = ClientHello::new(random, &config.cipher_suites)
            .with_session_id(session_id.clone())
            .with_extensions(extensions.to_extensions()?);
        let encoded = HandshakeMessage::new(HandshakeType::ClientHello, hello.encode()?).encode()?;

        let mut transcript = TranscriptHash::new();
        transcript.update(&encoded);

        tracing::debug!(
            "ClientHello: {} suites, {} key shares, {} bytes",
            config.cipher_suites.len(),
            shares.len(),
            encoded.len()
        );

        Ok((
            Self {
                random,
                session_id,
                cipher_suites: config.cipher_suites.clone(),
                extensions,
                shares,
                transcript,
            },
            encoded,
        ))
    }

    /// Whether `version` was offered.
    pub fn offers(&self, version: ProtocolVersion) -> bool {
        self.extensions.versions.contains(&version)
    }

    /// Key share generated for `group`, if it was offered.
    pub fn share_for(&self, group: u16) -> Option<&EphemeralShare> {
        self.shares.iter().find(|s| s.group.to_u16() == group)
    }

    /// Check the server's choices against this offer.
    ///
    /// # Errors
    ///
    /// - `ProtocolError(HandshakeFailure)` for a HelloRetryRequest; every
    ///   configured group already carries a share
    /// - `ProtocolError(ProtocolVersion)` when the server picks a version
    ///   that was never offered through legacy negotiation
    /// - `ProtocolError(IllegalParameter)` for anything else not offered,
    ///   a session id that is not echoed, non-null compression or a
    ///   downgrade sentinel
    /// - `ProtocolError(UnsupportedExtension)` for an unsolicited extension
    pub fn check_server_hello(&self, server_hello: &ServerHello) -> Result<Negotiated> {
        if server_hello.is_hello_retry_request() {
            tracing::warn!("HelloRetryRequest received; all groups were already offered");
            return Err(Error::ProtocolError(ProtocolError::HandshakeFailure));
        }
        if server_hello.compression_method != 0 {
            return Err(Error::ProtocolError(ProtocolError::IllegalParameter));
        }
        if server_hello.legacy_session_id_echo != self.session_id {
            tracing::warn!("ServerHello does not echo the session id");
            return Err(Error::ProtocolError(ProtocolError::IllegalParameter));
        }

        let version = match server_hello.extensions.get_supported_version_server()? {
            Some(code) => match selected_version(code) {
                Some(ProtocolVersion::Tls13)
                    if self.offers(ProtocolVersion::Tls13)
                        && server_hello.legacy_version == ProtocolVersion::Tls12.to_u16() =>
                {
                    ProtocolVersion::Tls13
                },
                _ => {
                    tracing::warn!("supported_versions selected 0x{:04x}", code);
                    return Err(Error::ProtocolError(ProtocolError::IllegalParameter));
                },
            },
            None if server_hello.legacy_version == ProtocolVersion::Tls12.to_u16()
                && self.offers(ProtocolVersion::Tls12) =>
            {
                ProtocolVersion::Tls12
            },
            None => {
                tracing::warn!("Server selected version 0x{:04x}", server_hello.legacy_version);
                return Err(Error::ProtocolError(ProtocolError::ProtocolVersion));
            },
        };

        let cipher_suite = CipherSuite::from_u16(server_hello.cipher_suite)
            .filter(|s| self.cipher_suites.contains(s))
            .filter(|s| s.version() == version)
            .ok_or_else(|| {
                tracing::warn!(
                    "Server selected cipher suite 0x{:04x} for {}",
                    server_hello.cipher_suite,
                    version.name()
                );
                Error::ProtocolError(ProtocolError::IllegalParameter)
            })?;

        if version == ProtocolVersion::Tls12
            && self.offers(ProtocolVersion::Tls13)
            && server_hello.has_downgrade_sentinel()
        {
            tracing::warn!("Downgrade sentinel in server_random");
            return Err(Error::ProtocolError(ProtocolError::IllegalParameter));
        }

        server_hello
            .extensions
            .check_allowed(&self.extensions.allowed_in_server_hello(version))?;

        tracing::info!("Negotiated {} with {}", version.name(), cipher_suite.name());
        Ok(Negotiated {
            version,
            cipher_suite,
        })
    }
}

//! # microtls core
//!
//! Client-side TLS 1.2/1.3 protocol engine.
//!
//! This crate contains everything between the application's byte stream and
//! the cryptographic primitives:
//! - Alert, record and handshake message codecs
//! - Record protection for both protocol versions
//! - The TLS 1.3 key schedule and the TLS 1.2 PRF
//! - Sans-I/O handshake state machines
//! - Server certificate validation
//! - [`connection::Connection`], which drives a handshake over a [`transport::Transport`]
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Public API (microtls)           │
//! └─────────────────┬───────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────┐
//! │      microtls-core (this crate)         │
//! │  ┌──────────────────────────────────┐   │
//! │  │   Connection (I/O driver)        │   │
//! │  ├──────────────────────────────────┤   │
//! │  │   Handshake State Machines       │   │
//! │  ├──────────────────────────────────┤   │
//! │  │   Message and Extension Codecs   │   │
//! │  ├──────────────────────────────────┤   │
//! │  │   Record Layer                   │   │
//! │  └──────────────────────────────────┘   │
//! └─────────────────┬───────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────┐
//! │    microtls-crypto (trait interface)    │
//! └─────────────────────────────────────────┘
//! ```

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    unused_qualifications
)]
#![forbid(unsafe_code)]

// Re-export crypto interface
pub use microtls_crypto;

// Core modules
pub mod alert;
pub mod certificate_validator;
pub mod cipher;
pub mod codec;
pub mod connection;
pub mod error;
pub mod extension_types;
pub mod extensions;
pub mod handshake;
pub mod handshake_io;
pub mod key_schedule;
pub mod messages;
pub mod protocol;
pub mod record;
pub mod record_layer;
pub mod record_protection;
pub mod signature_verify;
pub mod state;
pub mod tls12;
pub mod transcript;
pub mod transport;
pub mod x509;

#[cfg(any(test, feature = "testing"))]
#[doc(hidden)]
pub mod testing;

use std::time::{SystemTime, UNIX_EPOCH};

use microtls_crypto::{KeyExchangeAlgorithm, SignatureAlgorithm};

use crate::certificate_validator::{CertificateValidator, ValidationPolicy};
use crate::cipher::{CipherSuite, DEFAULT_CIPHER_SUITES};
use crate::extension_types::DEFAULT_GROUPS;
use crate::handshake_io::{DEFAULT_MAX_HANDSHAKE_MESSAGE_SIZE, HANDSHAKE_HEADER_SIZE};
use crate::record_protection::DEFAULT_MAX_RECORDS_PER_KEY;
use crate::signature_verify::DEFAULT_SIGNATURE_ALGORITHMS;
use crate::transport::DEFAULT_TIMEOUT_MS;

// Re-exports
pub use connection::Connection;
pub use error::{Error, ErrorKind, Result};
pub use protocol::{ContentType, ProtocolVersion};
pub use state::ConnectionPhase;
pub use transport::{Transport, TransportError};

/// Longest ALPN protocol name (`opaque ProtocolName<1..2^8-1>`).
pub const MAX_ALPN_PROTOCOL_LEN: usize = 255;

/// Client configuration.
///
/// Built with [`Config::builder`]; `build()` validates the combination and
/// parses the trust anchors once.
///
/// # Example
///
/// ```rust
/// use microtls_core::Config;
///
/// let config = Config::builder()
///     .with_hostname("example.com")
///     .with_verify_certificate_chain(false)
///     .build()
///     .unwrap();
/// assert!(config.verify_hostname);
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Server name for SNI and hostname verification
    pub hostname: String,

    /// Check the certificate chain against the trust anchors
    pub verify_certificate_chain: bool,

    /// Check the leaf certificate against `hostname`
    pub verify_hostname: bool,

    /// Fixed validation time (UNIX seconds); the system clock when unset
    pub current_time: Option<u64>,

    /// Cipher suites in preference order
    pub cipher_suites: Vec<CipherSuite>,

    /// Key exchange groups in preference order
    pub groups: Vec<KeyExchangeAlgorithm>,

    /// Signature schemes accepted from the server
    pub signature_algorithms: Vec<SignatureAlgorithm>,

    /// ALPN protocols offered, empty for none
    pub alpn_protocols: Vec<Vec<u8>>,

    /// Bound on one reassembled handshake message
    pub max_handshake_message_size: usize,

    /// Records allowed under one traffic key
    pub max_records_per_key: u64,

    /// Transport send/receive timeout
    pub timeout_ms: u32,

    validator: CertificateValidator,
}

impl Config {
    /// Create a new configuration builder.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Versions implied by the configured suites, newest first.
    pub fn versions(&self) -> Vec<ProtocolVersion> {
        [ProtocolVersion::Tls13, ProtocolVersion::Tls12]
            .into_iter()
            .filter(|v| self.cipher_suites.iter().any(|s| s.version() == *v))
            .collect()
    }

    /// Validator holding the parsed trust anchors.
    pub fn validator(&self) -> &CertificateValidator {
        &self.validator
    }

    /// Policy for validating a chain received now.
    pub fn validation_policy(&self) -> ValidationPolicy {
        let now = self.current_time.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0)
        });
        ValidationPolicy {
            verify_chain: self.verify_certificate_chain,
            verify_hostname: self.verify_hostname,
            now,
        }
    }
}

/// Configuration builder.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    hostname: String,
    verify_certificate_chain: bool,
    verify_hostname: bool,
    current_time: Option<u64>,
    trust_anchors: Vec<Vec<u8>>,
    cipher_suites: Vec<CipherSuite>,
    groups: Vec<KeyExchangeAlgorithm>,
    signature_algorithms: Vec<SignatureAlgorithm>,
    alpn_protocols: Vec<Vec<u8>>,
    max_handshake_message_size: usize,
    max_records_per_key: u64,
    timeout_ms: u32,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self {
            hostname: String::new(),
            verify_certificate_chain: true,
            verify_hostname: true,
            current_time: None,
            trust_anchors: Vec::new(),
            cipher_suites: DEFAULT_CIPHER_SUITES.to_vec(),
            groups: DEFAULT_GROUPS.to_vec(),
            signature_algorithms: DEFAULT_SIGNATURE_ALGORITHMS.to_vec(),
            alpn_protocols: Vec::new(),
            max_handshake_message_size: DEFAULT_MAX_HANDSHAKE_MESSAGE_SIZE,
            max_records_per_key: DEFAULT_MAX_RECORDS_PER_KEY,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl ConfigBuilder {
    /// Set the server hostname.
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// Enable or disable certificate chain verification.
    pub fn with_verify_certificate_chain(mut self, verify: bool) -> Self {
        self.verify_certificate_chain = verify;
        self
    }

    /// Enable or disable hostname verification.
    pub fn with_verify_hostname(mut self, verify: bool) -> Self {
        self.verify_hostname = verify;
        self
    }

    /// Skip both chain and hostname verification.
    #[deprecated(note = "use with_verify_certificate_chain and with_verify_hostname")]
    pub fn with_skip_verify(mut self, skip: bool) -> Self {
        self.verify_certificate_chain = !skip;
        self.verify_hostname = !skip;
        self
    }

    /// Validate certificates at a fixed time instead of the system clock.
    pub fn with_current_time(mut self, unix_seconds: u64) -> Self {
        self.current_time = Some(unix_seconds);
        self
    }

    /// Add a DER trust anchor.
    pub fn with_trust_anchor(mut self, der: impl Into<Vec<u8>>) -> Self {
        self.trust_anchors.push(der.into());
        self
    }

    /// Replace the trust anchors.
    pub fn with_trust_anchors(mut self, anchors: Vec<Vec<u8>>) -> Self {
        self.trust_anchors = anchors;
        self
    }

    /// Set the cipher suites, in preference order.
    pub fn with_cipher_suites(mut self, suites: &[CipherSuite]) -> Self {
        self.cipher_suites = suites.to_vec();
        self
    }

    /// Set the key exchange groups, in preference order.
    pub fn with_groups(mut self, groups: &[KeyExchangeAlgorithm]) -> Self {
        self.groups = groups.to_vec();
        self
    }

    /// Set the accepted signature schemes.
    pub fn with_signature_algorithms(mut self, schemes: &[SignatureAlgorithm]) -> Self {
        self.signature_algorithms = schemes.to_vec();
        self
    }

    /// Set the ALPN protocols to offer.
    pub fn with_alpn_protocols(mut self, protocols: &[&[u8]]) -> Self {
        self.alpn_protocols = protocols.iter().map(|p| p.to_vec()).collect();
        self
    }

    /// Bound a single reassembled handshake message.
    pub fn with_max_handshake_message_size(mut self, size: usize) -> Self {
        self.max_handshake_message_size = size;
        self
    }

    /// Cap the number of records under one traffic key.
    pub fn with_max_records_per_key(mut self, limit: u64) -> Self {
        self.max_records_per_key = limit;
        self
    }

    /// Set the transport timeout.
    pub fn with_timeout_ms(mut self, timeout_ms: u32) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Build the configuration.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` when verification is enabled without what it needs,
    /// a list is empty, a limit is zero, an ALPN name is empty or too long,
    /// or a trust anchor does not parse.
    pub fn build(self) -> Result<Config> {
        if self.cipher_suites.is_empty() {
            return Err(Error::InvalidConfig("No cipher suites configured".into()));
        }
        if self.groups.is_empty() {
            return Err(Error::InvalidConfig("No key exchange groups configured".into()));
        }
        if self.signature_algorithms.is_empty() {
            return Err(Error::InvalidConfig("No signature algorithms configured".into()));
        }
        if self.verify_certificate_chain && self.trust_anchors.is_empty() {
            return Err(Error::InvalidConfig(
                "Chain verification requires at least one trust anchor".into(),
            ));
        }
        if self.verify_hostname && self.hostname.is_empty() {
            return Err(Error::InvalidConfig(
                "Hostname verification requires a hostname".into(),
            ));
        }
        if self.timeout_ms == 0 {
            return Err(Error::InvalidConfig("Timeout must be non-zero".into()));
        }
        if self.max_records_per_key == 0 {
            return Err(Error::InvalidConfig("Record limit must be non-zero".into()));
        }
        if self.max_handshake_message_size <= HANDSHAKE_HEADER_SIZE {
            return Err(Error::InvalidConfig("Handshake message bound too small".into()));
        }
        if let Some(bad) = self
            .alpn_protocols
            .iter()
            .find(|p| p.is_empty() || p.len() > MAX_ALPN_PROTOCOL_LEN)
        {
            return Err(Error::InvalidConfig(format!(
                "ALPN protocol name must be 1..=255 bytes, got {}",
                bad.len()
            )));
        }

        let validator = CertificateValidator::new(&self.trust_anchors)?;
        Ok(Config {
            hostname: self.hostname,
            verify_certificate_chain: self.verify_certificate_chain,
            verify_hostname: self.verify_hostname,
            current_time: self.current_time,
            cipher_suites: self.cipher_suites,
            groups: self.groups,
            signature_algorithms: self.signature_algorithms,
            alpn_protocols: self.alpn_protocols,
            max_handshake_message_size: self.max_handshake_message_size,
            max_records_per_key: self.max_records_per_key,
            timeout_ms: self.timeout_ms,
            validator,
        })
    }
}

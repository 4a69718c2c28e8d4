//! Server certificate validation.
//!
//! Two independent checks, each behind its own switch:
//!
//! - **Chain**: every certificate is signed by the next, intermediates are
//!   CAs, every certificate is inside its validity window, and the last one
//!   is a configured trust anchor or is signed by one.
//! - **Hostname**: the leaf's subjectAltName dNSName entries match the
//!   hostname (left-most-label wildcards allowed). The subject CN is only
//!   consulted when the certificate has no dNSName. IP literals match
//!   iPAddress entries.
//!
//! The leaf is always parsed, whatever the switches say, because its key
//! authenticates the key exchange.

use std::fmt;
use std::net::IpAddr;

use microtls_crypto::CryptoProvider;

use crate::error::{AlertDescription, Error, Result};
use crate::x509::X509Certificate;

/// Default bound on the number of certificates in a server chain.
pub const DEFAULT_MAX_CHAIN_LENGTH: usize = 8;

/// Certificate validation error reasons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Server sent no certificates
    EmptyChain,
    /// Chain is longer than the configured bound
    ChainTooLong,
    /// DER could not be parsed
    Malformed(String),
    /// Key or signature algorithm the engine cannot check
    UnsupportedAlgorithm,
    /// Current time is after notAfter
    Expired,
    /// Current time is before notBefore
    NotYetValid,
    /// A certificate signature did not verify
    BadSignature,
    /// An intermediate lacks the CA bit
    NotCa,
    /// Chain does not end at a trust anchor
    UnknownIssuer,
    /// Hostname does not match the leaf
    HostnameMismatch,
}

impl ValidationError {
    /// Alert that reports this failure to the server.
    pub fn alert(&self) -> AlertDescription {
        match self {
            ValidationError::UnknownIssuer => AlertDescription::UnknownCa,
            ValidationError::Expired | ValidationError::NotYetValid => {
                AlertDescription::CertificateExpired
            },
            ValidationError::UnsupportedAlgorithm => AlertDescription::UnsupportedCertificate,
            ValidationError::EmptyChain
            | ValidationError::ChainTooLong
            | ValidationError::Malformed(_)
            | ValidationError::BadSignature
            | ValidationError::NotCa
            | ValidationError::HostnameMismatch => AlertDescription::BadCertificate,
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyChain => write!(f, "Certificate chain is empty"),
            ValidationError::ChainTooLong => write!(f, "Certificate chain is too long"),
            ValidationError::Malformed(msg) => write!(f, "Malformed certificate: {}", msg),
            ValidationError::UnsupportedAlgorithm => {
                write!(f, "Unsupported certificate algorithm")
            },
            ValidationError::Expired => write!(f, "Certificate is expired"),
            ValidationError::NotYetValid => write!(f, "Certificate is not yet valid"),
            ValidationError::BadSignature => {
                write!(f, "Certificate signature verification failed")
            },
            ValidationError::NotCa => write!(f, "Intermediate is not a CA"),
            ValidationError::UnknownIssuer => write!(f, "Certificate issuer is not trusted"),
            ValidationError::HostnameMismatch => write!(f, "Hostname does not match certificate"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// What to check for one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationPolicy {
    /// Check signatures, validity and the trust anchor
    pub verify_chain: bool,
    /// Check the leaf against the hostname
    pub verify_hostname: bool,
    /// Current time, seconds since the UNIX epoch
    pub now: u64,
}

/// Certificate validator.
///
/// Holds the parsed trust anchors; one validator serves any number of
/// connections.
#[derive(Debug, Clone)]
pub struct CertificateValidator {
    trust_anchors: Vec<X509Certificate>,
    max_chain_length: usize,
}

impl CertificateValidator {
    /// Parse the DER trust anchors.
    pub fn new(trust_anchors: &[Vec<u8>]) -> Result<Self> {
        let trust_anchors = trust_anchors
            .iter()
            .map(|der| {
                X509Certificate::parse(der)
                    .map_err(|e| Error::InvalidConfig(format!("Bad trust anchor: {}", e)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            trust_anchors,
            max_chain_length: DEFAULT_MAX_CHAIN_LENGTH,
        })
    }

    /// Override the chain length bound.
    pub fn with_max_chain_length(mut self, max_chain_length: usize) -> Self {
        self.max_chain_length = max_chain_length;
        self
    }

    /// Number of configured trust anchors.
    pub fn trust_anchor_count(&self) -> usize {
        self.trust_anchors.len()
    }

    /// Validate a server chain (leaf first) and return the parsed leaf.
    pub fn verify_server(
        &self,
        provider: &dyn CryptoProvider,
        chain: &[&[u8]],
        hostname: &str,
        policy: &ValidationPolicy,
    ) -> core::result::Result<X509Certificate, ValidationError> {
        let Some(leaf_der) = chain.first() else {
            return Err(ValidationError::EmptyChain);
        };
        let leaf = X509Certificate::parse(leaf_der)?;

        if policy.verify_chain {
            if chain.len() > self.max_chain_length {
                return Err(ValidationError::ChainTooLong);
            }
            let mut certs = vec![leaf.clone()];
            for der in &chain[1..] {
                certs.push(X509Certificate::parse(der)?);
            }
            self.verify_chain(provider, &certs, policy.now)?;
        }

        if policy.verify_hostname && !matches_hostname(&leaf, hostname) {
            tracing::warn!("Certificate does not match hostname {}", hostname);
            return Err(ValidationError::HostnameMismatch);
        }

        Ok(leaf)
    }

    fn verify_chain(
        &self,
        provider: &dyn CryptoProvider,
        certs: &[X509Certificate],
        now: u64,
    ) -> core::result::Result<(), ValidationError> {
        for (i, cert) in certs.iter().enumerate() {
            if now < cert.not_before {
                return Err(ValidationError::NotYetValid);
            }
            if now > cert.not_after {
                return Err(ValidationError::Expired);
            }
            if i > 0 && !cert.is_ca {
                return Err(ValidationError::NotCa);
            }
        }

        for pair in certs.windows(2) {
            if !pair[0].is_issued_by(&pair[1]) {
                return Err(ValidationError::UnknownIssuer);
            }
            verify_issued_by(provider, &pair[0], &pair[1])?;
        }

        let Some(last) = certs.last() else {
            return Err(ValidationError::EmptyChain);
        };
        if self.trust_anchors.iter().any(|anchor| anchor.der == last.der) {
            return Ok(());
        }
        for anchor in self.trust_anchors.iter().filter(|a| last.is_issued_by(a)) {
            if verify_issued_by(provider, last, anchor).is_ok() {
                tracing::debug!("Chain anchored at {:?}", anchor.subject_cn);
                return Ok(());
            }
        }
        Err(ValidationError::UnknownIssuer)
    }
}

/// Check `cert`'s signature with `issuer`'s key.
fn verify_issued_by(
    provider: &dyn CryptoProvider,
    cert: &X509Certificate,
    issuer: &X509Certificate,
) -> core::result::Result<(), ValidationError> {
    let scheme = cert
        .signature_scheme(&issuer.public_key)
        .ok_or(ValidationError::UnsupportedAlgorithm)?;
    let verifier = provider
        .signature(scheme)
        .map_err(|_| ValidationError::UnsupportedAlgorithm)?;
    verifier
        .verify(&issuer.public_key.key, &cert.tbs, cert.signature())
        .map_err(|_| ValidationError::BadSignature)
}

/// Whether `cert` is valid for `hostname`.
pub fn matches_hostname(cert: &X509Certificate, hostname: &str) -> bool {
    if let Ok(ip) = hostname.parse::<IpAddr>() {
        return cert.ip_addresses.contains(&ip);
    }
    let hostname = hostname.trim_end_matches('.').to_ascii_lowercase();
    if hostname.is_empty() {
        return false;
    }
    if !cert.dns_names.is_empty() {
        return cert.dns_names.iter().any(|p| wildcard_match(p, &hostname));
    }
    cert.subject_cn
        .as_deref()
        .map(|cn| wildcard_match(&cn.to_ascii_lowercase(), &hostname))
        .unwrap_or(false)
}

/// Match a lower-case hostname against a lower-case pattern.
///
/// `*` is only honored as the whole left-most label, matches exactly one
/// label, and needs at least two labels after it.
fn wildcard_match(pattern: &str, hostname: &str) -> bool {
    let pattern = pattern.trim_end_matches('.');
    let Some(suffix) = pattern.strip_prefix("*.") else {
        return pattern == hostname;
    };
    if !suffix.contains('.') || suffix.contains('*') {
        return false;
    }
    match hostname.split_once('.') {
        Some((label, rest)) => !label.is_empty() && rest == suffix,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use microtls_crypto::CryptoProvider;
    use microtls_crypto_rustcrypto::RustCryptoProvider;

    const CA_P256: &[u8] = include_bytes!("../tests/data/ca_p256.der");
    const CA_RSA: &[u8] = include_bytes!("../tests/data/ca_rsa.der");
    const LEAF_P256: &[u8] = include_bytes!("../tests/data/leaf_p256.der");
    const LEAF_RSA: &[u8] = include_bytes!("../tests/data/leaf_rsa.der");
    const EXPIRED_P256: &[u8] = include_bytes!("../tests/data/expired_p256.der");
    const UNTRUSTED_P256: &[u8] = include_bytes!("../tests/data/untrusted_p256.der");

    // 2025-06-01T00:00:00Z
    const NOW: u64 = 1_748_736_000;

    fn full() -> ValidationPolicy {
        ValidationPolicy {
            verify_chain: true,
            verify_hostname: true,
            now: NOW,
        }
    }

    fn validator() -> CertificateValidator {
        CertificateValidator::new(&[CA_P256.to_vec(), CA_RSA.to_vec()]).unwrap()
    }

    #[test]
    fn test_wildcard_match() {
        assert!(wildcard_match("*.example.com", "www.example.com"));
        assert!(!wildcard_match("*.example.com", "example.com"));
        assert!(!wildcard_match("*.example.com", "a.b.example.com"));
        assert!(!wildcard_match("*.com", "example.com"));
        assert!(!wildcard_match("w*.example.com", "www.example.com"));
        assert!(wildcard_match("example.com.", "example.com"));
    }

    #[test]
    fn test_valid_chains() {
        let provider = RustCryptoProvider::new();
        let v = validator();
        for leaf in [LEAF_P256, LEAF_RSA] {
            let cert = v.verify_server(&provider, &[leaf], "localhost", &full()).unwrap();
            assert_eq!(cert.subject_cn.as_deref(), Some("localhost"));
        }
    }

    #[test]
    fn test_chain_including_anchor() {
        let provider = RustCryptoProvider::new();
        validator()
            .verify_server(&provider, &[LEAF_P256, CA_P256], "localhost", &full())
            .unwrap();
    }

    #[test]
    fn test_hostname_forms() {
        let provider = RustCryptoProvider::new();
        let v = validator();
        for host in ["localhost", "LOCALHOST", "api.example.test", "127.0.0.1"] {
            assert!(v.verify_server(&provider, &[LEAF_P256], host, &full()).is_ok(), "{}", host);
        }
        for host in ["example.test", "a.b.example.test", "127.0.0.2", "other.host"] {
            assert_eq!(
                v.verify_server(&provider, &[LEAF_P256], host, &full()).unwrap_err(),
                ValidationError::HostnameMismatch,
                "{}",
                host
            );
        }
    }

    #[test]
    fn test_untrusted_root() {
        let provider = RustCryptoProvider::new();
        let err = validator()
            .verify_server(&provider, &[UNTRUSTED_P256], "localhost", &full())
            .unwrap_err();
        assert_eq!(err, ValidationError::UnknownIssuer);
        assert_eq!(err.alert(), AlertDescription::UnknownCa);
    }

    #[test]
    fn test_wrong_anchor() {
        let provider = RustCryptoProvider::new();
        let v = CertificateValidator::new(&[CA_RSA.to_vec()]).unwrap();
        let err = v.verify_server(&provider, &[LEAF_P256], "localhost", &full()).unwrap_err();
        assert_eq!(err, ValidationError::UnknownIssuer);
    }

    #[test]
    fn test_expired() {
        let provider = RustCryptoProvider::new();
        let err = validator()
            .verify_server(&provider, &[EXPIRED_P256], "localhost", &full())
            .unwrap_err();
        assert_eq!(err, ValidationError::Expired);
        assert_eq!(err.alert(), AlertDescription::CertificateExpired);

        let early = ValidationPolicy { now: 0, ..full() };
        let err = validator()
            .verify_server(&provider, &[LEAF_P256], "localhost", &early)
            .unwrap_err();
        assert_eq!(err, ValidationError::NotYetValid);
    }

    #[test]
    fn test_leaf_as_intermediate_is_not_ca() {
        let provider = RustCryptoProvider::new();
        let err = validator()
            .verify_server(&provider, &[LEAF_P256, LEAF_RSA], "localhost", &full())
            .unwrap_err();
        assert_eq!(err, ValidationError::NotCa);
    }

    #[test]
    fn test_toggles_are_independent() {
        let provider = RustCryptoProvider::new();
        let v = validator();

        let no_chain = ValidationPolicy {
            verify_chain: false,
            ..full()
        };
        assert!(v.verify_server(&provider, &[UNTRUSTED_P256], "localhost", &no_chain).is_ok());
        assert_eq!(
            v.verify_server(&provider, &[UNTRUSTED_P256], "wrong.host", &no_chain)
                .unwrap_err(),
            ValidationError::HostnameMismatch
        );

        let no_host = ValidationPolicy {
            verify_hostname: false,
            ..full()
        };
        assert!(v.verify_server(&provider, &[LEAF_P256], "wrong.host", &no_host).is_ok());
        assert_eq!(
            v.verify_server(&provider, &[UNTRUSTED_P256], "localhost", &no_host)
                .unwrap_err(),
            ValidationError::UnknownIssuer
        );
    }

    #[test]
    fn test_empty_chain_always_rejected() {
        let provider = RustCryptoProvider::new();
        let off = ValidationPolicy {
            verify_chain: false,
            verify_hostname: false,
            now: NOW,
        };
        let err = validator().verify_server(&provider, &[], "", &off).unwrap_err();
        assert_eq!(err, ValidationError::EmptyChain);
        assert_eq!(err.alert(), AlertDescription::BadCertificate);
    }

    #[test]
    fn test_bad_trust_anchor_is_config_error() {
        let err = CertificateValidator::new(&[vec![0x30, 0x00]]).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }
}

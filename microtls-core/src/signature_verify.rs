//! Handshake signature verification.
//!
//! Two signatures authenticate the server's key exchange with its
//! certificate key:
//!
//! - TLS 1.3 CertificateVerify (RFC 8446 Section 4.4.3), computed over
//!
//!   ```text
//!   0x20 * 64 || "TLS 1.3, server CertificateVerify" || 0x00 || transcript_hash
//!   ```
//!
//! - TLS 1.2 ServerKeyExchange (RFC 8422 Section 5.4), computed over
//!   `client_random || server_random || ServerECDHParams`.
//!
//! Both are checked whenever a certificate was received, independently of
//! the certificate chain policy.

use microtls_crypto::{CryptoProvider, SignatureAlgorithm};

use crate::error::{Error, ProtocolError, Result};
use crate::messages::CertificateVerify;
use crate::tls12::messages::ServerKeyExchange;
use crate::x509::SubjectPublicKey;

/// Schemes offered in `signature_algorithms` by default.
///
/// The PKCS#1 v1.5 entries only apply to TLS 1.2 ServerKeyExchange.
pub const DEFAULT_SIGNATURE_ALGORITHMS: &[SignatureAlgorithm] = &[
    SignatureAlgorithm::EcdsaSecp256r1Sha256,
    SignatureAlgorithm::EcdsaSecp384r1Sha384,
    SignatureAlgorithm::RsaPssRsaeSha256,
    SignatureAlgorithm::RsaPssRsaeSha384,
    SignatureAlgorithm::RsaPssRsaeSha512,
    SignatureAlgorithm::RsaPkcs1Sha256,
    SignatureAlgorithm::RsaPkcs1Sha384,
    SignatureAlgorithm::RsaPkcs1Sha512,
];

/// Context string for server CertificateVerify signatures.
const SERVER_CONTEXT: &[u8] = b"TLS 1.3, server CertificateVerify";

/// Padding for signature messages (64 spaces).
const SIGNATURE_PADDING: [u8; 64] = [0x20; 64];

/// Bytes covered by a server CertificateVerify signature.
pub fn certificate_verify_message(transcript_hash: &[u8]) -> Vec<u8> {
    let len = SIGNATURE_PADDING.len() + SERVER_CONTEXT.len() + 1 + transcript_hash.len();
    let mut message = Vec::with_capacity(len);
    message.extend_from_slice(&SIGNATURE_PADDING);
    message.extend_from_slice(SERVER_CONTEXT);
    message.push(0x00);
    message.extend_from_slice(transcript_hash);
    message
}

/// Resolve the scheme a signature claims and check it may be used here.
///
/// The scheme must be one the client offered, allowed for the version, and
/// usable with the certificate key. Anything else is `illegal_parameter`.
fn negotiated_scheme(
    code: u16,
    offered: &[SignatureAlgorithm],
    key: &SubjectPublicKey,
    tls13: bool,
) -> Result<SignatureAlgorithm> {
    let scheme = SignatureAlgorithm::from_u16(code)
        .filter(|s| offered.contains(s))
        .filter(|s| !tls13 || s.allowed_in_tls13())
        .filter(|s| key.supports(*s));
    match scheme {
        Some(scheme) => Ok(scheme),
        None => {
            tracing::warn!("Server signed with unacceptable scheme 0x{:04x}", code);
            Err(Error::ProtocolError(ProtocolError::IllegalParameter))
        },
    }
}

fn verify_with(
    provider: &dyn CryptoProvider,
    scheme: SignatureAlgorithm,
    key: &SubjectPublicKey,
    message: &[u8],
    signature: &[u8],
) -> Result<()> {
    let verifier = provider.signature(scheme)?;
    verifier.verify(&key.key, message, signature).map_err(|e| {
        tracing::warn!("{} signature rejected: {}", scheme.name(), e);
        Error::ProtocolError(ProtocolError::DecryptError)
    })
}

/// Verify a TLS 1.3 server CertificateVerify.
///
/// # Errors
///
/// - `ProtocolError(IllegalParameter)` for a scheme that was not offered,
///   is not allowed in TLS 1.3 or does not fit the key
/// - `ProtocolError(DecryptError)` if the signature does not verify
pub fn verify_certificate_verify(
    provider: &dyn CryptoProvider,
    certificate_verify: &CertificateVerify,
    offered: &[SignatureAlgorithm],
    key: &SubjectPublicKey,
    transcript_hash: &[u8],
) -> Result<()> {
    let scheme = negotiated_scheme(certificate_verify.algorithm, offered, key, true)?;
    let message = certificate_verify_message(transcript_hash);
    verify_with(provider, scheme, key, &message, &certificate_verify.signature)
}

/// Verify the signature closing a TLS 1.2 ServerKeyExchange.
///
/// Same errors as [`verify_certificate_verify`]; PKCS#1 v1.5 schemes are
/// accepted here.
pub fn verify_server_key_exchange(
    provider: &dyn CryptoProvider,
    server_key_exchange: &ServerKeyExchange,
    offered: &[SignatureAlgorithm],
    key: &SubjectPublicKey,
    client_random: &[u8; 32],
    server_random: &[u8; 32],
) -> Result<()> {
    let scheme = negotiated_scheme(server_key_exchange.signed.algorithm, offered, key, false)?;
    let message = server_key_exchange.signed_message(client_random, server_random)?;
    verify_with(
        provider,
        scheme,
        key,
        &message,
        &server_key_exchange.signed.signature,
    )
}

/// Sign a server CertificateVerify.
///
/// The engine never signs for itself; in-process peers built on the same
/// message types use this.
pub fn sign_certificate_verify(
    provider: &dyn CryptoProvider,
    scheme: SignatureAlgorithm,
    signing_key: &[u8],
    transcript_hash: &[u8],
) -> Result<CertificateVerify> {
    let message = certificate_verify_message(transcript_hash);
    let signature = provider.signature(scheme)?.sign(signing_key, &message)?;
    Ok(CertificateVerify::new(scheme, signature))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::x509::X509Certificate;
    use microtls_crypto_rustcrypto::RustCryptoProvider;

    const LEAF_P256: &[u8] = include_bytes!("../tests/data/leaf_p256.der");
    const LEAF_P256_KEY: &[u8] = include_bytes!("../tests/data/leaf_p256.key");
    const LEAF_RSA: &[u8] = include_bytes!("../tests/data/leaf_rsa.der");
    const LEAF_RSA_KEY: &[u8] = include_bytes!("../tests/data/leaf_rsa.pk8");

    const OFFERED: &[SignatureAlgorithm] = &[
        SignatureAlgorithm::EcdsaSecp256r1Sha256,
        SignatureAlgorithm::RsaPssRsaeSha256,
        SignatureAlgorithm::RsaPkcs1Sha256,
    ];

    fn key_of(der: &[u8]) -> SubjectPublicKey {
        X509Certificate::parse(der).unwrap().public_key
    }

    #[test]
    fn test_certificate_verify_message_layout() {
        let message = certificate_verify_message(&[0xFF; 32]);

        // 64 (padding) + 33 (context) + 1 (separator) + 32 (hash)
        assert_eq!(message.len(), 130);
        assert!(message[..64].iter().all(|&b| b == 0x20));
        assert_eq!(&message[64..97], b"TLS 1.3, server CertificateVerify");
        assert_eq!(message[97], 0x00);
        assert_eq!(&message[98..], &[0xFF; 32]);
    }

    #[test]
    fn test_certificate_verify_ecdsa_and_pss() {
        let provider = RustCryptoProvider::default();
        let hash = [0x42; 32];
        let cases = [
            (LEAF_P256, LEAF_P256_KEY, SignatureAlgorithm::EcdsaSecp256r1Sha256),
            (LEAF_RSA, LEAF_RSA_KEY, SignatureAlgorithm::RsaPssRsaeSha256),
        ];
        for (cert, signing_key, scheme) in cases {
            let key = key_of(cert);
            let cv = sign_certificate_verify(&provider, scheme, signing_key, &hash).unwrap();
            verify_certificate_verify(&provider, &cv, OFFERED, &key, &hash).unwrap();

            let err = verify_certificate_verify(&provider, &cv, OFFERED, &key, &[0x43; 32])
                .unwrap_err();
            assert_eq!(err, Error::ProtocolError(ProtocolError::DecryptError));
        }
    }

    #[test]
    fn test_pkcs1_rejected_in_tls13() {
        let provider = RustCryptoProvider::default();
        let hash = [1; 32];
        let scheme = SignatureAlgorithm::RsaPkcs1Sha256;
        let cv = sign_certificate_verify(&provider, scheme, LEAF_RSA_KEY, &hash).unwrap();
        let err = verify_certificate_verify(&provider, &cv, OFFERED, &key_of(LEAF_RSA), &hash)
            .unwrap_err();
        assert_eq!(err, Error::ProtocolError(ProtocolError::IllegalParameter));
    }

    #[test]
    fn test_scheme_must_fit_key_and_offer() {
        let provider = RustCryptoProvider::default();
        let hash = [1; 32];
        let cv = sign_certificate_verify(
            &provider,
            SignatureAlgorithm::EcdsaSecp256r1Sha256,
            LEAF_P256_KEY,
            &hash,
        )
        .unwrap();

        let err = verify_certificate_verify(&provider, &cv, OFFERED, &key_of(LEAF_RSA), &hash)
            .unwrap_err();
        assert_eq!(err, Error::ProtocolError(ProtocolError::IllegalParameter));

        let rsa_only = [SignatureAlgorithm::RsaPssRsaeSha256];
        let err = verify_certificate_verify(&provider, &cv, &rsa_only, &key_of(LEAF_P256), &hash)
            .unwrap_err();
        assert_eq!(err, Error::ProtocolError(ProtocolError::IllegalParameter));
    }

    #[test]
    fn test_server_key_exchange_signature() {
        let provider = RustCryptoProvider::default();
        let client_random = [1u8; 32];
        let server_random = [2u8; 32];
        let mut ske = ServerKeyExchange {
            named_curve: 0x001D,
            public_key: vec![9; 32],
            signed: CertificateVerify::new(SignatureAlgorithm::RsaPkcs1Sha256, Vec::new()),
        };
        let message = ske.signed_message(&client_random, &server_random).unwrap();
        ske.signed.signature = provider
            .signature(SignatureAlgorithm::RsaPkcs1Sha256)
            .unwrap()
            .sign(LEAF_RSA_KEY, &message)
            .unwrap();

        let key = key_of(LEAF_RSA);
        verify_server_key_exchange(&provider, &ske, OFFERED, &key, &client_random, &server_random)
            .unwrap();

        let (c, s) = (&server_random, &client_random);
        let err = verify_server_key_exchange(&provider, &ske, OFFERED, &key, c, s).unwrap_err();
        assert_eq!(err, Error::ProtocolError(ProtocolError::DecryptError));
    }
}

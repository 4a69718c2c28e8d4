//! Digital signature implementations using `p256`, `p384`, `ed25519-dalek`
//! and `rsa`.
//!
//! Signing key encodings: ECDSA takes the raw scalar, Ed25519 the 32-byte
//! seed, RSA a PKCS#8 (or PKCS#1) DER private key.

use microtls_crypto::{Error, Result, Signature, SignatureAlgorithm};
use rand::rngs::OsRng;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{Pkcs1v15Sign, Pss, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256, Sha384, Sha512};

/// Create a signature instance for the specified algorithm.
pub fn create_signature(algorithm: SignatureAlgorithm) -> Result<Box<dyn Signature>> {
    match algorithm {
        SignatureAlgorithm::Ed25519 => Ok(Box::new(Ed25519Sig)),
        SignatureAlgorithm::EcdsaSecp256r1Sha256 => Ok(Box::new(EcdsaP256Sig)),
        SignatureAlgorithm::EcdsaSecp384r1Sha384 => Ok(Box::new(EcdsaP384Sig)),
        SignatureAlgorithm::RsaPssRsaeSha256
        | SignatureAlgorithm::RsaPssRsaeSha384
        | SignatureAlgorithm::RsaPssRsaeSha512
        | SignatureAlgorithm::RsaPkcs1Sha256
        | SignatureAlgorithm::RsaPkcs1Sha384
        | SignatureAlgorithm::RsaPkcs1Sha512 => Ok(Box::new(RsaSig { algorithm })),
    }
}

/// Ed25519 signature implementation.
#[derive(Debug)]
struct Ed25519Sig;

impl Signature for Ed25519Sig {
    fn sign(&self, signing_key: &[u8], message: &[u8]) -> Result<Vec<u8>> {
        use ed25519_dalek::Signer;

        let seed: [u8; 32] = signing_key
            .try_into()
            .map_err(|_| Error::InvalidPrivateKey)?;
        let key = ed25519_dalek::SigningKey::from_bytes(&seed);
        Ok(key.sign(message).to_bytes().to_vec())
    }

    fn verify(&self, verifying_key: &[u8], message: &[u8], signature: &[u8]) -> Result<()> {
        use ed25519_dalek::Verifier;

        let key_bytes: [u8; 32] = verifying_key
            .try_into()
            .map_err(|_| Error::InvalidPublicKey)?;
        let key = ed25519_dalek::VerifyingKey::from_bytes(&key_bytes)
            .map_err(|_| Error::InvalidPublicKey)?;
        let sig =
            ed25519_dalek::Signature::from_slice(signature).map_err(|_| Error::InvalidSignature)?;
        key.verify(message, &sig)
            .map_err(|_| Error::SignatureVerificationFailed)
    }

    fn algorithm(&self) -> SignatureAlgorithm {
        SignatureAlgorithm::Ed25519
    }
}

/// ECDSA over P-256 with SHA-256, DER-encoded signatures.
#[derive(Debug)]
struct EcdsaP256Sig;

impl Signature for EcdsaP256Sig {
    fn sign(&self, signing_key: &[u8], message: &[u8]) -> Result<Vec<u8>> {
        use p256::ecdsa::signature::Signer;

        let key =
            p256::ecdsa::SigningKey::from_slice(signing_key).map_err(|_| Error::InvalidPrivateKey)?;
        let sig: p256::ecdsa::Signature = key.sign(message);
        Ok(sig.to_der().as_bytes().to_vec())
    }

    fn verify(&self, verifying_key: &[u8], message: &[u8], signature: &[u8]) -> Result<()> {
        use p256::ecdsa::signature::Verifier;

        let key = p256::ecdsa::VerifyingKey::from_sec1_bytes(verifying_key)
            .map_err(|_| Error::InvalidPublicKey)?;
        let sig = p256::ecdsa::Signature::from_der(signature).map_err(|_| Error::InvalidSignature)?;
        key.verify(message, &sig)
            .map_err(|_| Error::SignatureVerificationFailed)
    }

    fn algorithm(&self) -> SignatureAlgorithm {
        SignatureAlgorithm::EcdsaSecp256r1Sha256
    }
}

/// ECDSA over P-384 with SHA-384, DER-encoded signatures.
#[derive(Debug)]
struct EcdsaP384Sig;

impl Signature for EcdsaP384Sig {
    fn sign(&self, signing_key: &[u8], message: &[u8]) -> Result<Vec<u8>> {
        use p384::ecdsa::signature::Signer;

        let key =
            p384::ecdsa::SigningKey::from_slice(signing_key).map_err(|_| Error::InvalidPrivateKey)?;
        let sig: p384::ecdsa::Signature = key.sign(message);
        Ok(sig.to_der().as_bytes().to_vec())
    }

    fn verify(&self, verifying_key: &[u8], message: &[u8], signature: &[u8]) -> Result<()> {
        use p384::ecdsa::signature::Verifier;

        let key = p384::ecdsa::VerifyingKey::from_sec1_bytes(verifying_key)
            .map_err(|_| Error::InvalidPublicKey)?;
        let sig = p384::ecdsa::Signature::from_der(signature).map_err(|_| Error::InvalidSignature)?;
        key.verify(message, &sig)
            .map_err(|_| Error::SignatureVerificationFailed)
    }

    fn algorithm(&self) -> SignatureAlgorithm {
        SignatureAlgorithm::EcdsaSecp384r1Sha384
    }
}

/// RSASSA-PSS (salt length = digest length) and RSASSA-PKCS1-v1_5.
#[derive(Debug)]
struct RsaSig {
    algorithm: SignatureAlgorithm,
}

impl RsaSig {
    fn digest(&self, message: &[u8]) -> Vec<u8> {
        match self.algorithm {
            SignatureAlgorithm::RsaPssRsaeSha256 | SignatureAlgorithm::RsaPkcs1Sha256 => {
                Sha256::digest(message).to_vec()
            }
            SignatureAlgorithm::RsaPssRsaeSha384 | SignatureAlgorithm::RsaPkcs1Sha384 => {
                Sha384::digest(message).to_vec()
            }
            _ => Sha512::digest(message).to_vec(),
        }
    }
}

fn parse_rsa_private_key(der: &[u8]) -> Result<RsaPrivateKey> {
    RsaPrivateKey::from_pkcs8_der(der)
        .or_else(|_| RsaPrivateKey::from_pkcs1_der(der))
        .map_err(|_| Error::InvalidPrivateKey)
}

impl Signature for RsaSig {
    fn sign(&self, signing_key: &[u8], message: &[u8]) -> Result<Vec<u8>> {
        let key = parse_rsa_private_key(signing_key)?;
        let hashed = self.digest(message);
        let mut rng = OsRng;
        let result = match self.algorithm {
            SignatureAlgorithm::RsaPssRsaeSha256 => {
                key.sign_with_rng(&mut rng, Pss::new::<Sha256>(), &hashed)
            }
            SignatureAlgorithm::RsaPssRsaeSha384 => {
                key.sign_with_rng(&mut rng, Pss::new::<Sha384>(), &hashed)
            }
            SignatureAlgorithm::RsaPssRsaeSha512 => {
                key.sign_with_rng(&mut rng, Pss::new::<Sha512>(), &hashed)
            }
            SignatureAlgorithm::RsaPkcs1Sha256 => key.sign(Pkcs1v15Sign::new::<Sha256>(), &hashed),
            SignatureAlgorithm::RsaPkcs1Sha384 => key.sign(Pkcs1v15Sign::new::<Sha384>(), &hashed),
            SignatureAlgorithm::RsaPkcs1Sha512 => key.sign(Pkcs1v15Sign::new::<Sha512>(), &hashed),
            other => {
                return Err(Error::UnsupportedAlgorithm(other.name().to_string()));
            }
        };
        result.map_err(|e| Error::Internal(format!("RSA signing failed: {}", e)))
    }

    fn verify(&self, verifying_key: &[u8], message: &[u8], signature: &[u8]) -> Result<()> {
        let key = RsaPublicKey::from_public_key_der(verifying_key)
            .map_err(|_| Error::InvalidPublicKey)?;
        let hashed = self.digest(message);
        let result = match self.algorithm {
            SignatureAlgorithm::RsaPssRsaeSha256 => {
                key.verify(Pss::new::<Sha256>(), &hashed, signature)
            }
            SignatureAlgorithm::RsaPssRsaeSha384 => {
                key.verify(Pss::new::<Sha384>(), &hashed, signature)
            }
            SignatureAlgorithm::RsaPssRsaeSha512 => {
                key.verify(Pss::new::<Sha512>(), &hashed, signature)
            }
            SignatureAlgorithm::RsaPkcs1Sha256 => {
                key.verify(Pkcs1v15Sign::new::<Sha256>(), &hashed, signature)
            }
            SignatureAlgorithm::RsaPkcs1Sha384 => {
                key.verify(Pkcs1v15Sign::new::<Sha384>(), &hashed, signature)
            }
            SignatureAlgorithm::RsaPkcs1Sha512 => {
                key.verify(Pkcs1v15Sign::new::<Sha512>(), &hashed, signature)
            }
            other => {
                return Err(Error::UnsupportedAlgorithm(other.name().to_string()));
            }
        };
        result.map_err(|_| Error::SignatureVerificationFailed)
    }

    fn algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }
}

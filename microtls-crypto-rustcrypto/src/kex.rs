//! Ephemeral ECDH using `x25519-dalek`, `p256` and `p384`.

use microtls_crypto::{
    Error, KeyExchange, KeyExchangeAlgorithm, PrivateKey, PublicKey, Result, SharedSecret,
};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;
use rand::RngCore;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

/// Create a key exchange instance for the specified group.
pub fn create_key_exchange(algorithm: KeyExchangeAlgorithm) -> Result<Box<dyn KeyExchange>> {
    match algorithm {
        KeyExchangeAlgorithm::X25519 => Ok(Box::new(X25519Kex)),
        KeyExchangeAlgorithm::Secp256r1 => Ok(Box::new(P256Kex)),
        KeyExchangeAlgorithm::Secp384r1 => Ok(Box::new(P384Kex)),
    }
}

/// X25519 (RFC 7748).
#[derive(Debug)]
struct X25519Kex;

impl KeyExchange for X25519Kex {
    fn generate_keypair(&self) -> Result<(PrivateKey, PublicKey)> {
        let mut scalar = Zeroizing::new([0u8; 32]);
        OsRng
            .try_fill_bytes(scalar.as_mut())
            .map_err(|_| Error::RandomGenerationFailed)?;
        let public = x25519_dalek::x25519(*scalar, x25519_dalek::X25519_BASEPOINT_BYTES);
        Ok((
            PrivateKey::from_bytes(scalar.to_vec()),
            PublicKey::from_bytes(public.to_vec()),
        ))
    }

    fn exchange(&self, private_key: &PrivateKey, peer_public_key: &[u8]) -> Result<SharedSecret> {
        let scalar: [u8; 32] = private_key
            .as_bytes()
            .try_into()
            .map_err(|_| Error::InvalidPrivateKey)?;
        let scalar = Zeroizing::new(scalar);
        let peer: [u8; 32] = peer_public_key
            .try_into()
            .map_err(|_| Error::InvalidPublicKey)?;

        let shared = Zeroizing::new(x25519_dalek::x25519(*scalar, peer));
        // RFC 7748 section 6.1: reject low-order points.
        if bool::from(shared.ct_eq(&[0u8; 32])) {
            return Err(Error::KeyExchangeFailed);
        }
        Ok(SharedSecret::from_bytes(shared.to_vec()))
    }

    fn algorithm(&self) -> KeyExchangeAlgorithm {
        KeyExchangeAlgorithm::X25519
    }
}

/// ECDH over NIST P-256 with uncompressed SEC1 points.
#[derive(Debug)]
struct P256Kex;

impl KeyExchange for P256Kex {
    fn generate_keypair(&self) -> Result<(PrivateKey, PublicKey)> {
        let secret = p256::SecretKey::random(&mut OsRng);
        let public = secret.public_key().to_encoded_point(false);
        Ok((
            PrivateKey::from_bytes(secret.to_bytes().to_vec()),
            PublicKey::from_bytes(public.as_bytes().to_vec()),
        ))
    }

    fn exchange(&self, private_key: &PrivateKey, peer_public_key: &[u8]) -> Result<SharedSecret> {
        let secret = p256::SecretKey::from_slice(private_key.as_bytes())
            .map_err(|_| Error::InvalidPrivateKey)?;
        if peer_public_key.len() != KeyExchangeAlgorithm::Secp256r1.public_key_size() {
            return Err(Error::InvalidPublicKey);
        }
        let peer = p256::PublicKey::from_sec1_bytes(peer_public_key)
            .map_err(|_| Error::InvalidPublicKey)?;
        let shared = p256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), peer.as_affine());
        Ok(SharedSecret::from_bytes(shared.raw_secret_bytes().to_vec()))
    }

    fn algorithm(&self) -> KeyExchangeAlgorithm {
        KeyExchangeAlgorithm::Secp256r1
    }
}

/// ECDH over NIST P-384 with uncompressed SEC1 points.
#[derive(Debug)]
struct P384Kex;

impl KeyExchange for P384Kex {
    fn generate_keypair(&self) -> Result<(PrivateKey, PublicKey)> {
        let secret = p384::SecretKey::random(&mut OsRng);
        let public = secret.public_key().to_encoded_point(false);
        Ok((
            PrivateKey::from_bytes(secret.to_bytes().to_vec()),
            PublicKey::from_bytes(public.as_bytes().to_vec()),
        ))
    }

    fn exchange(&self, private_key: &PrivateKey, peer_public_key: &[u8]) -> Result<SharedSecret> {
        let secret = p384::SecretKey::from_slice(private_key.as_bytes())
            .map_err(|_| Error::InvalidPrivateKey)?;
        if peer_public_key.len() != KeyExchangeAlgorithm::Secp384r1.public_key_size() {
            return Err(Error::InvalidPublicKey);
        }
        let peer = p384::PublicKey::from_sec1_bytes(peer_public_key)
            .map_err(|_| Error::InvalidPublicKey)?;
        let shared = p384::ecdh::diffie_hellman(secret.to_nonzero_scalar(), peer.as_affine());
        Ok(SharedSecret::from_bytes(shared.raw_secret_bytes().to_vec()))
    }

    fn algorithm(&self) -> KeyExchangeAlgorithm {
        KeyExchangeAlgorithm::Secp384r1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agreement_all_groups() {
        for group in [
            KeyExchangeAlgorithm::X25519,
            KeyExchangeAlgorithm::Secp256r1,
            KeyExchangeAlgorithm::Secp384r1,
        ] {
            let kex = create_key_exchange(group).unwrap();
            let (a_priv, a_pub) = kex.generate_keypair().unwrap();
            let (b_priv, b_pub) = kex.generate_keypair().unwrap();
            assert_eq!(a_pub.as_bytes().len(), group.public_key_size());

            let ab = kex.exchange(&a_priv, b_pub.as_bytes()).unwrap();
            let ba = kex.exchange(&b_priv, a_pub.as_bytes()).unwrap();
            assert_eq!(ab.as_bytes(), ba.as_bytes());
            assert_eq!(ab.as_bytes().len(), group.shared_secret_size());
        }
    }

    /// RFC 7748 section 6.1.
    #[test]
    fn test_x25519_rfc7748() {
        let kex = create_key_exchange(KeyExchangeAlgorithm::X25519).unwrap();
        let alice = PrivateKey::from_bytes(
            hex::decode("77076d0a7318a57d3c16c17251b26645df4c2f87ebc0992ab177fba51db92c2a")
                .unwrap(),
        );
        let bob_public =
            hex::decode("de9edb7d7b7dc1b4d35b61c2ece435373f8343c85b78674dadfc7e146f882b4f")
                .unwrap();
        let shared = kex.exchange(&alice, &bob_public).unwrap();
        assert_eq!(
            hex::encode(shared.as_bytes()),
            "4a5d9d5ba4ce2de1728e3bf480350f25e07e21c947d19e3376f09b3c1e161742"
        );
    }

    #[test]
    fn test_x25519_rejects_low_order_point() {
        let kex = create_key_exchange(KeyExchangeAlgorithm::X25519).unwrap();
        let (private, _) = kex.generate_keypair().unwrap();
        assert_eq!(
            kex.exchange(&private, &[0u8; 32]).unwrap_err(),
            Error::KeyExchangeFailed
        );
    }

    #[test]
    fn test_p256_rejects_bad_point() {
        let kex = create_key_exchange(KeyExchangeAlgorithm::Secp256r1).unwrap();
        let (private, _) = kex.generate_keypair().unwrap();
        let mut bogus = vec![0x04];
        bogus.extend_from_slice(&[0xFF; 64]);
        assert_eq!(
            kex.exchange(&private, &bogus).unwrap_err(),
            Error::InvalidPublicKey
        );
        assert_eq!(
            kex.exchange(&private, &[0x04; 10]).unwrap_err(),
            Error::InvalidPublicKey
        );
    }
}

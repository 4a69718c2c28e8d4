//! HKDF (RFC 5869) and the TLS 1.2 PRF (RFC 5246 section 5).

use hkdf::Hkdf;
use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use microtls_crypto::{Error, Kdf, KdfAlgorithm, Result};
use sha2::{Sha256, Sha384};

/// Create a KDF instance for the specified algorithm.
pub fn create_kdf(algorithm: KdfAlgorithm) -> Result<Box<dyn Kdf>> {
    Ok(Box::new(RustCryptoKdf { algorithm }))
}

#[derive(Debug)]
struct RustCryptoKdf {
    algorithm: KdfAlgorithm,
}

impl Kdf for RustCryptoKdf {
    fn extract(&self, salt: &[u8], ikm: &[u8]) -> Vec<u8> {
        match self.algorithm {
            KdfAlgorithm::HkdfSha256 => Hkdf::<Sha256>::extract(Some(salt), ikm).0.to_vec(),
            KdfAlgorithm::HkdfSha384 => Hkdf::<Sha384>::extract(Some(salt), ikm).0.to_vec(),
            // The PRF has no extract step; the secret feeds P_hash directly.
            KdfAlgorithm::TlsPrfSha256 | KdfAlgorithm::TlsPrfSha384 => ikm.to_vec(),
        }
    }

    fn expand(&self, prk: &[u8], info: &[u8], length: usize) -> Result<Vec<u8>> {
        match self.algorithm {
            KdfAlgorithm::HkdfSha256 => {
                let hkdf = Hkdf::<Sha256>::from_prk(prk).map_err(|_| Error::InvalidLength)?;
                let mut okm = vec![0u8; length];
                hkdf.expand(info, &mut okm)
                    .map_err(|_| Error::InvalidLength)?;
                Ok(okm)
            }
            KdfAlgorithm::HkdfSha384 => {
                let hkdf = Hkdf::<Sha384>::from_prk(prk).map_err(|_| Error::InvalidLength)?;
                let mut okm = vec![0u8; length];
                hkdf.expand(info, &mut okm)
                    .map_err(|_| Error::InvalidLength)?;
                Ok(okm)
            }
            KdfAlgorithm::TlsPrfSha256 => p_hash::<Hmac<Sha256>>(prk, info, length),
            KdfAlgorithm::TlsPrfSha384 => p_hash::<Hmac<Sha384>>(prk, info, length),
        }
    }

    fn algorithm(&self) -> KdfAlgorithm {
        self.algorithm
    }
}

/// `P_hash(secret, seed)` truncated to `length` bytes.
///
/// ```text
/// A(0) = seed
/// A(i) = HMAC(secret, A(i-1))
/// P_hash = HMAC(secret, A(1) || seed) || HMAC(secret, A(2) || seed) || ...
/// ```
fn p_hash<M>(secret: &[u8], seed: &[u8], length: usize) -> Result<Vec<u8>>
where
    M: Mac + KeyInit + Clone,
{
    let keyed = <M as Mac>::new_from_slice(secret).map_err(|_| Error::InvalidLength)?;

    let mut output = Vec::with_capacity(length);
    let mut a = {
        let mut mac = keyed.clone();
        mac.update(seed);
        mac.finalize().into_bytes().to_vec()
    };

    while output.len() < length {
        let mut mac = keyed.clone();
        mac.update(&a);
        mac.update(seed);
        let block = mac.finalize().into_bytes();
        let take = (length - output.len()).min(block.len());
        output.extend_from_slice(&block[..take]);

        let mut mac = keyed.clone();
        mac.update(&a);
        a = mac.finalize().into_bytes().to_vec();
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// RFC 5869 test case 1.
    #[test]
    fn test_hkdf_sha256_rfc5869() {
        let kdf = create_kdf(KdfAlgorithm::HkdfSha256).unwrap();
        let ikm = [0x0b; 22];
        let salt = hex::decode("000102030405060708090a0b0c").unwrap();
        let info = hex::decode("f0f1f2f3f4f5f6f7f8f9").unwrap();

        let prk = kdf.extract(&salt, &ikm);
        assert_eq!(
            hex::encode(&prk),
            "077709362c2e32df0ddc3f0dc47bba6390b6c73bb50f9c3122ec844ad7c2b3e5"
        );

        let okm = kdf.expand(&prk, &info, 42).unwrap();
        assert_eq!(
            hex::encode(okm),
            "3cb25f25faacd57a90434f64d0362f2a2d2d0a90cf1a5a4c5db02d56ecc4c5bf\
             34007208d5b887185865"
        );
    }

    #[test]
    fn test_hkdf_expand_too_long() {
        let kdf = create_kdf(KdfAlgorithm::HkdfSha256).unwrap();
        let prk = [1u8; 32];
        assert_eq!(kdf.expand(&prk, b"", 255 * 32 + 1), Err(Error::InvalidLength));
    }

    #[test]
    fn test_prf_extract_is_identity() {
        let kdf = create_kdf(KdfAlgorithm::TlsPrfSha256).unwrap();
        assert_eq!(kdf.extract(b"ignored", b"secret"), b"secret".to_vec());
    }

    #[test]
    fn test_prf_output_is_prefix_stable() {
        let kdf = create_kdf(KdfAlgorithm::TlsPrfSha384).unwrap();
        let long = kdf.expand(b"secret", b"label seed", 100).unwrap();
        let short = kdf.expand(b"secret", b"label seed", 13).unwrap();
        assert_eq!(long.len(), 100);
        assert_eq!(&long[..13], &short[..]);
    }
}

//! HMAC implementations using `hmac`.

use hmac::{Hmac as RustHmac, Mac};
use microtls_crypto::{Error, HashAlgorithm, Hmac, Result};
use sha2::{Sha256, Sha384};

type HmacSha256 = RustHmac<Sha256>;
type HmacSha384 = RustHmac<Sha384>;

/// Create an HMAC instance for the specified hash algorithm.
pub fn create_hmac(algorithm: HashAlgorithm, key: &[u8]) -> Result<Box<dyn Hmac>> {
    match algorithm {
        HashAlgorithm::Sha256 => Ok(Box::new(HmacSha256Impl {
            mac: HmacSha256::new_from_slice(key).map_err(|_| Error::InvalidKeySize {
                expected: 32,
                actual: key.len(),
            })?,
        })),
        HashAlgorithm::Sha384 => Ok(Box::new(HmacSha384Impl {
            mac: HmacSha384::new_from_slice(key).map_err(|_| Error::InvalidKeySize {
                expected: 48,
                actual: key.len(),
            })?,
        })),
    }
}

/// HMAC-SHA256 (RFC 2104) with incremental updates.
struct HmacSha256Impl {
    mac: HmacSha256,
}

impl Hmac for HmacSha256Impl {
    fn update(&mut self, data: &[u8]) {
        self.mac.update(data);
    }

    fn finalize(self: Box<Self>) -> Vec<u8> {
        self.mac.finalize().into_bytes().to_vec()
    }

    fn algorithm(&self) -> HashAlgorithm {
        HashAlgorithm::Sha256
    }
}

/// HMAC-SHA384 (RFC 2104) with incremental updates.
struct HmacSha384Impl {
    mac: HmacSha384,
}

impl Hmac for HmacSha384Impl {
    fn update(&mut self, data: &[u8]) {
        self.mac.update(data);
    }

    fn finalize(self: Box<Self>) -> Vec<u8> {
        self.mac.finalize().into_bytes().to_vec()
    }

    fn algorithm(&self) -> HashAlgorithm {
        HashAlgorithm::Sha384
    }
}

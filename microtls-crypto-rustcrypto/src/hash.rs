//! SHA-2 hash implementations using `sha2`.

use microtls_crypto::{Hash, HashAlgorithm, Result};
use sha2::{Digest, Sha256, Sha384};

/// Create a hash instance for the specified algorithm.
pub fn create_hash(algorithm: HashAlgorithm) -> Result<Box<dyn Hash>> {
    match algorithm {
        HashAlgorithm::Sha256 => Ok(Box::new(Sha256Hash {
            hasher: Sha256::new(),
        })),
        HashAlgorithm::Sha384 => Ok(Box::new(Sha384Hash {
            hasher: Sha384::new(),
        })),
    }
}

/// SHA-256 (FIPS 180-4), 32-byte output.
struct Sha256Hash {
    hasher: Sha256,
}

impl Hash for Sha256Hash {
    fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    fn finalize(self: Box<Self>) -> Vec<u8> {
        self.hasher.finalize().to_vec()
    }

    fn algorithm(&self) -> HashAlgorithm {
        HashAlgorithm::Sha256
    }
}

/// SHA-384 (FIPS 180-4), 48-byte output.
struct Sha384Hash {
    hasher: Sha384,
}

impl Hash for Sha384Hash {
    fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    fn finalize(self: Box<Self>) -> Vec<u8> {
        self.hasher.finalize().to_vec()
    }

    fn algorithm(&self) -> HashAlgorithm {
        HashAlgorithm::Sha384
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_abc() {
        let mut hash = create_hash(HashAlgorithm::Sha256).unwrap();
        hash.update(b"a");
        hash.update(b"bc");
        assert_eq!(
            hex::encode(hash.finalize()),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_sha384_empty() {
        let hash = create_hash(HashAlgorithm::Sha384).unwrap();
        assert_eq!(
            hex::encode(hash.finalize()),
            "38b060a751ac96384cd9327eb1b1e36a21fdb71114be07434c0cc7bf63f6e1da\
             274edebfe76f65fbd51ad2f14898b95b"
        );
    }
}

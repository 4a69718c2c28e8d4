//! Cryptographically Secure Random Number Generator (CSPRNG) interface.

use crate::Result;

/// CSPRNG used for hello randoms, session ids and ephemeral keys.
pub trait Random: Send + Sync {
    /// Fill `dest` with random bytes.
    fn fill(&self, dest: &mut [u8]) -> Result<()>;

    /// Generate `len` random bytes.
    fn generate(&self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.fill(&mut buf)?;
        Ok(buf)
    }
}

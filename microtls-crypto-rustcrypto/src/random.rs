//! Operating-system randomness via `rand::rngs::OsRng`.

use microtls_crypto::{Error, Random, Result};
use rand::rngs::OsRng;
use rand::RngCore;

/// CSPRNG backed by the operating system entropy source.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandom;

impl Random for OsRandom {
    fn fill(&self, dest: &mut [u8]) -> Result<()> {
        OsRng
            .try_fill_bytes(dest)
            .map_err(|_| Error::RandomGenerationFailed)
    }
}

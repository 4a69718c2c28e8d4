//! HMAC (Hash-based Message Authentication Code) interface.

use crate::HashAlgorithm;

/// HMAC instance, keyed at construction by [`crate::CryptoProvider::hmac`].
pub trait Hmac: Send {
    /// Absorb more input.
    fn update(&mut self, data: &[u8]);

    /// Finish and return the tag, consuming the instance.
    fn finalize(self: Box<Self>) -> Vec<u8>;

    /// Finish and compare against `tag` in constant time.
    fn verify(self: Box<Self>, tag: &[u8]) -> bool {
        use subtle::ConstantTimeEq;
        let computed = self.finalize();
        computed.ct_eq(tag).into()
    }

    /// Get the underlying hash algorithm.
    fn algorithm(&self) -> HashAlgorithm;

    /// Get the tag size in bytes.
    fn output_size(&self) -> usize {
        self.algorithm().output_size()
    }
}

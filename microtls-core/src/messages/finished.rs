//! Finished message (RFC 8446 Section 4.4.4, RFC 5246 Section 7.4.9).

use crate::error::{Error, Result};

/// Finished message.
///
/// Contains verify_data: an HMAC over the transcript in TLS 1.3, 12 PRF
/// bytes in TLS 1.2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finished {
    /// Verify data
    pub verify_data: Vec<u8>,
}

impl Finished {
    /// Create a new Finished message.
    pub fn new(verify_data: Vec<u8>) -> Self {
        Self { verify_data }
    }

    /// Encode to bytes.
    pub fn encode(&self) -> Vec<u8> {
        self.verify_data.clone()
    }

    /// Decode a body whose length must be `expected_len`.
    pub fn decode(data: &[u8], expected_len: usize) -> Result<Self> {
        if data.len() != expected_len {
            return Err(Error::InvalidMessage(format!(
                "Finished is {} bytes, expected {}",
                data.len(),
                expected_len
            )));
        }
        Ok(Self {
            verify_data: data.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finished_length_checked() {
        assert!(Finished::decode(&[0; 32], 32).is_ok());
        assert!(Finished::decode(&[0; 31], 32).is_err());
        assert_eq!(Finished::decode(&[1; 12], 12).unwrap().encode(), vec![1; 12]);
    }
}

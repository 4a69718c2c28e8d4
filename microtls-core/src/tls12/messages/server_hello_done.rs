//! ServerHelloDone Message (TLS 1.2 only, RFC 5246 Section 7.4.5)
//!
//! Empty body; marks the end of the server's first flight.

use crate::error::{Error, Result};

/// ServerHelloDone message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerHelloDone;

impl ServerHelloDone {
    /// Encode the (empty) message body.
    pub fn encode(&self) -> Vec<u8> {
        Vec::new()
    }

    /// Decode the message body, which must be empty.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if !data.is_empty() {
            return Err(Error::InvalidMessage("ServerHelloDone must be empty".into()));
        }
        Ok(ServerHelloDone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_hello_done() {
        assert!(ServerHelloDone.encode().is_empty());
        assert!(ServerHelloDone::decode(&[]).is_ok());
        assert!(ServerHelloDone::decode(&[0]).is_err());
    }
}

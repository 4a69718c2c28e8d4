//! KeyUpdate message (RFC 8446 Section 4.6.3).

use crate::error::{Error, ProtocolError, Result};

/// KeyUpdate message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyUpdate {
    /// update_not_requested (0)
    UpdateNotRequested,
    /// update_requested (1): the receiver must answer with its own KeyUpdate
    UpdateRequested,
}

impl KeyUpdate {
    /// Encode to bytes.
    pub fn encode(self) -> Vec<u8> {
        match self {
            KeyUpdate::UpdateNotRequested => vec![0],
            KeyUpdate::UpdateRequested => vec![1],
        }
    }

    /// Decode from bytes.
    pub fn decode(data: &[u8]) -> Result<Self> {
        match data {
            [0] => Ok(KeyUpdate::UpdateNotRequested),
            [1] => Ok(KeyUpdate::UpdateRequested),
            [_] => Err(Error::ProtocolError(ProtocolError::IllegalParameter)),
            _ => Err(Error::InvalidMessage("KeyUpdate must be 1 byte".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_update() {
        assert_eq!(KeyUpdate::decode(&[1]).unwrap(), KeyUpdate::UpdateRequested);
        assert_eq!(KeyUpdate::UpdateNotRequested.encode(), vec![0]);
        assert_eq!(
            KeyUpdate::decode(&[2]),
            Err(Error::ProtocolError(ProtocolError::IllegalParameter))
        );
        assert!(matches!(
            KeyUpdate::decode(&[]),
            Err(Error::InvalidMessage(_))
        ));
    }
}

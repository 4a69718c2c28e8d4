//! TLS alert protocol.

pub use crate::error::AlertDescription;

use crate::error::{Error, Result};

/// Alert level (RFC 8446 Section 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AlertLevel {
    /// Warning (1) - Not used in TLS 1.3 except for close_notify
    Warning = 1,

    /// Fatal (2)
    Fatal = 2,
}

impl AlertLevel {
    /// Create from wire format (u8).
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(AlertLevel::Warning),
            2 => Some(AlertLevel::Fatal),
            _ => None,
        }
    }

    /// Convert to wire format (u8).
    pub const fn to_u8(self) -> u8 {
        self as u8
    }
}

/// TLS alert message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alert {
    /// Alert level
    pub level: AlertLevel,

    /// Alert description
    pub description: AlertDescription,
}

impl Alert {
    /// Encoded size of an alert.
    pub const ENCODED_LEN: usize = 2;

    /// Create a new alert.
    pub fn new(level: AlertLevel, description: AlertDescription) -> Self {
        Self { level, description }
    }

    /// Create a fatal alert.
    pub fn fatal(description: AlertDescription) -> Self {
        Self {
            level: AlertLevel::Fatal,
            description,
        }
    }

    /// Create a close_notify alert.
    pub fn close_notify() -> Self {
        Self {
            level: AlertLevel::Warning,
            description: AlertDescription::CloseNotify,
        }
    }

    /// Encode the alert to bytes.
    pub fn encode(&self) -> [u8; 2] {
        [self.level.to_u8(), self.description.to_u8()]
    }

    /// Encode the alert into `buf`, returning the bytes written.
    pub fn encode_into(&self, buf: &mut [u8]) -> Result<usize> {
        if buf.len() < Self::ENCODED_LEN {
            return Err(Error::BufferTooSmall {
                needed: Self::ENCODED_LEN,
            });
        }
        buf[..Self::ENCODED_LEN].copy_from_slice(&self.encode());
        Ok(Self::ENCODED_LEN)
    }

    /// Decode an alert from exactly two bytes.
    ///
    /// Unknown description codes are kept as [`AlertDescription::Unknown`];
    /// only the level byte and the length can make this fail.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() != Self::ENCODED_LEN {
            return Err(Error::InvalidMessage(format!(
                "Alert must be 2 bytes, got {}",
                data.len()
            )));
        }

        let level = AlertLevel::from_u8(data[0])
            .ok_or_else(|| Error::InvalidMessage("Invalid alert level".into()))?;
        let description = AlertDescription::from_u8(data[1]);

        Ok(Self { level, description })
    }

    /// Check if this alert is fatal.
    pub fn is_fatal(&self) -> bool {
        self.level == AlertLevel::Fatal || self.description.is_fatal()
    }

    /// Whether this is the graceful end-of-stream marker.
    pub fn is_close_notify(&self) -> bool {
        self.description == AlertDescription::CloseNotify
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_encode_decode() {
        let alert = Alert::fatal(AlertDescription::HandshakeFailure);
        let encoded = alert.encode();

        let decoded = Alert::decode(&encoded).unwrap();
        assert_eq!(decoded.level, AlertLevel::Fatal);
        assert_eq!(decoded.description, AlertDescription::HandshakeFailure);
        assert!(decoded.is_fatal());
    }

    #[test]
    fn test_every_description_roundtrips() {
        for &description in AlertDescription::ALL {
            for level in [AlertLevel::Warning, AlertLevel::Fatal] {
                let alert = Alert::new(level, description);
                let mut buf = [0u8; 2];
                assert_eq!(alert.encode_into(&mut buf).unwrap(), 2);
                assert_eq!(Alert::decode(&buf).unwrap(), alert);
            }
        }
    }

    #[test]
    fn test_close_notify() {
        let alert = Alert::close_notify();
        assert_eq!(alert.level, AlertLevel::Warning);
        assert_eq!(alert.description, AlertDescription::CloseNotify);
        assert!(!alert.is_fatal());
        assert!(alert.is_close_notify());
    }

    #[test]
    fn test_unknown_description_parses() {
        let alert = Alert::decode(&[2, 199]).unwrap();
        assert_eq!(alert.description, AlertDescription::Unknown(199));
        assert!(alert.is_fatal());
        assert_eq!(alert.encode(), [2, 199]);
    }

    #[test]
    fn test_invalid_alert() {
        assert!(Alert::decode(&[255, 0]).is_err());
        assert!(Alert::decode(&[2]).is_err());
        assert!(Alert::decode(&[2, 40, 0]).is_err());
    }

    #[test]
    fn test_encode_into_small_buffer() {
        let mut buf = [0u8; 1];
        assert_eq!(
            Alert::close_notify().encode_into(&mut buf),
            Err(Error::BufferTooSmall { needed: 2 })
        );
    }
}

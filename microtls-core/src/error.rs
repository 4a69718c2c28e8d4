//! Error types for microtls core.
//!
//! Every failure the engine can hit is one [`Error`]. [`Error::kind`] sorts
//! them into the classes callers act on, and [`Error::alert_to_send`] names
//! the alert the connection emits before aborting.

use core::fmt;

use crate::certificate_validator::ValidationError;
use crate::transport::TransportError;

/// Result type for microtls operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors that can occur in microtls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Alert received from peer
    AlertReceived(AlertDescription),

    /// Protocol violation detected locally
    ProtocolError(ProtocolError),

    /// Malformed wire data
    InvalidMessage(String),

    /// Message or record not valid in the current state
    UnexpectedMessage(String),

    /// Record failed AEAD authentication
    DecryptionFailed,

    /// Transport failure, surfaced unchanged
    IoError(TransportError),

    /// Connection is closed or failed; no further I/O is possible
    ConnectionClosed,

    /// Certificate chain or hostname verification failed
    CertificateVerificationFailed(ValidationError),

    /// Cryptographic backend error
    CryptoError(String),

    /// Internal error
    InternalError(String),

    /// Invalid configuration
    InvalidConfig(String),

    /// Output buffer too small
    BufferTooSmall {
        /// Bytes required
        needed: usize,
    },

    /// Handshake failure
    HandshakeFailure(String),

    /// Unsupported feature
    UnsupportedFeature(String),
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Raised by a TLS alert, sent or received.
    Alert,
    /// Malformed or out-of-place wire data.
    Decode,
    /// Transport failure or use after close. Safe to retry on a fresh connection.
    Io,
    /// Certificate or hostname policy rejected the peer.
    Policy,
    /// Local bug, misuse or resource exhaustion.
    Internal,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::AlertReceived(_) => ErrorKind::Alert,
            Error::ProtocolError(ProtocolError::DecodeError | ProtocolError::RecordOverflow) => {
                ErrorKind::Decode
            },
            Error::ProtocolError(_) => ErrorKind::Alert,
            Error::InvalidMessage(_) | Error::UnexpectedMessage(_) | Error::DecryptionFailed => {
                ErrorKind::Decode
            },
            Error::IoError(_) | Error::ConnectionClosed => ErrorKind::Io,
            Error::CertificateVerificationFailed(_) => ErrorKind::Policy,
            Error::CryptoError(_)
            | Error::InternalError(_)
            | Error::InvalidConfig(_)
            | Error::BufferTooSmall { .. }
            | Error::HandshakeFailure(_)
            | Error::UnsupportedFeature(_) => ErrorKind::Internal,
        }
    }

    /// The fatal alert to send the peer before aborting, if any.
    ///
    /// Alerts received from the peer, transport failures and configuration
    /// errors produce no alert.
    pub fn alert_to_send(&self) -> Option<AlertDescription> {
        match self {
            Error::AlertReceived(_)
            | Error::IoError(_)
            | Error::ConnectionClosed
            | Error::InvalidConfig(_) => None,
            Error::ProtocolError(e) => Some(e.alert()),
            Error::InvalidMessage(_) => Some(AlertDescription::DecodeError),
            Error::UnexpectedMessage(_) => Some(AlertDescription::UnexpectedMessage),
            Error::DecryptionFailed => Some(AlertDescription::BadRecordMac),
            Error::CertificateVerificationFailed(e) => Some(e.alert()),
            Error::HandshakeFailure(_) | Error::UnsupportedFeature(_) => {
                Some(AlertDescription::HandshakeFailure)
            },
            Error::CryptoError(_) | Error::InternalError(_) | Error::BufferTooSmall { .. } => {
                Some(AlertDescription::InternalError)
            },
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::AlertReceived(desc) => write!(f, "Alert received: {}", desc),
            Error::ProtocolError(e) => write!(f, "Protocol error: {}", e.alert()),
            Error::InvalidMessage(msg) => write!(f, "Invalid message: {}", msg),
            Error::UnexpectedMessage(msg) => write!(f, "Unexpected message: {}", msg),
            Error::DecryptionFailed => write!(f, "Decryption failed"),
            Error::IoError(e) => write!(f, "I/O error: {}", e),
            Error::ConnectionClosed => write!(f, "Connection closed"),
            Error::CertificateVerificationFailed(e) => {
                write!(f, "Certificate verification failed: {}", e)
            },
            Error::CryptoError(msg) => write!(f, "Cryptographic error: {}", msg),
            Error::InternalError(msg) => write!(f, "Internal error: {}", msg),
            Error::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            Error::BufferTooSmall { needed } => {
                write!(f, "Buffer too small: {} bytes needed", needed)
            },
            Error::HandshakeFailure(msg) => write!(f, "Handshake failure: {}", msg),
            Error::UnsupportedFeature(msg) => write!(f, "Unsupported feature: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<microtls_crypto::Error> for Error {
    fn from(e: microtls_crypto::Error) -> Self {
        Error::CryptoError(e.to_string())
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Error::IoError(e)
    }
}

impl From<ValidationError> for Error {
    fn from(e: ValidationError) -> Self {
        Error::CertificateVerificationFailed(e)
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Error::ProtocolError(e)
    }
}

macro_rules! alert_taxonomy {
    ($( $(#[$doc:meta])* $name:ident = $code:literal, $label:literal; )+) => {
        /// TLS alert descriptions (RFC 8446 Section 6, RFC 5246 Section 7.2).
        ///
        /// Codes this engine does not know decode to [`AlertDescription::Unknown`]
        /// so that parsing never fails on the description byte.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum AlertDescription {
            $( $(#[$doc])* $name, )+
            /// Description code with no registered meaning
            Unknown(u8),
        }

        impl AlertDescription {
            /// Every registered description.
            pub const ALL: &'static [AlertDescription] = &[$(AlertDescription::$name,)+];

            /// Convert from wire format (u8). Total.
            pub const fn from_u8(value: u8) -> Self {
                match value {
                    $( $code => AlertDescription::$name, )+
                    other => AlertDescription::Unknown(other),
                }
            }

            /// Convert to wire format (u8).
            pub const fn to_u8(self) -> u8 {
                match self {
                    $( AlertDescription::$name => $code, )+
                    AlertDescription::Unknown(code) => code,
                }
            }

            /// Registered name, e.g. `"bad_record_mac"`.
            pub const fn name(self) -> &'static str {
                match self {
                    $( AlertDescription::$name => $label, )+
                    AlertDescription::Unknown(_) => "unknown",
                }
            }
        }

        /// Protocol-level errors, one per registered alert description.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum ProtocolError {
            $( $(#[$doc])* $name, )+
        }

        impl ProtocolError {
            /// Error kind carried by an alert description.
            ///
            /// Unknown codes map to [`ProtocolError::InternalError`].
            pub const fn from_alert(description: AlertDescription) -> Self {
                match description {
                    $( AlertDescription::$name => ProtocolError::$name, )+
                    AlertDescription::Unknown(_) => ProtocolError::InternalError,
                }
            }

            /// Alert description that reports this error to the peer.
            pub const fn alert(self) -> AlertDescription {
                match self {
                    $( ProtocolError::$name => AlertDescription::$name, )+
                }
            }
        }
    };
}

alert_taxonomy! {
    /// Close notify
    CloseNotify = 0, "close_notify";
    /// Unexpected message
    UnexpectedMessage = 10, "unexpected_message";
    /// Bad record MAC
    BadRecordMac = 20, "bad_record_mac";
    /// Decryption failed (reserved, TLS 1.0 only)
    DecryptionFailedReserved = 21, "decryption_failed_RESERVED";
    /// Record overflow
    RecordOverflow = 22, "record_overflow";
    /// Decompression failure (reserved)
    DecompressionFailure = 30, "decompression_failure_RESERVED";
    /// Handshake failure
    HandshakeFailure = 40, "handshake_failure";
    /// No certificate (reserved, SSLv3 only)
    NoCertificateReserved = 41, "no_certificate_RESERVED";
    /// Bad certificate
    BadCertificate = 42, "bad_certificate";
    /// Unsupported certificate
    UnsupportedCertificate = 43, "unsupported_certificate";
    /// Certificate revoked
    CertificateRevoked = 44, "certificate_revoked";
    /// Certificate expired
    CertificateExpired = 45, "certificate_expired";
    /// Certificate unknown
    CertificateUnknown = 46, "certificate_unknown";
    /// Illegal parameter
    IllegalParameter = 47, "illegal_parameter";
    /// Unknown CA
    UnknownCa = 48, "unknown_ca";
    /// Access denied
    AccessDenied = 49, "access_denied";
    /// Decode error
    DecodeError = 50, "decode_error";
    /// Decrypt error
    DecryptError = 51, "decrypt_error";
    /// Export restriction (reserved)
    ExportRestrictionReserved = 60, "export_restriction_RESERVED";
    /// Protocol version
    ProtocolVersion = 70, "protocol_version";
    /// Insufficient security
    InsufficientSecurity = 71, "insufficient_security";
    /// Internal error
    InternalError = 80, "internal_error";
    /// Inappropriate fallback
    InappropriateFallback = 86, "inappropriate_fallback";
    /// User canceled
    UserCanceled = 90, "user_canceled";
    /// No renegotiation (TLS 1.2)
    NoRenegotiation = 100, "no_renegotiation";
    /// Missing extension
    MissingExtension = 109, "missing_extension";
    /// Unsupported extension
    UnsupportedExtension = 110, "unsupported_extension";
    /// Unrecognized name
    UnrecognizedName = 112, "unrecognized_name";
    /// Bad certificate status response
    BadCertificateStatusResponse = 113, "bad_certificate_status_response";
    /// Unknown PSK identity
    UnknownPskIdentity = 115, "unknown_psk_identity";
    /// Certificate required
    CertificateRequired = 116, "certificate_required";
    /// No application protocol
    NoApplicationProtocol = 120, "no_application_protocol";
}

impl AlertDescription {
    /// Whether this description ends the connection.
    ///
    /// Only `close_notify` and `user_canceled` may arrive at warning level.
    pub const fn is_fatal(self) -> bool {
        !matches!(
            self,
            AlertDescription::CloseNotify | AlertDescription::UserCanceled
        )
    }
}

impl fmt::Display for AlertDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertDescription::Unknown(code) => write!(f, "unknown({})", code),
            other => f.write_str(other.name()),
        }
    }
}

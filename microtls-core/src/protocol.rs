//! TLS protocol constants and types.

/// TLS protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u16)]
pub enum ProtocolVersion {
    /// TLS 1.0 (RFC 2246) - only seen as a legacy record-layer version
    Tls10 = 0x0301,

    /// TLS 1.1 (RFC 4346) - only seen as a legacy record-layer version
    Tls11 = 0x0302,

    /// TLS 1.2 (RFC 5246)
    Tls12 = 0x0303,

    /// TLS 1.3 (RFC 8446)
    Tls13 = 0x0304,
}

impl ProtocolVersion {
    /// Create from wire format (u16 big-endian).
    pub const fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0301 => Some(ProtocolVersion::Tls10),
            0x0302 => Some(ProtocolVersion::Tls11),
            0x0303 => Some(ProtocolVersion::Tls12),
            0x0304 => Some(ProtocolVersion::Tls13),
            _ => None,
        }
    }

    /// Convert to wire format (u16 big-endian).
    pub const fn to_u16(self) -> u16 {
        self as u16
    }

    /// Get the protocol name.
    pub const fn name(self) -> &'static str {
        match self {
            ProtocolVersion::Tls10 => "TLS 1.0",
            ProtocolVersion::Tls11 => "TLS 1.1",
            ProtocolVersion::Tls12 => "TLS 1.2",
            ProtocolVersion::Tls13 => "TLS 1.3",
        }
    }

    /// Whether the engine negotiates this version.
    pub const fn is_supported(self) -> bool {
        matches!(self, ProtocolVersion::Tls12 | ProtocolVersion::Tls13)
    }
}

/// TLS content type (RFC 8446 Section 5.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ContentType {
    /// Change cipher spec (20) - TLS 1.2, and the TLS 1.3 compatibility record
    ChangeCipherSpec = 20,

    /// Alert (21)
    Alert = 21,

    /// Handshake (22)
    Handshake = 22,

    /// Application data (23)
    ApplicationData = 23,
}

impl ContentType {
    /// Create from wire format (u8).
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            20 => Some(ContentType::ChangeCipherSpec),
            21 => Some(ContentType::Alert),
            22 => Some(ContentType::Handshake),
            23 => Some(ContentType::ApplicationData),
            _ => None,
        }
    }

    /// Convert to wire format (u8).
    pub const fn to_u8(self) -> u8 {
        self as u8
    }

    /// Check if this content type may appear inside TLS 1.3 protection.
    pub const fn is_valid_for_tls13(self) -> bool {
        matches!(
            self,
            ContentType::Alert | ContentType::Handshake | ContentType::ApplicationData
        )
    }
}

/// Handshake message type (RFC 8446 Section 4, RFC 5246 Section 7.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum HandshakeType {
    /// ClientHello (1)
    ClientHello = 1,

    /// ServerHello (2)
    ServerHello = 2,

    /// NewSessionTicket (4)
    NewSessionTicket = 4,

    /// EncryptedExtensions (8) - TLS 1.3
    EncryptedExtensions = 8,

    /// Certificate (11)
    Certificate = 11,

    /// ServerKeyExchange (12) - TLS 1.2 only
    ServerKeyExchange = 12,

    /// CertificateRequest (13)
    CertificateRequest = 13,

    /// ServerHelloDone (14) - TLS 1.2 only
    ServerHelloDone = 14,

    /// CertificateVerify (15)
    CertificateVerify = 15,

    /// ClientKeyExchange (16) - TLS 1.2 only
    ClientKeyExchange = 16,

    /// Finished (20)
    Finished = 20,

    /// KeyUpdate (24) - TLS 1.3
    KeyUpdate = 24,
}

impl HandshakeType {
    /// Create from wire format (u8).
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(HandshakeType::ClientHello),
            2 => Some(HandshakeType::ServerHello),
            4 => Some(HandshakeType::NewSessionTicket),
            8 => Some(HandshakeType::EncryptedExtensions),
            11 => Some(HandshakeType::Certificate),
            12 => Some(HandshakeType::ServerKeyExchange),
            13 => Some(HandshakeType::CertificateRequest),
            14 => Some(HandshakeType::ServerHelloDone),
            15 => Some(HandshakeType::CertificateVerify),
            16 => Some(HandshakeType::ClientKeyExchange),
            20 => Some(HandshakeType::Finished),
            24 => Some(HandshakeType::KeyUpdate),
            _ => None,
        }
    }

    /// Convert to wire format (u8).
    pub const fn to_u8(self) -> u8 {
        self as u8
    }

    /// Check if this handshake type is valid for TLS 1.3.
    pub const fn is_valid_for_tls13(self) -> bool {
        !matches!(
            self,
            HandshakeType::ServerKeyExchange
                | HandshakeType::ClientKeyExchange
                | HandshakeType::ServerHelloDone
        )
    }
}

/// TLS extension types the engine sends or interprets (IANA registry).
///
/// Anything else a server sends is carried as a raw `u16` and ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ExtensionType {
    /// server_name (0)
    ServerName = 0,

    /// supported_groups (10) - formerly supported_curves
    SupportedGroups = 10,

    /// ec_point_formats (11) - TLS 1.2, RFC 4492
    EcPointFormats = 11,

    /// signature_algorithms (13)
    SignatureAlgorithms = 13,

    /// application_layer_protocol_negotiation (16) - ALPN
    ApplicationLayerProtocolNegotiation = 16,

    /// extended_master_secret (23) - TLS 1.2, RFC 7627
    ExtendedMasterSecret = 23,

    /// supported_versions (43) - TLS 1.3
    SupportedVersions = 43,

    /// key_share (51) - TLS 1.3
    KeyShare = 51,

    /// renegotiation_info (0xFF01) - RFC 5746
    RenegotiationInfo = 0xFF01,
}

impl ExtensionType {
    /// Create from wire format (u16).
    pub const fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(ExtensionType::ServerName),
            10 => Some(ExtensionType::SupportedGroups),
            11 => Some(ExtensionType::EcPointFormats),
            13 => Some(ExtensionType::SignatureAlgorithms),
            16 => Some(ExtensionType::ApplicationLayerProtocolNegotiation),
            23 => Some(ExtensionType::ExtendedMasterSecret),
            43 => Some(ExtensionType::SupportedVersions),
            51 => Some(ExtensionType::KeyShare),
            0xFF01 => Some(ExtensionType::RenegotiationInfo),
            _ => None,
        }
    }

    /// Convert to wire format (u16).
    pub const fn to_u16(self) -> u16 {
        self as u16
    }
}

//! ClientHello extension bodies.
//!
//! [`ClientHelloExtensions`] is the single place that decides what the
//! client offers and in which order. The order is fixed: `server_name`,
//! `supported_versions`, `supported_groups`, `signature_algorithms`,
//! `key_share`, ALPN, then the TLS 1.2 compatibility trio
//! (`ec_point_formats`, `extended_master_secret`, `renegotiation_info`).

use std::net::IpAddr;

use bytes::{BufMut, BytesMut};
use microtls_crypto::{KeyExchangeAlgorithm, SignatureAlgorithm};

use crate::codec;
use crate::error::{Error, Result};
use crate::extensions::{Extension, Extensions};
use crate::protocol::{ExtensionType, ProtocolVersion};

/// `host_name` entry type in `server_name`.
const SNI_HOST_NAME: u8 = 0;

/// `uncompressed` EC point format.
const EC_POINT_FORMAT_UNCOMPRESSED: u8 = 0;

/// Groups offered by default, each with a key share in TLS 1.3.
pub const DEFAULT_GROUPS: &[KeyExchangeAlgorithm] = &[
    KeyExchangeAlgorithm::X25519,
    KeyExchangeAlgorithm::Secp256r1,
    KeyExchangeAlgorithm::Secp384r1,
];

/// Key share entry (group + key_exchange data).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyShareEntry {
    /// NamedGroup code
    pub group: u16,
    /// Public key in the group's wire encoding
    pub key_exchange: Vec<u8>,
}

impl KeyShareEntry {
    /// Create a new entry.
    pub fn new(group: u16, key_exchange: Vec<u8>) -> Self {
        Self {
            group,
            key_exchange,
        }
    }
}

/// Whether `hostname` is sent as SNI: non-empty and not an IP literal.
pub fn sni_applies(hostname: &str) -> bool {
    !hostname.is_empty() && hostname.parse::<IpAddr>().is_err()
}

/// Everything the client offers in its hello.
#[derive(Debug, Clone)]
pub struct ClientHelloExtensions {
    /// Server hostname; omitted from SNI when empty or an IP literal
    pub hostname: String,
    /// Versions offered, most preferred first
    pub versions: Vec<ProtocolVersion>,
    /// Groups offered in `supported_groups`
    pub groups: Vec<KeyExchangeAlgorithm>,
    /// Schemes offered in `signature_algorithms`
    pub signature_algorithms: Vec<SignatureAlgorithm>,
    /// One share per offered group
    pub key_shares: Vec<KeyShareEntry>,
    /// ALPN protocol names, empty for none
    pub alpn_protocols: Vec<Vec<u8>>,
}

impl ClientHelloExtensions {
    /// Build the extension list in wire order.
    pub fn to_extensions(&self) -> Result<Extensions> {
        let mut exts = Extensions::new();

        if sni_applies(&self.hostname) {
            exts.add(Extension::new(
                ExtensionType::ServerName,
                encode_server_name(&self.hostname)?,
            ));
        }

        let mut body = BytesMut::new();
        for v in &self.versions {
            body.put_u16(v.to_u16());
        }
        exts.add(Extension::new(
            ExtensionType::SupportedVersions,
            prefixed_u8(&body)?,
        ));

        let mut body = BytesMut::new();
        for g in &self.groups {
            body.put_u16(g.to_u16());
        }
        exts.add(Extension::new(
            ExtensionType::SupportedGroups,
            prefixed_u16(&body)?,
        ));

        let mut body = BytesMut::new();
        for s in &self.signature_algorithms {
            body.put_u16(s.iana_codepoint());
        }
        exts.add(Extension::new(
            ExtensionType::SignatureAlgorithms,
            prefixed_u16(&body)?,
        ));

        if self.versions.contains(&ProtocolVersion::Tls13) {
            let mut body = BytesMut::new();
            for share in &self.key_shares {
                body.put_u16(share.group);
                codec::put_vec_u16(&mut body, &share.key_exchange)?;
            }
            exts.add(Extension::new(ExtensionType::KeyShare, prefixed_u16(&body)?));
        }

        if !self.alpn_protocols.is_empty() {
            let mut body = BytesMut::new();
            for proto in &self.alpn_protocols {
                if proto.is_empty() {
                    return Err(Error::InvalidConfig("Empty ALPN protocol name".into()));
                }
                codec::put_vec_u8(&mut body, proto)?;
            }
            exts.add(Extension::new(
                ExtensionType::ApplicationLayerProtocolNegotiation,
                prefixed_u16(&body)?,
            ));
        }

        if self.versions.contains(&ProtocolVersion::Tls12) {
            exts.add(Extension::new(
                ExtensionType::EcPointFormats,
                vec![1, EC_POINT_FORMAT_UNCOMPRESSED],
            ));
            exts.add(Extension::new(ExtensionType::ExtendedMasterSecret, Vec::new()));
            exts.add(Extension::new(ExtensionType::RenegotiationInfo, vec![0]));
        }

        Ok(exts)
    }

    /// Encode the `u16`-prefixed extension block.
    pub fn encode(&self) -> Result<Vec<u8>> {
        self.to_extensions()?.encode()
    }

    /// Extensions a TLS 1.3 server may answer in EncryptedExtensions.
    pub fn allowed_in_encrypted_extensions(&self) -> Vec<ExtensionType> {
        let mut allowed = vec![ExtensionType::ServerName, ExtensionType::SupportedGroups];
        if !self.alpn_protocols.is_empty() {
            allowed.push(ExtensionType::ApplicationLayerProtocolNegotiation);
        }
        allowed
    }

    /// Extensions a server may answer in ServerHello for `version`.
    pub fn allowed_in_server_hello(&self, version: ProtocolVersion) -> Vec<ExtensionType> {
        match version {
            ProtocolVersion::Tls13 => {
                vec![ExtensionType::SupportedVersions, ExtensionType::KeyShare]
            },
            _ => {
                let mut allowed = vec![
                    ExtensionType::ServerName,
                    ExtensionType::EcPointFormats,
                    ExtensionType::ExtendedMasterSecret,
                    ExtensionType::RenegotiationInfo,
                ];
                if !self.alpn_protocols.is_empty() {
                    allowed.push(ExtensionType::ApplicationLayerProtocolNegotiation);
                }
                allowed
            },
        }
    }
}

fn encode_server_name(hostname: &str) -> Result<Vec<u8>> {
    let mut entry = BytesMut::new();
    entry.put_u8(SNI_HOST_NAME);
    codec::put_vec_u16(&mut entry, hostname.as_bytes())?;
    prefixed_u16(&entry)
}

fn prefixed_u8(body: &[u8]) -> Result<Vec<u8>> {
    let mut out = BytesMut::with_capacity(1 + body.len());
    codec::put_vec_u8(&mut out, body)?;
    Ok(out.to_vec())
}

fn prefixed_u16(body: &[u8]) -> Result<Vec<u8>> {
    let mut out = BytesMut::with_capacity(2 + body.len());
    codec::put_vec_u16(&mut out, body)?;
    Ok(out.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(hostname: &str) -> ClientHelloExtensions {
        ClientHelloExtensions {
            hostname: hostname.to_string(),
            versions: vec![ProtocolVersion::Tls13, ProtocolVersion::Tls12],
            groups: vec![KeyExchangeAlgorithm::X25519, KeyExchangeAlgorithm::Secp256r1],
            signature_algorithms: vec![SignatureAlgorithm::EcdsaSecp256r1Sha256],
            key_shares: vec![
                KeyShareEntry::new(0x001D, vec![1; 32]),
                KeyShareEntry::new(0x0017, vec![4; 65]),
            ],
            alpn_protocols: vec![b"h2".to_vec()],
        }
    }

    fn order(exts: &Extensions) -> Vec<u16> {
        exts.iter().map(|e| e.extension_type).collect()
    }

    #[test]
    fn test_extension_order() {
        let exts = sample("example.com").to_extensions().unwrap();
        assert_eq!(order(&exts), vec![0, 43, 10, 13, 51, 16, 11, 23, 0xFF01]);
    }

    #[test]
    fn test_sni_skipped_for_ip_and_empty() {
        for host in ["", "127.0.0.1", "::1"] {
            let exts = sample(host).to_extensions().unwrap();
            assert!(!exts.has(ExtensionType::ServerName), "{}", host);
            assert_eq!(exts.iter().next().unwrap().extension_type, 43);
        }
    }

    #[test]
    fn test_server_name_encoding() {
        let exts = sample("a.io").to_extensions().unwrap();
        let sni = exts.get(ExtensionType::ServerName).unwrap();
        assert_eq!(sni.data, vec![0, 7, 0, 0, 4, b'a', b'.', b'i', b'o']);
    }

    #[test]
    fn test_versions_and_key_share_bodies() {
        let exts = sample("a.io").to_extensions().unwrap();
        let versions = exts.get(ExtensionType::SupportedVersions).unwrap();
        assert_eq!(versions.data, vec![4, 0x03, 0x04, 0x03, 0x03]);

        let shares = exts.get(ExtensionType::KeyShare).unwrap();
        assert_eq!(&shares.data[..6], &[0, 36 + 69, 0x00, 0x1D, 0x00, 0x20]);
        assert_eq!(shares.data.len(), 2 + 36 + 69);
    }

    #[test]
    fn test_tls12_only_omits_key_share() {
        let mut ext = sample("a.io");
        ext.versions = vec![ProtocolVersion::Tls12];
        let exts = ext.to_extensions().unwrap();
        assert!(!exts.has(ExtensionType::KeyShare));
        assert!(exts.has(ExtensionType::ExtendedMasterSecret));
    }

    #[test]
    fn test_tls13_only_omits_tls12_trio() {
        let mut ext = sample("a.io");
        ext.versions = vec![ProtocolVersion::Tls13];
        ext.alpn_protocols.clear();
        let exts = ext.to_extensions().unwrap();
        assert_eq!(order(&exts), vec![0, 43, 10, 13, 51]);
    }

    #[test]
    fn test_empty_alpn_name_rejected() {
        let mut ext = sample("a.io");
        ext.alpn_protocols.push(Vec::new());
        assert!(matches!(ext.encode(), Err(Error::InvalidConfig(_))));
    }
}

//! Generic TLS extension list.
//!
//! Server extensions are decoded into `(type, data)` pairs and interpreted
//! lazily by the lookups at the bottom of this file. Types the engine does
//! not know are kept raw and never looked at.

use bytes::{BufMut, BytesMut};

use crate::codec::{self, Reader};
use crate::error::{Error, ProtocolError, Result};
use crate::extension_types::KeyShareEntry;
use crate::protocol::{ExtensionType, ProtocolVersion};

/// TLS extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    /// Raw extension type code
    pub extension_type: u16,

    /// Extension data
    pub data: Vec<u8>,
}

impl Extension {
    /// Create a new extension.
    pub fn new(extension_type: ExtensionType, data: Vec<u8>) -> Self {
        Self {
            extension_type: extension_type.to_u16(),
            data,
        }
    }

    /// Known extension type, if registered with the engine.
    pub fn kind(&self) -> Option<ExtensionType> {
        ExtensionType::from_u16(self.extension_type)
    }

    /// Append the extension to `buf`.
    pub fn encode_into(&self, buf: &mut BytesMut) -> Result<()> {
        buf.put_u16(self.extension_type);
        codec::put_vec_u16(buf, &self.data)
    }
}

/// Extension list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extensions {
    extensions: Vec<Extension>,
}

impl Extensions {
    /// Create a new empty extension list.
    pub fn new() -> Self {
        Self {
            extensions: Vec::new(),
        }
    }

    /// Add an extension.
    pub fn add(&mut self, extension: Extension) {
        self.extensions.push(extension);
    }

    /// Get an extension by type.
    pub fn get(&self, ext_type: ExtensionType) -> Option<&Extension> {
        let code = ext_type.to_u16();
        self.extensions.iter().find(|e| e.extension_type == code)
    }

    /// Check if an extension is present.
    pub fn has(&self, ext_type: ExtensionType) -> bool {
        self.get(ext_type).is_some()
    }

    /// Iterate in wire order.
    pub fn iter(&self) -> impl Iterator<Item = &Extension> {
        self.extensions.iter()
    }

    /// Get the number of extensions.
    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    /// Check if the extension list is empty.
    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    /// Append the `u16`-prefixed extension block to `buf`.
    pub fn encode_into(&self, buf: &mut BytesMut) -> Result<()> {
        let mut body = BytesMut::new();
        for ext in &self.extensions {
            ext.encode_into(&mut body)?;
        }
        codec::put_vec_u16(buf, &body)
    }

    /// Encode the `u16`-prefixed extension block.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = BytesMut::new();
        self.encode_into(&mut buf)?;
        Ok(buf.to_vec())
    }

    /// Decode a `u16`-prefixed extension block.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut r = Reader::new(data, "Extensions");
        let exts = Self::read(&mut r)?;
        r.finish()?;
        Ok(exts)
    }

    /// Read a `u16`-prefixed extension block from `r`.
    ///
    /// # Errors
    ///
    /// - `InvalidMessage` for malformed framing
    /// - `ProtocolError(IllegalParameter)` if a type appears twice
    pub fn read(r: &mut Reader<'_>) -> Result<Self> {
        let mut block = r.sub_u16()?;
        let mut extensions: Vec<Extension> = Vec::new();
        while !block.is_empty() {
            let extension_type = block.u16()?;
            let data = block.vec_u16()?.to_vec();
            if extensions.iter().any(|e| e.extension_type == extension_type) {
                tracing::warn!("Duplicate extension type {}", extension_type);
                return Err(Error::ProtocolError(ProtocolError::IllegalParameter));
            }
            extensions.push(Extension {
                extension_type,
                data,
            });
        }
        Ok(Self { extensions })
    }

    /// Fail if any extension is outside `allowed`.
    ///
    /// Servers may only answer extensions the client offered.
    pub fn check_allowed(&self, allowed: &[ExtensionType]) -> Result<()> {
        for ext in &self.extensions {
            match ext.kind() {
                Some(kind) if allowed.contains(&kind) => {},
                _ => {
                    tracing::warn!("Server sent unsolicited extension {}", ext.extension_type);
                    return Err(Error::ProtocolError(ProtocolError::UnsupportedExtension));
                },
            }
        }
        Ok(())
    }

    /// ServerHello `key_share`: exactly one entry.
    pub fn get_key_share_server(&self) -> Result<Option<KeyShareEntry>> {
        let Some(ext) = self.get(ExtensionType::KeyShare) else {
            return Ok(None);
        };
        let mut r = Reader::new(&ext.data, "key_share");
        let group = r.u16()?;
        let key_exchange = r.vec_u16()?;
        r.finish()?;
        if key_exchange.is_empty() {
            return Err(Error::ProtocolError(ProtocolError::IllegalParameter));
        }
        Ok(Some(KeyShareEntry::new(group, key_exchange.to_vec())))
    }

    /// ServerHello `supported_versions`: the selected version.
    pub fn get_supported_version_server(&self) -> Result<Option<u16>> {
        let Some(ext) = self.get(ExtensionType::SupportedVersions) else {
            return Ok(None);
        };
        let mut r = Reader::new(&ext.data, "supported_versions");
        let version = r.u16()?;
        r.finish()?;
        Ok(Some(version))
    }

    /// EncryptedExtensions / ServerHello ALPN: exactly one protocol name.
    pub fn get_alpn_selected(&self) -> Result<Option<Vec<u8>>> {
        let Some(ext) = self.get(ExtensionType::ApplicationLayerProtocolNegotiation) else {
            return Ok(None);
        };
        let mut r = Reader::new(&ext.data, "ALPN");
        let mut list = r.sub_u16()?;
        r.finish()?;
        let protocol = list.vec_u8()?;
        if protocol.is_empty() || !list.is_empty() {
            return Err(Error::ProtocolError(ProtocolError::IllegalParameter));
        }
        Ok(Some(protocol.to_vec()))
    }

    /// TLS 1.2 `renegotiation_info` from the server must be empty.
    pub fn check_renegotiation_info(&self) -> Result<()> {
        if let Some(ext) = self.get(ExtensionType::RenegotiationInfo) {
            if ext.data != [0] {
                return Err(Error::ProtocolError(ProtocolError::HandshakeFailure));
            }
        }
        Ok(())
    }

    /// Whether the server echoed `extended_master_secret`.
    pub fn has_extended_master_secret(&self) -> bool {
        self.has(ExtensionType::ExtendedMasterSecret)
    }
}

/// Version named by a ServerHello `supported_versions` value.
pub fn selected_version(code: u16) -> Option<ProtocolVersion> {
    ProtocolVersion::from_u16(code).filter(|v| v.is_supported())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(exts: &[(u16, &[u8])]) -> Vec<u8> {
        let mut list = Extensions::new();
        for (t, d) in exts {
            list.extensions.push(Extension {
                extension_type: *t,
                data: d.to_vec(),
            });
        }
        list.encode().unwrap()
    }

    #[test]
    fn test_extensions_encode_decode() {
        let mut exts = Extensions::new();
        exts.add(Extension::new(ExtensionType::ServerName, vec![1, 2, 3]));
        exts.add(Extension::new(ExtensionType::SupportedVersions, vec![3, 4]));

        let encoded = exts.encode().unwrap();
        assert_eq!(&encoded[..2], &[0, 13]);
        let decoded = Extensions::decode(&encoded).unwrap();

        assert_eq!(decoded.len(), 2);
        assert!(decoded.has(ExtensionType::ServerName));
        assert_eq!(decoded.get_supported_version_server().unwrap(), Some(0x0304));
    }

    #[test]
    fn test_unknown_types_kept_raw() {
        let decoded = Extensions::decode(&block(&[(0xFAFA, b""), (43, &[3, 3])])).unwrap();
        assert_eq!(decoded.len(), 2);
        assert!(decoded.iter().next().unwrap().kind().is_none());
        assert_eq!(decoded.get_supported_version_server().unwrap(), Some(0x0303));
    }

    #[test]
    fn test_duplicate_extension_is_illegal_parameter() {
        let err = Extensions::decode(&block(&[(51, b"x"), (51, b"y")])).unwrap_err();
        assert_eq!(err, Error::ProtocolError(ProtocolError::IllegalParameter));
    }

    #[test]
    fn test_truncated_block() {
        let mut encoded = block(&[(0, b"abc")]);
        encoded.pop();
        assert!(matches!(
            Extensions::decode(&encoded),
            Err(Error::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_key_share_server() {
        let mut data = vec![0x00, 0x1D, 0x00, 0x20];
        data.extend_from_slice(&[7u8; 32]);
        let exts = Extensions::decode(&block(&[(51, &data)])).unwrap();
        let share = exts.get_key_share_server().unwrap().unwrap();
        assert_eq!(share.group, 0x001D);
        assert_eq!(share.key_exchange, vec![7u8; 32]);

        let empty = Extensions::decode(&block(&[(51, &[0x00, 0x1D, 0x00, 0x00])])).unwrap();
        assert!(empty.get_key_share_server().is_err());
    }

    #[test]
    fn test_alpn_selected() {
        let exts = Extensions::decode(&block(&[(16, &[0, 3, 2, b'h', b'2'])])).unwrap();
        assert_eq!(exts.get_alpn_selected().unwrap(), Some(b"h2".to_vec()));

        let two = [0, 6, 2, b'h', b'2', 2, b'h', b'3'];
        let exts = Extensions::decode(&block(&[(16, &two)])).unwrap();
        assert!(exts.get_alpn_selected().is_err());
    }

    #[test]
    fn test_check_allowed() {
        let exts = Extensions::decode(&block(&[(16, &[0, 3, 2, b'h', b'2'])])).unwrap();
        exts.check_allowed(&[ExtensionType::ApplicationLayerProtocolNegotiation])
            .unwrap();
        assert_eq!(
            exts.check_allowed(&[ExtensionType::ServerName]),
            Err(Error::ProtocolError(ProtocolError::UnsupportedExtension))
        );
    }

    #[test]
    fn test_renegotiation_info() {
        let ok = Extensions::decode(&block(&[(0xFF01, &[0])])).unwrap();
        ok.check_renegotiation_info().unwrap();
        let bad = Extensions::decode(&block(&[(0xFF01, &[1, 9])])).unwrap();
        assert!(bad.check_renegotiation_info().is_err());
    }
}

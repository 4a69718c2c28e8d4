//! X.509 v3 certificate parsing.
//!
//! A strict DER reader extracts the fields the engine checks: the raw
//! `tbsCertificate` and signature, issuer and subject names, the validity
//! window, the subject public key, subjectAltName entries and the CA bit.
//! Anything else is skipped. Malformed input is a
//! [`ValidationError::Malformed`], never a panic.

use std::net::IpAddr;

use microtls_crypto::SignatureAlgorithm;

use crate::certificate_validator::ValidationError;

type Result<T> = core::result::Result<T, ValidationError>;

const TAG_BOOLEAN: u8 = 0x01;
const TAG_INTEGER: u8 = 0x02;
const TAG_BIT_STRING: u8 = 0x03;
const TAG_OCTET_STRING: u8 = 0x04;
const TAG_OID: u8 = 0x06;
const TAG_UTC_TIME: u8 = 0x17;
const TAG_GENERALIZED_TIME: u8 = 0x18;
const TAG_SEQUENCE: u8 = 0x30;
const TAG_SET: u8 = 0x31;
const TAG_VERSION: u8 = 0xA0;
const TAG_EXTENSIONS: u8 = 0xA3;
const TAG_SAN_DNS: u8 = 0x82;
const TAG_SAN_IP: u8 = 0x87;

// Object identifiers, DER content bytes.
const OID_EC_PUBLIC_KEY: &[u8] = &[0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x02, 0x01];
const OID_P256: &[u8] = &[0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x03, 0x01, 0x07];
const OID_P384: &[u8] = &[0x2B, 0x81, 0x04, 0x00, 0x22];
const OID_RSA_ENCRYPTION: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x01];
const OID_ED25519: &[u8] = &[0x2B, 0x65, 0x70];
const OID_SHA256_WITH_RSA: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x0B];
const OID_SHA384_WITH_RSA: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x0C];
const OID_SHA512_WITH_RSA: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x0D];
const OID_ECDSA_SHA256: &[u8] = &[0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x04, 0x03, 0x02];
const OID_ECDSA_SHA384: &[u8] = &[0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x04, 0x03, 0x03];
const OID_COMMON_NAME: &[u8] = &[0x55, 0x04, 0x03];
const OID_SUBJECT_ALT_NAME: &[u8] = &[0x55, 0x1D, 0x11];
const OID_BASIC_CONSTRAINTS: &[u8] = &[0x55, 0x1D, 0x13];

fn malformed(what: &str) -> ValidationError {
    ValidationError::Malformed(what.to_string())
}

/// One DER TLV.
#[derive(Debug, Clone, Copy)]
struct Element<'a> {
    tag: u8,
    /// Content bytes
    body: &'a [u8],
    /// Header and content bytes
    raw: &'a [u8],
}

/// Sequential DER reader.
#[derive(Debug, Clone, Copy)]
struct Der<'a> {
    data: &'a [u8],
}

impl<'a> Der<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn peek_tag(&self) -> Option<u8> {
        self.data.first().copied()
    }

    fn next(&mut self) -> Result<Element<'a>> {
        let (&tag, rest) = self.data.split_first().ok_or_else(|| malformed("truncated"))?;
        if tag & 0x1F == 0x1F {
            return Err(malformed("high tag number"));
        }
        let (&first, mut rest) = rest.split_first().ok_or_else(|| malformed("truncated"))?;
        let length = if first < 0x80 {
            first as usize
        } else {
            let count = (first & 0x7F) as usize;
            if count == 0 || count > 3 || rest.len() < count {
                return Err(malformed("bad length"));
            }
            let mut length = 0usize;
            for &b in &rest[..count] {
                length = (length << 8) | b as usize;
            }
            if length < 0x80 {
                return Err(malformed("non-minimal length"));
            }
            rest = &rest[count..];
            length
        };
        if rest.len() < length {
            return Err(malformed("truncated"));
        }
        let header = self.data.len() - rest.len();
        let raw = &self.data[..header + length];
        let body = &rest[..length];
        self.data = &rest[length..];
        Ok(Element { tag, body, raw })
    }

    fn expect(&mut self, tag: u8) -> Result<Element<'a>> {
        let element = self.next()?;
        if element.tag != tag {
            return Err(malformed("unexpected tag"));
        }
        Ok(element)
    }

    fn finish(&self) -> Result<()> {
        if self.data.is_empty() {
            Ok(())
        } else {
            Err(malformed("trailing data"))
        }
    }
}

/// Public key algorithm family of a certificate key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAlgorithm {
    /// ECDSA over NIST P-256
    EcdsaP256,
    /// ECDSA over NIST P-384
    EcdsaP384,
    /// Ed25519
    Ed25519,
    /// RSA (any modulus size)
    Rsa,
}

/// Subject public key, encoded for [`microtls_crypto::Signature::verify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectPublicKey {
    /// Algorithm family
    pub algorithm: KeyAlgorithm,
    /// SEC1 point (EC), 32 raw bytes (Ed25519) or full SPKI DER (RSA)
    pub key: Vec<u8>,
}

impl SubjectPublicKey {
    /// Whether a handshake signature scheme can be verified with this key.
    pub fn supports(&self, scheme: SignatureAlgorithm) -> bool {
        matches!(
            (self.algorithm, scheme),
            (KeyAlgorithm::EcdsaP256, SignatureAlgorithm::EcdsaSecp256r1Sha256)
                | (KeyAlgorithm::EcdsaP384, SignatureAlgorithm::EcdsaSecp384r1Sha384)
                | (KeyAlgorithm::Ed25519, SignatureAlgorithm::Ed25519)
        ) || (self.algorithm == KeyAlgorithm::Rsa && scheme.is_rsa())
    }
}

/// Certificate signature algorithm, before the issuer key is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CertSignature {
    EcdsaSha256,
    EcdsaSha384,
    RsaPkcs1(SignatureAlgorithm),
    Ed25519,
    Unsupported,
}

/// Parsed X.509 certificate.
#[derive(Debug, Clone)]
pub struct X509Certificate {
    /// Complete DER encoding
    pub der: Vec<u8>,
    /// DER `tbsCertificate`, the signed bytes
    pub tbs: Vec<u8>,
    /// DER issuer Name
    pub issuer: Vec<u8>,
    /// DER subject Name
    pub subject: Vec<u8>,
    /// Subject common name, if present
    pub subject_cn: Option<String>,
    /// notBefore, seconds since the UNIX epoch
    pub not_before: u64,
    /// notAfter, seconds since the UNIX epoch
    pub not_after: u64,
    /// Subject public key
    pub public_key: SubjectPublicKey,
    /// subjectAltName dNSName entries
    pub dns_names: Vec<String>,
    /// subjectAltName iPAddress entries
    pub ip_addresses: Vec<IpAddr>,
    /// basicConstraints cA flag
    pub is_ca: bool,
    signature_algorithm: CertSignature,
    signature: Vec<u8>,
}

impl X509Certificate {
    /// Parse a DER-encoded certificate.
    pub fn parse(der: &[u8]) -> Result<Self> {
        let mut outer = Der::new(der);
        let cert = outer.expect(TAG_SEQUENCE)?;
        outer.finish()?;

        let mut parts = Der::new(cert.body);
        let tbs = parts.expect(TAG_SEQUENCE)?;
        let sig_alg = parts.expect(TAG_SEQUENCE)?;
        let sig_value = parts.expect(TAG_BIT_STRING)?;
        parts.finish()?;

        let signature_algorithm = parse_signature_algorithm(sig_alg.body)?;
        let signature = bit_string_bytes(sig_value.body)?.to_vec();

        let mut tbs_fields = Der::new(tbs.body);
        if tbs_fields.peek_tag() == Some(TAG_VERSION) {
            tbs_fields.next()?;
        }
        tbs_fields.expect(TAG_INTEGER)?;
        let inner_alg = tbs_fields.expect(TAG_SEQUENCE)?;
        if inner_alg.body != sig_alg.body {
            return Err(malformed("signature algorithm mismatch"));
        }
        let issuer = tbs_fields.expect(TAG_SEQUENCE)?;
        let validity = tbs_fields.expect(TAG_SEQUENCE)?;
        let subject = tbs_fields.expect(TAG_SEQUENCE)?;
        let spki = tbs_fields.expect(TAG_SEQUENCE)?;

        let mut times = Der::new(validity.body);
        let not_before = parse_time(times.next()?)?;
        let not_after = parse_time(times.next()?)?;
        times.finish()?;

        let mut cert = Self {
            der: der.to_vec(),
            tbs: tbs.raw.to_vec(),
            issuer: issuer.raw.to_vec(),
            subject: subject.raw.to_vec(),
            subject_cn: find_common_name(subject.body)?,
            not_before,
            not_after,
            public_key: parse_spki(spki)?,
            dns_names: Vec::new(),
            ip_addresses: Vec::new(),
            is_ca: false,
            signature_algorithm,
            signature,
        };

        // issuerUniqueID [1], subjectUniqueID [2], extensions [3]
        while !tbs_fields.is_empty() {
            let field = tbs_fields.next()?;
            if field.tag == TAG_EXTENSIONS {
                let mut wrapper = Der::new(field.body);
                let list = wrapper.expect(TAG_SEQUENCE)?;
                wrapper.finish()?;
                cert.parse_extensions(list.body)?;
            }
        }

        Ok(cert)
    }

    fn parse_extensions(&mut self, data: &[u8]) -> Result<()> {
        let mut list = Der::new(data);
        while !list.is_empty() {
            let ext = list.expect(TAG_SEQUENCE)?;
            let mut fields = Der::new(ext.body);
            let oid = fields.expect(TAG_OID)?;
            if fields.peek_tag() == Some(TAG_BOOLEAN) {
                fields.next()?;
            }
            let value = fields.expect(TAG_OCTET_STRING)?;
            fields.finish()?;

            if oid.body == OID_SUBJECT_ALT_NAME {
                self.parse_subject_alt_name(value.body)?;
            } else if oid.body == OID_BASIC_CONSTRAINTS {
                let mut outer = Der::new(value.body);
                let constraints = outer.expect(TAG_SEQUENCE)?;
                let mut inner = Der::new(constraints.body);
                if inner.peek_tag() == Some(TAG_BOOLEAN) {
                    self.is_ca = inner.next()?.body == [0xFF];
                }
            }
        }
        Ok(())
    }

    fn parse_subject_alt_name(&mut self, data: &[u8]) -> Result<()> {
        let mut outer = Der::new(data);
        let names = outer.expect(TAG_SEQUENCE)?;
        outer.finish()?;
        let mut names = Der::new(names.body);
        while !names.is_empty() {
            let name = names.next()?;
            match name.tag {
                TAG_SAN_DNS => {
                    let dns = std::str::from_utf8(name.body)
                        .map_err(|_| malformed("non-ASCII dNSName"))?;
                    self.dns_names.push(dns.to_ascii_lowercase());
                },
                TAG_SAN_IP => match name.body.len() {
                    4 => {
                        let octets: [u8; 4] = name.body.try_into().map_err(|_| malformed("ip"))?;
                        self.ip_addresses.push(IpAddr::from(octets));
                    },
                    16 => {
                        let octets: [u8; 16] =
                            name.body.try_into().map_err(|_| malformed("ip"))?;
                        self.ip_addresses.push(IpAddr::from(octets));
                    },
                    _ => return Err(malformed("bad iPAddress length")),
                },
                _ => {},
            }
        }
        Ok(())
    }

    /// Whether `time` (UNIX seconds) falls inside the validity window.
    pub fn is_valid_at(&self, time: u64) -> bool {
        self.not_before <= time && time <= self.not_after
    }

    /// Whether this certificate names `issuer` as its issuer.
    pub fn is_issued_by(&self, issuer: &X509Certificate) -> bool {
        self.issuer == issuer.subject
    }

    /// Signature scheme to check this certificate under `issuer_key`.
    ///
    /// `None` when the certificate's algorithm does not fit the key.
    pub fn signature_scheme(&self, issuer_key: &SubjectPublicKey) -> Option<SignatureAlgorithm> {
        match (self.signature_algorithm, issuer_key.algorithm) {
            (CertSignature::EcdsaSha256, KeyAlgorithm::EcdsaP256) => {
                Some(SignatureAlgorithm::EcdsaSecp256r1Sha256)
            },
            (CertSignature::EcdsaSha384, KeyAlgorithm::EcdsaP384) => {
                Some(SignatureAlgorithm::EcdsaSecp384r1Sha384)
            },
            (CertSignature::RsaPkcs1(scheme), KeyAlgorithm::Rsa) => Some(scheme),
            (CertSignature::Ed25519, KeyAlgorithm::Ed25519) => Some(SignatureAlgorithm::Ed25519),
            _ => None,
        }
    }

    /// Signature value.
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }
}

fn parse_signature_algorithm(body: &[u8]) -> Result<CertSignature> {
    let mut fields = Der::new(body);
    let oid = fields.expect(TAG_OID)?;
    let algorithm = match oid.body {
        OID_ECDSA_SHA256 => CertSignature::EcdsaSha256,
        OID_ECDSA_SHA384 => CertSignature::EcdsaSha384,
        OID_SHA256_WITH_RSA => CertSignature::RsaPkcs1(SignatureAlgorithm::RsaPkcs1Sha256),
        OID_SHA384_WITH_RSA => CertSignature::RsaPkcs1(SignatureAlgorithm::RsaPkcs1Sha384),
        OID_SHA512_WITH_RSA => CertSignature::RsaPkcs1(SignatureAlgorithm::RsaPkcs1Sha512),
        OID_ED25519 => CertSignature::Ed25519,
        _ => CertSignature::Unsupported,
    };
    Ok(algorithm)
}

fn parse_spki(spki: Element<'_>) -> Result<SubjectPublicKey> {
    let mut fields = Der::new(spki.body);
    let alg = fields.expect(TAG_SEQUENCE)?;
    let key_bits = fields.expect(TAG_BIT_STRING)?;
    fields.finish()?;
    let key = bit_string_bytes(key_bits.body)?;

    let mut alg_fields = Der::new(alg.body);
    let oid = alg_fields.expect(TAG_OID)?;
    let algorithm = match oid.body {
        OID_EC_PUBLIC_KEY => match alg_fields.expect(TAG_OID)?.body {
            OID_P256 => KeyAlgorithm::EcdsaP256,
            OID_P384 => KeyAlgorithm::EcdsaP384,
            _ => return Err(ValidationError::UnsupportedAlgorithm),
        },
        OID_ED25519 => KeyAlgorithm::Ed25519,
        OID_RSA_ENCRYPTION => KeyAlgorithm::Rsa,
        _ => return Err(ValidationError::UnsupportedAlgorithm),
    };

    let key = match algorithm {
        KeyAlgorithm::Rsa => spki.raw.to_vec(),
        _ => key.to_vec(),
    };
    Ok(SubjectPublicKey { algorithm, key })
}

fn bit_string_bytes(body: &[u8]) -> Result<&[u8]> {
    match body.split_first() {
        Some((0, bytes)) => Ok(bytes),
        _ => Err(malformed("bit string with unused bits")),
    }
}

fn find_common_name(name: &[u8]) -> Result<Option<String>> {
    let mut rdns = Der::new(name);
    while !rdns.is_empty() {
        let rdn = rdns.expect(TAG_SET)?;
        let mut attrs = Der::new(rdn.body);
        while !attrs.is_empty() {
            let attr = attrs.expect(TAG_SEQUENCE)?;
            let mut fields = Der::new(attr.body);
            let oid = fields.expect(TAG_OID)?;
            let value = fields.next()?;
            if oid.body == OID_COMMON_NAME {
                let cn = String::from_utf8_lossy(value.body).into_owned();
                return Ok(Some(cn));
            }
        }
    }
    Ok(None)
}

fn parse_time(element: Element<'_>) -> Result<u64> {
    let body = element.body;
    let (year, rest) = match element.tag {
        TAG_UTC_TIME if body.len() == 13 => {
            let yy = digits(&body[..2])?;
            (if yy < 50 { 2000 + yy } else { 1900 + yy }, &body[2..])
        },
        TAG_GENERALIZED_TIME if body.len() == 15 => (digits(&body[..4])?, &body[4..]),
        _ => return Err(malformed("time")),
    };
    if rest[10] != b'Z' {
        return Err(malformed("time zone"));
    }
    let month = digits(&rest[0..2])?;
    let day = digits(&rest[2..4])?;
    let hour = digits(&rest[4..6])?;
    let minute = digits(&rest[6..8])?;
    let second = digits(&rest[8..10])?;
    let date_ok = (1..=12).contains(&month) && (1..=31).contains(&day);
    if !date_ok || hour > 23 || minute > 59 || second > 60 {
        return Err(malformed("time out of range"));
    }

    let days = days_from_civil(year, month, day);
    if days < 0 {
        return Err(malformed("time before epoch"));
    }
    Ok(days as u64 * 86_400 + hour * 3_600 + minute * 60 + second)
}

/// Decimal value of ASCII digits.
fn digits(bytes: &[u8]) -> Result<u64> {
    bytes.iter().try_fold(0u64, |value, &b| {
        if b.is_ascii_digit() {
            Ok(value * 10 + u64::from(b - b'0'))
        } else {
            Err(malformed("time digits"))
        }
    })
}

/// Days since 1970-01-01 in the proleptic Gregorian calendar.
fn days_from_civil(year: u64, month: u64, day: u64) -> i64 {
    let y = year as i64 - if month <= 2 { 1 } else { 0 };
    let era = y.div_euclid(400);
    let yoe = y - era * 400;
    let m = month as i64;
    let doy = (153 * (if m > 2 { m - 3 } else { m + 9 }) + 2) / 5 + day as i64 - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEAF_P256: &[u8] = include_bytes!("../tests/data/leaf_p256.der");
    const LEAF_RSA: &[u8] = include_bytes!("../tests/data/leaf_rsa.der");
    const CA_P256: &[u8] = include_bytes!("../tests/data/ca_p256.der");

    #[test]
    fn test_parse_p256_leaf() {
        let cert = X509Certificate::parse(LEAF_P256).unwrap();
        assert_eq!(cert.subject_cn.as_deref(), Some("localhost"));
        assert_eq!(cert.public_key.algorithm, KeyAlgorithm::EcdsaP256);
        assert_eq!(cert.public_key.key.len(), 65);
        assert_eq!(cert.public_key.key[0], 0x04);
        assert_eq!(cert.dns_names, vec!["localhost", "*.example.test"]);
        assert_eq!(cert.ip_addresses, vec!["127.0.0.1".parse::<IpAddr>().unwrap()]);
        assert!(!cert.is_ca);
        // 2024-01-01T00:00:00Z .. 2099-12-31T00:00:00Z
        assert_eq!(cert.not_before, 1_704_067_200);
        assert_eq!(cert.not_after, 4_102_358_400);
    }

    #[test]
    fn test_parse_ca_and_issuer_link() {
        let ca = X509Certificate::parse(CA_P256).unwrap();
        let leaf = X509Certificate::parse(LEAF_P256).unwrap();
        assert!(ca.is_ca);
        assert!(leaf.is_issued_by(&ca));
        assert!(!ca.is_issued_by(&leaf));
        assert_eq!(
            leaf.signature_scheme(&ca.public_key),
            Some(SignatureAlgorithm::EcdsaSecp256r1Sha256)
        );
    }

    #[test]
    fn test_parse_rsa_leaf() {
        let cert = X509Certificate::parse(LEAF_RSA).unwrap();
        assert_eq!(cert.public_key.algorithm, KeyAlgorithm::Rsa);
        // RSA keys keep the whole SubjectPublicKeyInfo.
        assert_eq!(cert.public_key.key[0], TAG_SEQUENCE);
        assert!(cert.public_key.supports(SignatureAlgorithm::RsaPssRsaeSha256));
        assert!(!cert.public_key.supports(SignatureAlgorithm::EcdsaSecp256r1Sha256));
    }

    #[test]
    fn test_truncated_certificate_is_malformed() {
        for len in [0, 1, 10, LEAF_P256.len() / 2, LEAF_P256.len() - 1] {
            assert!(matches!(
                X509Certificate::parse(&LEAF_P256[..len]),
                Err(ValidationError::Malformed(_))
            ));
        }
    }

    #[test]
    fn test_trailing_garbage_rejected() {
        let mut der = LEAF_P256.to_vec();
        der.push(0);
        assert!(X509Certificate::parse(&der).is_err());
    }

    #[test]
    fn test_days_from_civil() {
        assert_eq!(days_from_civil(1970, 1, 1), 0);
        assert_eq!(days_from_civil(2000, 3, 1), 11_017);
        assert_eq!(days_from_civil(2024, 1, 1), 19_723);
    }

    #[test]
    fn test_utc_time_century() {
        let mut der = vec![TAG_UTC_TIME, 13];
        der.extend_from_slice(b"500101000000Z");
        let element = Der::new(&der).next().unwrap();
        // 1950-01-01 is before the epoch.
        assert!(parse_time(element).is_err());
    }

    fn time(tag: u8, text: &[u8]) -> Result<u64> {
        let mut der = vec![tag, text.len() as u8];
        der.extend_from_slice(text);
        parse_time(Der::new(&der).next()?)
    }

    #[test]
    fn test_parse_time_values() {
        assert_eq!(time(TAG_UTC_TIME, b"700101000001Z").unwrap(), 1);
        assert_eq!(
            time(TAG_GENERALIZED_TIME, b"20240101000000Z").unwrap(),
            19_723 * 86_400
        );
    }

    #[test]
    fn test_non_ascii_time_rejected() {
        let text = "a\u{e9}123456789Z";
        assert_eq!(text.len(), 13);
        assert!(time(TAG_UTC_TIME, text.as_bytes()).is_err());
        assert!(time(TAG_UTC_TIME, "12\u{e9}34567890Z".as_bytes()).is_err());
        assert!(time(TAG_UTC_TIME, b"+10101000000Z").is_err());
        assert!(time(TAG_UTC_TIME, b"7001010000000").is_err());
    }
}

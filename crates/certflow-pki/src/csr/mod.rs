//! 证书签名请求（CSR）检查模块
//!
//! 解析 PKCS#10 请求，提取规范化的请求字段与密钥/签名算法。
//! 算法识别完全基于查表，未列出的组合一律拒绝。

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use der::{
    asn1::{Ia5StringRef, ObjectIdentifier, PrintableStringRef, Utf8StringRef},
    Any, Decode, Encode,
};
use serde::{Deserialize, Serialize};
use x509_cert::{
    ext::{
        pkix::{name::GeneralName, ExtendedKeyUsage as EkuExtension, KeyUsage as KeyUsageExtension, SubjectAltName as SanExtension},
        Extension,
    },
    name::Name,
    request::{CertReq, ExtensionReq},
};

use crate::{
    error::{PkiError, Result},
    ra::{CertificateRequestInput, SubjectFields},
    types::{ExtendedKeyUsage, KeyAlgorithm, KeyUsage, SanType, SignatureAlgorithm, SubjectAltName},
};

const EXTENSION_REQUEST: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.14");
const KEY_USAGE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.15");
const SUBJECT_ALT_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.17");
const EXT_KEY_USAGE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.37");

const RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
const EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");

/// 主题属性 OID
const SUBJECT_OIDS: [(ObjectIdentifier, SubjectSlot); 6] = [
    (ObjectIdentifier::new_unwrap("2.5.4.3"), SubjectSlot::CommonName),
    (ObjectIdentifier::new_unwrap("2.5.4.10"), SubjectSlot::Organization),
    (ObjectIdentifier::new_unwrap("2.5.4.11"), SubjectSlot::OrganizationalUnit),
    (ObjectIdentifier::new_unwrap("2.5.4.6"), SubjectSlot::Country),
    (ObjectIdentifier::new_unwrap("2.5.4.8"), SubjectSlot::State),
    (ObjectIdentifier::new_unwrap("2.5.4.7"), SubjectSlot::Locality),
];

/// RSA 模数位数到密钥算法
const RSA_KEY_SIZES: [(usize, KeyAlgorithm); 3] = [
    (2048, KeyAlgorithm::Rsa2048),
    (3072, KeyAlgorithm::Rsa3072),
    (4096, KeyAlgorithm::Rsa4096),
];

/// 命名曲线到密钥算法
const EC_CURVES: [(ObjectIdentifier, KeyAlgorithm); 3] = [
    (ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.7"), KeyAlgorithm::EcdsaP256),
    (ObjectIdentifier::new_unwrap("1.3.132.0.34"), KeyAlgorithm::EcdsaP384),
    (ObjectIdentifier::new_unwrap("1.3.132.0.35"), KeyAlgorithm::EcdsaP521),
];

/// 签名 OID 到签名算法
const SIGNATURE_OIDS: [(ObjectIdentifier, SignatureAlgorithm); 6] = [
    (ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11"), SignatureAlgorithm::RsaSha256),
    (ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.12"), SignatureAlgorithm::RsaSha384),
    (ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.13"), SignatureAlgorithm::RsaSha512),
    (ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2"), SignatureAlgorithm::EcdsaSha256),
    (ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.3"), SignatureAlgorithm::EcdsaSha384),
    (ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.4"), SignatureAlgorithm::EcdsaSha512),
];

#[derive(Debug, Clone, Copy)]
enum SubjectSlot {
    CommonName,
    Organization,
    OrganizationalUnit,
    Country,
    State,
    Locality,
}

/// 从 CSR 提取的规范化请求
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedRequest {
    pub subject: SubjectFields,
    /// 仅当 CSR 携带 KeyUsage 扩展时为 `Some`
    pub key_usages: Option<Vec<KeyUsage>>,
    pub extended_key_usages: Option<Vec<ExtendedKeyUsage>>,
    pub subject_alt_names: Option<Vec<SubjectAltName>>,
}

impl NormalizedRequest {
    /// 合并算法后转为可校验的请求输入
    pub fn into_request_input(self, algorithms: CsrAlgorithms) -> CertificateRequestInput {
        CertificateRequestInput {
            subject: self.subject,
            subject_alt_names: self.subject_alt_names,
            key_usages: self.key_usages,
            extended_key_usages: self.extended_key_usages,
            signature_algorithm: Some(algorithms.signature_algorithm),
            key_algorithm: Some(algorithms.key_algorithm),
            ..Default::default()
        }
    }
}

/// CSR 中的密钥与签名算法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsrAlgorithms {
    pub key_algorithm: KeyAlgorithm,
    pub signature_algorithm: SignatureAlgorithm,
}

/// 已解析的 CSR
#[derive(Debug, Clone)]
pub struct Csr {
    inner: CertReq,
}

impl Csr {
    /// 从 PEM 解析
    pub fn from_pem(pem: &str) -> Result<Self> {
        let parsed = pem::parse(pem)
            .map_err(|e| PkiError::MalformedInput(format!("Failed to parse CSR PEM: {e}")))?;

        if parsed.tag() != "CERTIFICATE REQUEST" && parsed.tag() != "NEW CERTIFICATE REQUEST" {
            return Err(PkiError::MalformedInput(
                "Invalid PEM tag, expected CERTIFICATE REQUEST or NEW CERTIFICATE REQUEST"
                    .to_string(),
            ));
        }

        Self::from_der(parsed.contents())
    }

    /// 从 DER 解析
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let inner = CertReq::from_der(der)
            .map_err(|e| PkiError::MalformedInput(format!("Failed to parse CSR: {e}")))?;
        Ok(Self { inner })
    }

    pub fn subject(&self) -> SubjectFields {
        parse_subject(&self.inner.info.subject)
    }

    /// extensionRequest 属性中的全部扩展
    fn requested_extensions(&self) -> Result<Vec<Extension>> {
        let mut extensions = Vec::new();
        for attr in self.inner.info.attributes.iter() {
            if attr.oid != EXTENSION_REQUEST {
                continue;
            }
            for value in attr.values.iter() {
                let req = ExtensionReq::from_der(&value.to_der()?)
                    .map_err(|e| PkiError::MalformedInput(format!("Invalid extension request: {e}")))?;
                extensions.extend(req.0);
            }
        }
        Ok(extensions)
    }

    /// 提取规范化请求
    pub fn normalized_request(&self) -> Result<NormalizedRequest> {
        let mut request = NormalizedRequest {
            subject: self.subject(),
            ..Default::default()
        };

        for ext in self.requested_extensions()? {
            let value = ext.extn_value.as_bytes();
            if ext.extn_id == KEY_USAGE {
                let ku = KeyUsageExtension::from_der(value)
                    .map_err(|e| PkiError::MalformedInput(format!("Invalid key usage extension: {e}")))?;
                request.key_usages = Some(decode_key_usages(&ku));
            } else if ext.extn_id == EXT_KEY_USAGE {
                let eku = EkuExtension::from_der(value).map_err(|e| {
                    PkiError::MalformedInput(format!("Invalid extended key usage extension: {e}"))
                })?;
                request.extended_key_usages = Some(decode_extended_key_usages(&eku)?);
            } else if ext.extn_id == SUBJECT_ALT_NAME {
                let san = SanExtension::from_der(value).map_err(|e| {
                    PkiError::MalformedInput(format!("Invalid subject alternative name extension: {e}"))
                })?;
                request.subject_alt_names = Some(decode_sans(&san)?);
            }
        }

        Ok(request)
    }

    /// 识别密钥算法与签名算法
    pub fn algorithms(&self) -> Result<CsrAlgorithms> {
        let spki = &self.inner.info.public_key;

        let key_algorithm = if spki.algorithm.oid == RSA_ENCRYPTION {
            let key = pkcs1::RsaPublicKey::from_der(spki.subject_public_key.raw_bytes())
                .map_err(|e| PkiError::MalformedInput(format!("Invalid RSA public key: {e}")))?;
            let bits = modulus_bits(key.modulus.as_bytes());
            RSA_KEY_SIZES
                .iter()
                .find(|(size, _)| *size == bits)
                .map(|(_, alg)| *alg)
                .ok_or_else(|| PkiError::MalformedInput(format!("Unsupported RSA key size: {bits}")))?
        } else if spki.algorithm.oid == EC_PUBLIC_KEY {
            let curve = spki
                .algorithm
                .parameters
                .as_ref()
                .ok_or_else(|| PkiError::MalformedInput("EC public key is missing curve parameters".to_string()))?
                .decode_as::<ObjectIdentifier>()
                .map_err(|e| PkiError::MalformedInput(format!("Invalid EC curve parameters: {e}")))?;
            EC_CURVES
                .iter()
                .find(|(oid, _)| *oid == curve)
                .map(|(_, alg)| *alg)
                .ok_or_else(|| PkiError::MalformedInput(format!("Unsupported EC curve: {curve}")))?
        } else {
            return Err(PkiError::MalformedInput(format!(
                "Unsupported public key algorithm: {}",
                spki.algorithm.oid
            )));
        };

        let sig_oid = self.inner.algorithm.oid;
        let signature_algorithm = SIGNATURE_OIDS
            .iter()
            .find(|(oid, _)| *oid == sig_oid)
            .map(|(_, alg)| *alg)
            .ok_or_else(|| PkiError::MalformedInput(format!("Unsupported signature algorithm: {sig_oid}")))?;

        Ok(CsrAlgorithms {
            key_algorithm,
            signature_algorithm,
        })
    }
}

/// 从 PEM 编码的 CSR 提取规范化请求
pub fn extract_request(csr_pem: &str) -> Result<NormalizedRequest> {
    Csr::from_pem(csr_pem)?.normalized_request()
}

/// 从 PEM 编码的 CSR 识别算法
pub fn extract_algorithms(csr_pem: &str) -> Result<CsrAlgorithms> {
    Csr::from_pem(csr_pem)?.algorithms()
}

fn modulus_bits(modulus: &[u8]) -> usize {
    let trimmed: &[u8] = match modulus.iter().position(|b| *b != 0) {
        Some(start) => &modulus[start..],
        None => return 0,
    };
    (trimmed.len() - 1) * 8 + (8 - trimmed[0].leading_zeros() as usize)
}

fn directory_string(value: &Any) -> Option<String> {
    if let Ok(s) = Utf8StringRef::try_from(value) {
        return Some(s.as_str().to_string());
    }
    if let Ok(s) = PrintableStringRef::try_from(value) {
        return Some(s.as_str().to_string());
    }
    if let Ok(s) = Ia5StringRef::try_from(value) {
        return Some(s.as_str().to_string());
    }
    None
}

pub(crate) fn parse_subject(name: &Name) -> SubjectFields {
    let mut subject = SubjectFields::default();

    for rdn in name.0.iter() {
        for attr in rdn.0.iter() {
            let Some((_, slot)) = SUBJECT_OIDS.iter().find(|(oid, _)| *oid == attr.oid) else {
                continue;
            };
            let Some(value) = directory_string(&attr.value) else {
                tracing::debug!(oid = %attr.oid, "skipping subject attribute with unsupported string type");
                continue;
            };
            let field = match slot {
                SubjectSlot::CommonName => &mut subject.common_name,
                SubjectSlot::Organization => &mut subject.organization,
                SubjectSlot::OrganizationalUnit => &mut subject.organizational_unit,
                SubjectSlot::Country => &mut subject.country,
                SubjectSlot::State => &mut subject.state,
                SubjectSlot::Locality => &mut subject.locality,
            };
            *field = Some(value);
        }
    }

    subject
}

fn decode_key_usages(ku: &KeyUsageExtension) -> Vec<KeyUsage> {
    let bits = [
        (ku.digital_signature(), KeyUsage::DigitalSignature),
        (ku.non_repudiation(), KeyUsage::NonRepudiation),
        (ku.key_encipherment(), KeyUsage::KeyEncipherment),
        (ku.data_encipherment(), KeyUsage::DataEncipherment),
        (ku.key_agreement(), KeyUsage::KeyAgreement),
        (ku.key_cert_sign(), KeyUsage::KeyCertSign),
        (ku.crl_sign(), KeyUsage::CrlSign),
        (ku.encipher_only(), KeyUsage::EncipherOnly),
        (ku.decipher_only(), KeyUsage::DecipherOnly),
    ];
    bits.into_iter()
        .filter_map(|(set, usage)| set.then_some(usage))
        .collect()
}

fn decode_extended_key_usages(eku: &EkuExtension) -> Result<Vec<ExtendedKeyUsage>> {
    eku.0
        .iter()
        .map(|oid| {
            ExtendedKeyUsage::from_oid(&oid.to_string()).ok_or_else(|| {
                PkiError::MalformedInput(format!("Unknown extended key usage OID: {oid}"))
            })
        })
        .collect()
}

fn decode_sans(san: &SanExtension) -> Result<Vec<SubjectAltName>> {
    san.0
        .iter()
        .map(|name| match name {
            GeneralName::DnsName(dns) => Ok(SubjectAltName::new(SanType::DnsName, dns.to_string())),
            GeneralName::Rfc822Name(email) => Ok(SubjectAltName::new(SanType::Email, email.to_string())),
            GeneralName::UniformResourceIdentifier(uri) => {
                Ok(SubjectAltName::new(SanType::Uri, uri.to_string()))
            }
            GeneralName::IpAddress(octets) => {
                let ip = ip_from_octets(octets.as_bytes())?;
                Ok(SubjectAltName::new(SanType::IpAddress, ip.to_string()))
            }
            _ => Err(PkiError::MalformedInput(
                "Unsupported subject alternative name type in CSR".to_string(),
            )),
        })
        .collect()
}

fn ip_from_octets(bytes: &[u8]) -> Result<IpAddr> {
    if let Ok(v4) = <[u8; 4]>::try_from(bytes) {
        return Ok(IpAddr::V4(Ipv4Addr::from(v4)));
    }
    if let Ok(v6) = <[u8; 16]>::try_from(bytes) {
        return Ok(IpAddr::V6(Ipv6Addr::from(v6)));
    }
    Err(PkiError::MalformedInput(format!(
        "Invalid IP address length in subject alternative name: {}",
        bytes.len()
    )))
}

#[cfg(test)]
mod tests {
    use der::asn1::{BitString, UintRef};
    use rcgen::{
        CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, KeyPair,
        KeyUsagePurpose, SanType as RcgenSanType, PKCS_ECDSA_P256_SHA256, PKCS_RSA_SHA256,
    };

    use super::*;

    fn rsa_key_pair(bits: usize) -> KeyPair {
        use rsa::pkcs8::{EncodePrivateKey, LineEnding};

        let key = rsa::RsaPrivateKey::new(&mut rand::thread_rng(), bits).unwrap();
        let pem = key.to_pkcs8_pem(LineEnding::LF).unwrap();
        KeyPair::from_pkcs8_pem_and_sign_algo(&pem, &PKCS_RSA_SHA256).unwrap()
    }

    fn csr_pem(key_pair: &KeyPair) -> String {
        let mut params = CertificateParams::new(vec!["api.corp.io".to_string()]).unwrap();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, "api.corp.io");
        dn.push(DnType::OrganizationName, "Corp");
        dn.push(DnType::CountryName, "US");
        params.distinguished_name = dn;
        params.subject_alt_names.push(RcgenSanType::IpAddress("10.1.2.3".parse().unwrap()));
        params.subject_alt_names.push(RcgenSanType::Rfc822Name("ops@corp.io".try_into().unwrap()));
        params.key_usages = vec![KeyUsagePurpose::DigitalSignature, KeyUsagePurpose::KeyEncipherment];
        params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
        params.serialize_request(key_pair).unwrap().pem().unwrap()
    }

    #[test]
    fn test_rsa_2048_sha256_algorithms() {
        let pem = csr_pem(&rsa_key_pair(2048));
        let algorithms = extract_algorithms(&pem).unwrap();
        assert_eq!(algorithms.key_algorithm, KeyAlgorithm::Rsa2048);
        assert_eq!(algorithms.signature_algorithm, SignatureAlgorithm::RsaSha256);
    }

    #[test]
    fn test_p256_sha256_algorithms() {
        let key_pair = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256).unwrap();
        let algorithms = extract_algorithms(&csr_pem(&key_pair)).unwrap();
        assert_eq!(algorithms.key_algorithm, KeyAlgorithm::EcdsaP256);
        assert_eq!(algorithms.signature_algorithm, SignatureAlgorithm::EcdsaSha256);
    }

    #[test]
    fn test_extract_request_fields() {
        let key_pair = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256).unwrap();
        let request = extract_request(&csr_pem(&key_pair)).unwrap();

        assert_eq!(request.subject.common_name.as_deref(), Some("api.corp.io"));
        assert_eq!(request.subject.organization.as_deref(), Some("Corp"));
        assert_eq!(request.subject.country.as_deref(), Some("US"));
        assert_eq!(
            request.key_usages,
            Some(vec![KeyUsage::DigitalSignature, KeyUsage::KeyEncipherment])
        );
        assert_eq!(request.extended_key_usages, Some(vec![ExtendedKeyUsage::ServerAuth]));
        assert_eq!(
            request.subject_alt_names,
            Some(vec![
                SubjectAltName::dns("api.corp.io"),
                SubjectAltName::new(SanType::IpAddress, "10.1.2.3"),
                SubjectAltName::new(SanType::Email, "ops@corp.io"),
            ])
        );
    }

    #[test]
    fn test_8192_bit_rsa_is_rejected() {
        // 手工构造 8192 位模数的 CSR，签名内容无关紧要
        let template = Csr::from_pem(&csr_pem(&rsa_key_pair(2048))).unwrap().inner;

        let mut modulus = vec![0xC5u8; 1024];
        modulus[1023] |= 1;
        let public_key = pkcs1::RsaPublicKey {
            modulus: UintRef::new(&modulus).unwrap(),
            public_exponent: UintRef::new(&[0x01, 0x00, 0x01]).unwrap(),
        };
        let mut info = template.info.clone();
        info.public_key.subject_public_key =
            BitString::from_bytes(&public_key.to_der().unwrap()).unwrap();
        let forged = CertReq {
            info,
            algorithm: template.algorithm.clone(),
            signature: template.signature.clone(),
        };
        let pem = pem::encode(&pem::Pem::new("CERTIFICATE REQUEST", forged.to_der().unwrap()));

        let err = extract_algorithms(&pem).unwrap_err();
        assert_eq!(err.to_string(), "Unsupported RSA key size: 8192");
    }

    #[test]
    fn test_rejects_wrong_pem_tag() {
        let pem = pem::encode(&pem::Pem::new("CERTIFICATE", vec![0x30, 0x00]));
        assert!(matches!(extract_request(&pem), Err(PkiError::MalformedInput(_))));
    }

    #[test]
    fn test_modulus_bits() {
        assert_eq!(modulus_bits(&[0x00, 0x80, 0x00]), 16);
        assert_eq!(modulus_bits(&[0x01, 0xff]), 9);
        assert_eq!(modulus_bits(&[]), 0);
    }
}

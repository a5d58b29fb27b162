//! 证书生成
//!
//! 按策略裁剪主题与 SAN，生成密钥对并用 rcgen 构建证书。

use std::{net::IpAddr, sync::LazyLock};

use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyUsagePurpose, SanType as RcgenSanType, SerialNumber,
};
use regex::Regex;
use time::OffsetDateTime;

use super::types::SelfSignedCertificate;
use crate::{
    error::{PkiError, Result},
    keystore::generate_key_pair,
    policy::CertificatePolicy,
    ra::{CertificateRequestInput, SubjectFields, ValidityRequest},
    types::{
        ExtendedKeyUsage, KeyAlgorithm, KeyUsage, SanType, SignatureAlgorithm, SubjectAltName,
        SubjectAttributeType,
    },
};

static IPV4: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,3}(\.\d{1,3}){3}$").expect("valid IPv4 pattern"));
static IPV6: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9a-fA-F]{1,4}:){7}[0-9a-fA-F]{1,4}$").expect("valid IPv6 pattern")
});
static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@]+@[^@]+\.[^@]+$").expect("valid email pattern"));
static URI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.-]*:").expect("valid URI pattern"));

/// 推断无类型 SAN 值的类型：IP → 邮箱 → URI → DNS
pub fn detect_san_type(value: &str) -> SanType {
    if IPV4.is_match(value) || IPV6.is_match(value) {
        SanType::IpAddress
    } else if EMAIL.is_match(value) {
        SanType::Email
    } else if URI.is_match(value) {
        SanType::Uri
    } else {
        SanType::DnsName
    }
}

/// 按策略决定写入证书的主题属性
///
/// 策略定义了主题规则时，仅包含有规则且未被整体禁止（denied 含 `*`）的属性；
/// 否则包含请求中的全部属性。
pub fn build_certificate_subject(
    subject: &SubjectFields,
    policy: Option<&CertificatePolicy>,
) -> SubjectFields {
    let rules = policy
        .and_then(|p| p.subject.as_deref())
        .filter(|rules| !rules.is_empty());

    let Some(rules) = rules else {
        return subject.clone();
    };

    let keep = |attr: SubjectAttributeType, value: &Option<String>| -> Option<String> {
        let rule = rules.iter().find(|r| r.attribute == attr)?;
        if rule.rule.prohibits_all() {
            return None;
        }
        value.clone()
    };

    SubjectFields {
        common_name: keep(SubjectAttributeType::CommonName, &subject.common_name),
        organization: keep(SubjectAttributeType::Organization, &subject.organization),
        organizational_unit: keep(
            SubjectAttributeType::OrganizationalUnit,
            &subject.organizational_unit,
        ),
        country: keep(SubjectAttributeType::Country, &subject.country),
        state: keep(SubjectAttributeType::State, &subject.state),
        locality: keep(SubjectAttributeType::Locality, &subject.locality),
    }
}

/// 去掉策略整体禁止的 SAN 类型
pub fn build_subject_alt_names(
    sans: &[SubjectAltName],
    policy: Option<&CertificatePolicy>,
) -> Vec<SubjectAltName> {
    sans.iter()
        .filter(|san| {
            !policy
                .and_then(|p| p.san_rule(san.san_type))
                .is_some_and(|rule| rule.rule.prohibits_all())
        })
        .cloned()
        .collect()
}

/// 证书记录上保存的 SAN 字符串
pub fn alt_names_string(sans: &[SubjectAltName]) -> String {
    sans.iter()
        .map(|san| san.value.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

/// 计算有效期：`not_before` 缺省为当前时间，`not_after` 取显式值或 `not_before + TTL`
pub fn resolve_validity(
    validity: &ValidityRequest,
    now: OffsetDateTime,
) -> Result<(OffsetDateTime, OffsetDateTime)> {
    let not_before = validity.not_before.unwrap_or(now);
    let not_before = not_before.replace_nanosecond(0).unwrap_or(not_before);

    let not_after = match (validity.not_after, validity.ttl) {
        (Some(not_after), _) => not_after,
        (None, Some(ttl)) => not_before + ttl.duration(),
        (None, None) => {
            return Err(PkiError::MalformedInput(
                "Either TTL or notAfter must be provided".to_string(),
            ))
        }
    };

    if not_after <= not_before {
        return Err(PkiError::MalformedInput(
            "notBefore must be earlier than notAfter".to_string(),
        ));
    }

    Ok((not_before, not_after))
}

/// 构建证书所需的全部字段
#[derive(Debug, Clone)]
pub struct CertificateSpec {
    pub subject: SubjectFields,
    pub sans: Vec<SubjectAltName>,
    pub key_usages: Vec<KeyUsage>,
    pub extended_key_usages: Vec<ExtendedKeyUsage>,
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
    pub is_ca: bool,
    /// -1 表示不限
    pub path_length: Option<i32>,
}

/// 生成正数的 16 字节随机序列号
pub fn random_serial() -> Result<(SerialNumber, String)> {
    let mut serial = [0u8; 16];
    getrandom::fill(&mut serial)
        .map_err(|e| PkiError::GenerationError(format!("Failed to generate serial number: {e}")))?;
    serial[0] = (serial[0] & 0x7f).max(1);
    Ok((SerialNumber::from(serial.to_vec()), hex::encode(serial)))
}

pub(crate) fn distinguished_name(subject: &SubjectFields) -> DistinguishedName {
    let mut dn = DistinguishedName::new();
    let entries = [
        (DnType::CommonName, &subject.common_name),
        (DnType::OrganizationName, &subject.organization),
        (DnType::OrganizationalUnitName, &subject.organizational_unit),
        (DnType::CountryName, &subject.country),
        (DnType::StateOrProvinceName, &subject.state),
        (DnType::LocalityName, &subject.locality),
    ];
    for (dn_type, value) in entries {
        if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
            dn.push(dn_type, value);
        }
    }
    dn
}

fn rcgen_san(san: &SubjectAltName) -> Result<RcgenSanType> {
    let value = san.value.clone();
    Ok(match san.san_type {
        SanType::DnsName => RcgenSanType::DnsName(value.try_into()?),
        SanType::Email => RcgenSanType::Rfc822Name(value.try_into()?),
        SanType::Uri => RcgenSanType::URI(value.try_into()?),
        SanType::IpAddress => {
            let ip: IpAddr = value.parse().map_err(|_| {
                PkiError::MalformedInput(format!("Invalid IP address SAN: {}", san.value))
            })?;
            RcgenSanType::IpAddress(ip)
        }
    })
}

fn rcgen_key_usage(usage: KeyUsage) -> KeyUsagePurpose {
    match usage {
        KeyUsage::DigitalSignature => KeyUsagePurpose::DigitalSignature,
        KeyUsage::NonRepudiation => KeyUsagePurpose::ContentCommitment,
        KeyUsage::KeyEncipherment => KeyUsagePurpose::KeyEncipherment,
        KeyUsage::DataEncipherment => KeyUsagePurpose::DataEncipherment,
        KeyUsage::KeyAgreement => KeyUsagePurpose::KeyAgreement,
        KeyUsage::KeyCertSign => KeyUsagePurpose::KeyCertSign,
        KeyUsage::CrlSign => KeyUsagePurpose::CrlSign,
        KeyUsage::EncipherOnly => KeyUsagePurpose::EncipherOnly,
        KeyUsage::DecipherOnly => KeyUsagePurpose::DecipherOnly,
    }
}

fn rcgen_eku(eku: ExtendedKeyUsage) -> ExtendedKeyUsagePurpose {
    match eku {
        ExtendedKeyUsage::ServerAuth => ExtendedKeyUsagePurpose::ServerAuth,
        ExtendedKeyUsage::ClientAuth => ExtendedKeyUsagePurpose::ClientAuth,
        ExtendedKeyUsage::CodeSigning => ExtendedKeyUsagePurpose::CodeSigning,
        ExtendedKeyUsage::EmailProtection => ExtendedKeyUsagePurpose::EmailProtection,
        ExtendedKeyUsage::TimeStamping => ExtendedKeyUsagePurpose::TimeStamping,
        ExtendedKeyUsage::OcspSigning => ExtendedKeyUsagePurpose::OcspSigning,
    }
}

/// 基本约束：CA 证书按路径长度约束，非 CA 证书显式写入 CA=false
pub(crate) fn basic_constraints(is_ca: bool, path_length: Option<i32>) -> Result<IsCa> {
    if !is_ca {
        return Ok(IsCa::ExplicitNoCa);
    }
    match path_length {
        None | Some(-1) => Ok(IsCa::Ca(BasicConstraints::Unconstrained)),
        Some(len) => u8::try_from(len)
            .map(|len| IsCa::Ca(BasicConstraints::Constrained(len)))
            .map_err(|_| PkiError::MalformedInput(format!("Invalid path length: {len}"))),
    }
}

impl CertificateSpec {
    /// 转为 rcgen 参数，返回参数与十六进制序列号
    pub fn to_params(&self) -> Result<(CertificateParams, String)> {
        let mut params = CertificateParams::default();
        params.distinguished_name = distinguished_name(&self.subject);
        params.subject_alt_names = self.sans.iter().map(rcgen_san).collect::<Result<_>>()?;
        params.not_before = self.not_before;
        params.not_after = self.not_after;
        params.is_ca = basic_constraints(self.is_ca, self.path_length)?;
        params.key_usages = self.key_usages.iter().copied().map(rcgen_key_usage).collect();
        params.extended_key_usages = self
            .extended_key_usages
            .iter()
            .copied()
            .map(rcgen_eku)
            .collect();

        let (serial, serial_hex) = random_serial()?;
        params.serial_number = Some(serial);
        Ok((params, serial_hex))
    }
}

/// 生成自签名证书
pub fn generate_self_signed(
    request: &CertificateRequestInput,
    policy: Option<&CertificatePolicy>,
    signature_algorithm: SignatureAlgorithm,
    key_algorithm: KeyAlgorithm,
) -> Result<SelfSignedCertificate> {
    generate_self_signed_at(
        request,
        policy,
        signature_algorithm,
        key_algorithm,
        OffsetDateTime::now_utc(),
    )
}

pub(crate) fn generate_self_signed_at(
    request: &CertificateRequestInput,
    policy: Option<&CertificatePolicy>,
    signature_algorithm: SignatureAlgorithm,
    key_algorithm: KeyAlgorithm,
    now: OffsetDateTime,
) -> Result<SelfSignedCertificate> {
    let subject = build_certificate_subject(&request.subject, policy);
    let sans = build_subject_alt_names(request.sans(), policy);
    let (not_before, not_after) = resolve_validity(&request.validity, now)?;

    let spec = CertificateSpec {
        subject: subject.clone(),
        sans: sans.clone(),
        key_usages: request.key_usages().to_vec(),
        extended_key_usages: request.extended_key_usages().to_vec(),
        not_before,
        not_after,
        is_ca: false,
        path_length: None,
    };
    let (params, serial_number) = spec.to_params()?;

    let key_pair = generate_key_pair(key_algorithm, signature_algorithm)?;
    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| PkiError::GenerationError(format!("Failed to create certificate: {e}")))?;

    tracing::debug!(
        serial_number = %serial_number,
        key_algorithm = %key_algorithm,
        "generated self-signed certificate"
    );

    Ok(SelfSignedCertificate {
        certificate_pem: cert.pem(),
        private_key_pem: key_pair.serialize_pem(),
        serial_number,
        not_before,
        not_after,
        subject,
        alt_names: alt_names_string(&sans),
        sans,
    })
}

/// 有效期按天取整后的长度
pub fn validity_days(not_before: OffsetDateTime, not_after: OffsetDateTime) -> i64 {
    crate::types::days_ceil(not_after - not_before)
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;
    use uuid::Uuid;

    use super::*;
    use crate::{
        cert::parse_certificate,
        policy::{AttributeRule, PatternRule, SanRule},
        types::Ttl,
    };

    fn request() -> CertificateRequestInput {
        CertificateRequestInput {
            subject: SubjectFields {
                common_name: Some("api.corp.io".into()),
                organization: Some("Corp".into()),
                ..Default::default()
            },
            subject_alt_names: Some(vec![
                SubjectAltName::dns("api.corp.io"),
                SubjectAltName::new(SanType::IpAddress, "10.0.0.7"),
            ]),
            key_usages: Some(vec![KeyUsage::DigitalSignature]),
            extended_key_usages: Some(vec![ExtendedKeyUsage::ServerAuth]),
            validity: ValidityRequest::ttl(Ttl::days(30)),
            ..Default::default()
        }
    }

    #[test]
    fn test_detect_san_type() {
        assert_eq!(detect_san_type("10.0.0.1"), SanType::IpAddress);
        assert_eq!(detect_san_type("2001:0db8:0000:0000:0000:ff00:0042:8329"), SanType::IpAddress);
        assert_eq!(detect_san_type("ops@corp.io"), SanType::Email);
        assert_eq!(detect_san_type("spiffe://corp/api"), SanType::Uri);
        assert_eq!(detect_san_type("api.corp.io"), SanType::DnsName);
        // 压缩形式的 IPv6 不被识别为 IP
        assert_eq!(detect_san_type("::1"), SanType::DnsName);
    }

    #[test]
    fn test_subject_follows_policy_rules() {
        let mut policy = CertificatePolicy::empty(Uuid::new_v4(), "p");
        policy.subject = Some(vec![
            AttributeRule {
                attribute: SubjectAttributeType::CommonName,
                rule: PatternRule {
                    allowed: Some(vec!["*".into()]),
                    ..Default::default()
                },
            },
            AttributeRule {
                attribute: SubjectAttributeType::Organization,
                rule: PatternRule {
                    denied: Some(vec!["*".into()]),
                    ..Default::default()
                },
            },
        ]);
        let subject = build_certificate_subject(&request().subject, Some(&policy));
        assert_eq!(subject.common_name.as_deref(), Some("api.corp.io"));
        assert_eq!(subject.organization, None);

        let unrestricted = build_certificate_subject(&request().subject, None);
        assert_eq!(unrestricted, request().subject);
    }

    #[test]
    fn test_prohibited_san_types_are_dropped() {
        let mut policy = CertificatePolicy::empty(Uuid::new_v4(), "p");
        policy.sans = Some(vec![SanRule {
            san_type: SanType::IpAddress,
            rule: PatternRule {
                denied: Some(vec!["*".into()]),
                ..Default::default()
            },
        }]);
        let sans = build_subject_alt_names(request().sans(), Some(&policy));
        assert_eq!(sans, vec![SubjectAltName::dns("api.corp.io")]);
        assert_eq!(alt_names_string(request().sans()), "api.corp.io,10.0.0.7");
    }

    #[test]
    fn test_resolve_validity() {
        let now = datetime!(2024-01-01 0:00 UTC);
        let (nb, na) = resolve_validity(&ValidityRequest::ttl(Ttl::days(31)), now).unwrap();
        assert_eq!(nb, now);
        assert_eq!(na, datetime!(2024-02-01 0:00 UTC));

        let explicit = ValidityRequest {
            ttl: None,
            not_before: None,
            not_after: Some(datetime!(2024-03-01 0:00 UTC)),
        };
        assert_eq!(resolve_validity(&explicit, now).unwrap().1, datetime!(2024-03-01 0:00 UTC));

        let err = resolve_validity(&ValidityRequest::default(), now).unwrap_err();
        assert!(matches!(err, PkiError::MalformedInput(_)));
    }

    #[test]
    fn test_generate_self_signed() {
        let generated = generate_self_signed(
            &request(),
            None,
            SignatureAlgorithm::EcdsaSha256,
            KeyAlgorithm::EcdsaP256,
        )
        .unwrap();

        assert!(generated.private_key_pem.contains("PRIVATE KEY"));
        assert_eq!(generated.alt_names, "api.corp.io,10.0.0.7");

        let info = parse_certificate(generated.certificate_pem.as_bytes()).unwrap();
        assert!(!info.is_ca);
        assert_eq!(info.serial_number, generated.serial_number);
        assert_eq!(info.subject.common_name.as_deref(), Some("api.corp.io"));
        assert_eq!(info.issuer.common_name.as_deref(), Some("api.corp.io"));
        assert_eq!(info.not_after, generated.not_after);
        assert_eq!(validity_days(info.not_before, info.not_after), 30);
    }

    #[test]
    fn test_unsupported_algorithm_pair() {
        let err = generate_self_signed(
            &request(),
            None,
            SignatureAlgorithm::EcdsaSha512,
            KeyAlgorithm::EcdsaP521,
        )
        .unwrap_err();
        assert!(matches!(err, PkiError::Unsupported(_)));
    }

    #[test]
    fn test_path_length_constraints() {
        assert!(matches!(basic_constraints(false, Some(3)).unwrap(), IsCa::ExplicitNoCa));
        assert!(matches!(
            basic_constraints(true, Some(-1)).unwrap(),
            IsCa::Ca(BasicConstraints::Unconstrained)
        ));
        assert!(matches!(
            basic_constraints(true, Some(2)).unwrap(),
            IsCa::Ca(BasicConstraints::Constrained(2))
        ));
        assert!(basic_constraints(true, Some(-5)).is_err());
    }
}

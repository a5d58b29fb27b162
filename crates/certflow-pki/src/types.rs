//! 证书领域通用类型
//!
//! 密钥用途、扩展密钥用途、SAN、主题属性、算法以及 TTL 的规范化表示。

use std::{fmt, str::FromStr, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use time::Duration;

use crate::error::{PkiError, Result};

static TTL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)([smhdy])$").expect("valid TTL pattern"));

/// 密钥用途
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyUsage {
    DigitalSignature,
    NonRepudiation,
    KeyEncipherment,
    DataEncipherment,
    KeyAgreement,
    KeyCertSign,
    CrlSign,
    EncipherOnly,
    DecipherOnly,
}

impl KeyUsage {
    pub const ALL: [KeyUsage; 9] = [
        KeyUsage::DigitalSignature,
        KeyUsage::NonRepudiation,
        KeyUsage::KeyEncipherment,
        KeyUsage::DataEncipherment,
        KeyUsage::KeyAgreement,
        KeyUsage::KeyCertSign,
        KeyUsage::CrlSign,
        KeyUsage::EncipherOnly,
        KeyUsage::DecipherOnly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            KeyUsage::DigitalSignature => "digital_signature",
            KeyUsage::NonRepudiation => "non_repudiation",
            KeyUsage::KeyEncipherment => "key_encipherment",
            KeyUsage::DataEncipherment => "data_encipherment",
            KeyUsage::KeyAgreement => "key_agreement",
            KeyUsage::KeyCertSign => "key_cert_sign",
            KeyUsage::CrlSign => "crl_sign",
            KeyUsage::EncipherOnly => "encipher_only",
            KeyUsage::DecipherOnly => "decipher_only",
        }
    }
}

impl fmt::Display for KeyUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyUsage {
    type Err = PkiError;

    fn from_str(s: &str) -> Result<Self> {
        KeyUsage::ALL
            .into_iter()
            .find(|usage| usage.as_str() == s)
            .ok_or_else(|| PkiError::MalformedInput(format!("Unknown key usage: {s}")))
    }
}

/// 扩展密钥用途
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtendedKeyUsage {
    ServerAuth,
    ClientAuth,
    CodeSigning,
    EmailProtection,
    TimeStamping,
    OcspSigning,
}

impl ExtendedKeyUsage {
    pub const ALL: [ExtendedKeyUsage; 6] = [
        ExtendedKeyUsage::ServerAuth,
        ExtendedKeyUsage::ClientAuth,
        ExtendedKeyUsage::CodeSigning,
        ExtendedKeyUsage::EmailProtection,
        ExtendedKeyUsage::TimeStamping,
        ExtendedKeyUsage::OcspSigning,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExtendedKeyUsage::ServerAuth => "server_auth",
            ExtendedKeyUsage::ClientAuth => "client_auth",
            ExtendedKeyUsage::CodeSigning => "code_signing",
            ExtendedKeyUsage::EmailProtection => "email_protection",
            ExtendedKeyUsage::TimeStamping => "time_stamping",
            ExtendedKeyUsage::OcspSigning => "ocsp_signing",
        }
    }

    /// id-kp 下的 OID 弧（1.3.6.1.5.5.7.3.x）
    pub fn oid_arc(&self) -> u64 {
        match self {
            ExtendedKeyUsage::ServerAuth => 1,
            ExtendedKeyUsage::ClientAuth => 2,
            ExtendedKeyUsage::CodeSigning => 3,
            ExtendedKeyUsage::EmailProtection => 4,
            ExtendedKeyUsage::TimeStamping => 8,
            ExtendedKeyUsage::OcspSigning => 9,
        }
    }

    /// 点分形式的 OID
    pub fn oid(&self) -> String {
        format!("1.3.6.1.5.5.7.3.{}", self.oid_arc())
    }

    pub fn from_oid(oid: &str) -> Option<Self> {
        ExtendedKeyUsage::ALL.into_iter().find(|eku| eku.oid() == oid)
    }
}

impl fmt::Display for ExtendedKeyUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExtendedKeyUsage {
    type Err = PkiError;

    fn from_str(s: &str) -> Result<Self> {
        ExtendedKeyUsage::ALL
            .into_iter()
            .find(|eku| eku.as_str() == s)
            .ok_or_else(|| PkiError::MalformedInput(format!("Unknown extended key usage: {s}")))
    }
}

/// SAN 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SanType {
    DnsName,
    IpAddress,
    Email,
    Uri,
}

impl SanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SanType::DnsName => "dns_name",
            SanType::IpAddress => "ip_address",
            SanType::Email => "email",
            SanType::Uri => "uri",
        }
    }
}

impl fmt::Display for SanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 主题备用名称条目
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubjectAltName {
    #[serde(rename = "type")]
    pub san_type: SanType,
    pub value: String,
}

impl SubjectAltName {
    pub fn new(san_type: SanType, value: impl Into<String>) -> Self {
        Self {
            san_type,
            value: value.into(),
        }
    }

    pub fn dns(value: impl Into<String>) -> Self {
        Self::new(SanType::DnsName, value)
    }
}

/// 主题属性类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectAttributeType {
    CommonName,
    Organization,
    OrganizationalUnit,
    Country,
    State,
    Locality,
}

impl SubjectAttributeType {
    pub const ALL: [SubjectAttributeType; 6] = [
        SubjectAttributeType::CommonName,
        SubjectAttributeType::Organization,
        SubjectAttributeType::OrganizationalUnit,
        SubjectAttributeType::Country,
        SubjectAttributeType::State,
        SubjectAttributeType::Locality,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectAttributeType::CommonName => "common_name",
            SubjectAttributeType::Organization => "organization",
            SubjectAttributeType::OrganizationalUnit => "organizational_unit",
            SubjectAttributeType::Country => "country",
            SubjectAttributeType::State => "state",
            SubjectAttributeType::Locality => "locality",
        }
    }
}

impl fmt::Display for SubjectAttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 签名算法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    #[serde(rename = "RSA-SHA256")]
    RsaSha256,
    #[serde(rename = "RSA-SHA384")]
    RsaSha384,
    #[serde(rename = "RSA-SHA512")]
    RsaSha512,
    #[serde(rename = "ECDSA-SHA256")]
    EcdsaSha256,
    #[serde(rename = "ECDSA-SHA384")]
    EcdsaSha384,
    #[serde(rename = "ECDSA-SHA512")]
    EcdsaSha512,
}

impl SignatureAlgorithm {
    pub const ALL: [SignatureAlgorithm; 6] = [
        SignatureAlgorithm::RsaSha256,
        SignatureAlgorithm::RsaSha384,
        SignatureAlgorithm::RsaSha512,
        SignatureAlgorithm::EcdsaSha256,
        SignatureAlgorithm::EcdsaSha384,
        SignatureAlgorithm::EcdsaSha512,
    ];

    /// API 名称，例如 `RSA-SHA256`
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureAlgorithm::RsaSha256 => "RSA-SHA256",
            SignatureAlgorithm::RsaSha384 => "RSA-SHA384",
            SignatureAlgorithm::RsaSha512 => "RSA-SHA512",
            SignatureAlgorithm::EcdsaSha256 => "ECDSA-SHA256",
            SignatureAlgorithm::EcdsaSha384 => "ECDSA-SHA384",
            SignatureAlgorithm::EcdsaSha512 => "ECDSA-SHA512",
        }
    }

    /// 策略中使用的名称，例如 `SHA256-RSA`
    pub fn policy_name(&self) -> &'static str {
        match self {
            SignatureAlgorithm::RsaSha256 => "SHA256-RSA",
            SignatureAlgorithm::RsaSha384 => "SHA384-RSA",
            SignatureAlgorithm::RsaSha512 => "SHA512-RSA",
            SignatureAlgorithm::EcdsaSha256 => "SHA256-ECDSA",
            SignatureAlgorithm::EcdsaSha384 => "SHA384-ECDSA",
            SignatureAlgorithm::EcdsaSha512 => "SHA512-ECDSA",
        }
    }

    pub fn is_rsa(&self) -> bool {
        matches!(
            self,
            SignatureAlgorithm::RsaSha256 | SignatureAlgorithm::RsaSha384 | SignatureAlgorithm::RsaSha512
        )
    }
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignatureAlgorithm {
    type Err = PkiError;

    /// 同时接受 API 名称与策略名称
    fn from_str(s: &str) -> Result<Self> {
        SignatureAlgorithm::ALL
            .into_iter()
            .find(|alg| alg.as_str() == s || alg.policy_name() == s)
            .ok_or_else(|| PkiError::MalformedInput(format!("Unsupported signature algorithm: {s}")))
    }
}

/// 密钥算法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyAlgorithm {
    #[serde(rename = "RSA_2048")]
    Rsa2048,
    #[serde(rename = "RSA_3072")]
    Rsa3072,
    #[serde(rename = "RSA_4096")]
    Rsa4096,
    #[serde(rename = "EC_prime256v1")]
    EcdsaP256,
    #[serde(rename = "EC_secp384r1")]
    EcdsaP384,
    #[serde(rename = "EC_secp521r1")]
    EcdsaP521,
}

impl KeyAlgorithm {
    pub const ALL: [KeyAlgorithm; 6] = [
        KeyAlgorithm::Rsa2048,
        KeyAlgorithm::Rsa3072,
        KeyAlgorithm::Rsa4096,
        KeyAlgorithm::EcdsaP256,
        KeyAlgorithm::EcdsaP384,
        KeyAlgorithm::EcdsaP521,
    ];

    /// 存储名称，例如 `RSA_2048`、`EC_prime256v1`
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyAlgorithm::Rsa2048 => "RSA_2048",
            KeyAlgorithm::Rsa3072 => "RSA_3072",
            KeyAlgorithm::Rsa4096 => "RSA_4096",
            KeyAlgorithm::EcdsaP256 => "EC_prime256v1",
            KeyAlgorithm::EcdsaP384 => "EC_secp384r1",
            KeyAlgorithm::EcdsaP521 => "EC_secp521r1",
        }
    }

    /// 策略中使用的名称，例如 `RSA-2048`、`ECDSA-P256`
    pub fn policy_name(&self) -> &'static str {
        match self {
            KeyAlgorithm::Rsa2048 => "RSA-2048",
            KeyAlgorithm::Rsa3072 => "RSA-3072",
            KeyAlgorithm::Rsa4096 => "RSA-4096",
            KeyAlgorithm::EcdsaP256 => "ECDSA-P256",
            KeyAlgorithm::EcdsaP384 => "ECDSA-P384",
            KeyAlgorithm::EcdsaP521 => "ECDSA-P521",
        }
    }

    pub fn is_rsa(&self) -> bool {
        matches!(
            self,
            KeyAlgorithm::Rsa2048 | KeyAlgorithm::Rsa3072 | KeyAlgorithm::Rsa4096
        )
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyAlgorithm {
    type Err = PkiError;

    fn from_str(s: &str) -> Result<Self> {
        KeyAlgorithm::ALL
            .into_iter()
            .find(|alg| alg.as_str() == s || alg.policy_name() == s)
            .ok_or_else(|| PkiError::MalformedInput(format!("Unsupported key algorithm: {s}")))
    }
}

/// 未指定算法时使用的默认签名算法
pub const DEFAULT_SIGNATURE_ALGORITHM: SignatureAlgorithm = SignatureAlgorithm::RsaSha256;
/// 未指定算法时使用的默认密钥算法
pub const DEFAULT_KEY_ALGORITHM: KeyAlgorithm = KeyAlgorithm::Rsa2048;

/// TTL 单位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
    Years,
}

impl TtlUnit {
    fn suffix(&self) -> char {
        match self {
            TtlUnit::Seconds => 's',
            TtlUnit::Minutes => 'm',
            TtlUnit::Hours => 'h',
            TtlUnit::Days => 'd',
            TtlUnit::Years => 'y',
        }
    }
}

/// 有效期长度，格式为 `<数字><单位>`，如 `30d`、`12h`、`1y`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ttl {
    value: u64,
    unit: TtlUnit,
}

impl Ttl {
    pub fn days(value: u64) -> Self {
        Self {
            value,
            unit: TtlUnit::Days,
        }
    }

    pub fn duration(&self) -> Duration {
        let value = i64::try_from(self.value).unwrap_or(i64::MAX);
        match self.unit {
            TtlUnit::Seconds => Duration::seconds(value),
            TtlUnit::Minutes => Duration::minutes(value),
            TtlUnit::Hours => Duration::hours(value),
            TtlUnit::Days => Duration::days(value),
            TtlUnit::Years => Duration::days(value.saturating_mul(365)),
        }
    }

    /// 向上取整的天数
    pub fn whole_days(&self) -> i64 {
        days_ceil(self.duration())
    }
}

/// 将时长按天向上取整
pub fn days_ceil(duration: Duration) -> i64 {
    let seconds = duration.whole_seconds();
    let day = Duration::DAY.whole_seconds();
    if seconds <= 0 {
        return 0;
    }
    (seconds + day - 1) / day
}

impl FromStr for Ttl {
    type Err = PkiError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || PkiError::MalformedInput(format!("Invalid TTL format: {s}"));
        let captures = TTL_PATTERN.captures(s).ok_or_else(invalid)?;
        let value: u64 = captures[1].parse().map_err(|_| invalid())?;
        let unit = match &captures[2] {
            "s" => TtlUnit::Seconds,
            "m" => TtlUnit::Minutes,
            "h" => TtlUnit::Hours,
            "d" => TtlUnit::Days,
            "y" => TtlUnit::Years,
            _ => return Err(invalid()),
        };
        Ok(Self { value, unit })
    }
}

impl TryFrom<String> for Ttl {
    type Error = PkiError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Ttl> for String {
    fn from(value: Ttl) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Ttl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.unit.suffix())
    }
}

//! 证书配置文件（Profile）
//!
//! 配置文件把策略绑定到签发方式与注册方式，并携带请求缺省值。

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    ca::CertificateAuthority,
    error::{PkiError, Result},
    ra::{BasicConstraintsRequest, SubjectFields},
    types::{ExtendedKeyUsage, KeyAlgorithm, KeyUsage, SignatureAlgorithm, SubjectAltName, Ttl},
};

/// 签发方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssuerType {
    Ca,
    SelfSigned,
}

impl IssuerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssuerType::Ca => "ca",
            IssuerType::SelfSigned => "self-signed",
        }
    }
}

impl fmt::Display for IssuerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 注册方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentType {
    Api,
    Est,
    Acme,
}

impl EnrollmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentType::Api => "api",
            EnrollmentType::Est => "est",
            EnrollmentType::Acme => "acme",
        }
    }
}

impl fmt::Display for EnrollmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 请求未提供字段时使用的缺省值
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileDefaults {
    pub subject: SubjectFields,
    pub subject_alt_names: Option<Vec<SubjectAltName>>,
    pub key_usages: Option<Vec<KeyUsage>>,
    pub extended_key_usages: Option<Vec<ExtendedKeyUsage>>,
    pub signature_algorithm: Option<SignatureAlgorithm>,
    pub key_algorithm: Option<KeyAlgorithm>,
    pub ttl: Option<Ttl>,
    pub basic_constraints: Option<BasicConstraintsRequest>,
}

/// 证书配置文件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateProfile {
    pub id: Uuid,
    pub project_id: Uuid,
    pub slug: String,
    pub issuer_type: IssuerType,
    pub enrollment_type: EnrollmentType,
    /// 自签名配置文件为空
    pub ca_id: Option<Uuid>,
    pub policy_id: Uuid,
    #[serde(default)]
    pub defaults: ProfileDefaults,
}

impl CertificateProfile {
    /// 自签名配置文件不能绑定CA，且只支持 API 注册
    pub fn validate(&self) -> Result<()> {
        if self.issuer_type == IssuerType::SelfSigned {
            if self.ca_id.is_some() {
                return Err(PkiError::BadRequest(
                    "Self-signed profiles cannot reference a Certificate Authority".to_string(),
                ));
            }
            if self.enrollment_type != EnrollmentType::Api {
                return Err(PkiError::BadRequest(
                    "Self-signed profiles only support api enrollment".to_string(),
                ));
            }
        }
        if self.issuer_type == IssuerType::Ca && self.ca_id.is_none() {
            return Err(PkiError::BadRequest(
                "CA profiles must reference a Certificate Authority".to_string(),
            ));
        }
        Ok(())
    }

    /// 要求配置文件使用指定的注册方式
    pub fn ensure_enrollment(&self, expected: EnrollmentType) -> Result<()> {
        if self.enrollment_type != expected {
            return Err(PkiError::Forbidden(format!(
                "Profile is not configured for {expected} enrollment"
            )));
        }
        Ok(())
    }
}

/// API 注册配置
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiEnrollmentConfig {
    pub auto_renew: bool,
    pub renew_before_days: Option<u32>,
}

/// EST 注册配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstEnrollmentConfig {
    pub disable_bootstrap_ca_validation: bool,
    /// 加密后的口令
    #[serde(default)]
    pub encrypted_passphrase: Option<Vec<u8>>,
}

/// 配置文件及其注册配置与CA摘要
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileWithConfigs {
    pub profile: CertificateProfile,
    pub api_config: Option<ApiEnrollmentConfig>,
    pub est_config: Option<EstEnrollmentConfig>,
    pub ca: Option<CertificateAuthority>,
}

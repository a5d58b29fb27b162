//! 注册机构（RA）模块
//!
//! 证书请求的输入模型与请求记录的状态机：
//! - 请求输入（主题、SAN、用途、算法、有效期、基本约束）
//! - 请求记录及其状态迁移规则

pub mod request;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub use request::{CertificateRequest, RequestStatus, ResourceMetadata};

use crate::types::{
    ExtendedKeyUsage, KeyAlgorithm, KeyUsage, SignatureAlgorithm, SubjectAltName,
    SubjectAttributeType, Ttl,
};

/// 证书主题字段
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectFields {
    pub common_name: Option<String>,
    pub organization: Option<String>,
    pub organizational_unit: Option<String>,
    pub country: Option<String>,
    pub state: Option<String>,
    pub locality: Option<String>,
}

impl SubjectFields {
    pub fn with_common_name(common_name: impl Into<String>) -> Self {
        Self {
            common_name: Some(common_name.into()),
            ..Default::default()
        }
    }

    pub fn get(&self, attribute: SubjectAttributeType) -> Option<&str> {
        let value = match attribute {
            SubjectAttributeType::CommonName => &self.common_name,
            SubjectAttributeType::Organization => &self.organization,
            SubjectAttributeType::OrganizationalUnit => &self.organizational_unit,
            SubjectAttributeType::Country => &self.country,
            SubjectAttributeType::State => &self.state,
            SubjectAttributeType::Locality => &self.locality,
        };
        value.as_deref()
    }

    /// 非空属性，按固定顺序返回
    pub fn present(&self) -> Vec<(SubjectAttributeType, &str)> {
        SubjectAttributeType::ALL
            .into_iter()
            .filter_map(|attr| match self.get(attr) {
                Some(value) if !value.is_empty() => Some((attr, value)),
                _ => None,
            })
            .collect()
    }
}

/// 请求的有效期：TTL 与显式日期二选一
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidityRequest {
    pub ttl: Option<Ttl>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub not_before: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub not_after: Option<OffsetDateTime>,
}

impl ValidityRequest {
    pub fn ttl(ttl: Ttl) -> Self {
        Self {
            ttl: Some(ttl),
            ..Default::default()
        }
    }

    pub fn has_explicit_dates(&self) -> bool {
        self.not_before.is_some() || self.not_after.is_some()
    }
}

/// 请求的基本约束
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicConstraintsRequest {
    pub is_ca: bool,
    pub path_length: Option<i32>,
}

/// 证书请求输入
///
/// 所有列表字段都是 `Option`：`None` 表示请求未提供该字段，
/// 合并配置文件默认值时以"是否存在"而非"是否为空"判断。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateRequestInput {
    #[serde(default)]
    pub subject: SubjectFields,
    pub subject_alt_names: Option<Vec<SubjectAltName>>,
    pub key_usages: Option<Vec<KeyUsage>>,
    pub extended_key_usages: Option<Vec<ExtendedKeyUsage>>,
    pub signature_algorithm: Option<SignatureAlgorithm>,
    pub key_algorithm: Option<KeyAlgorithm>,
    #[serde(default)]
    pub validity: ValidityRequest,
    pub basic_constraints: Option<BasicConstraintsRequest>,
}

impl CertificateRequestInput {
    pub fn sans(&self) -> &[SubjectAltName] {
        self.subject_alt_names.as_deref().unwrap_or_default()
    }

    pub fn key_usages(&self) -> &[KeyUsage] {
        self.key_usages.as_deref().unwrap_or_default()
    }

    pub fn extended_key_usages(&self) -> &[ExtendedKeyUsage] {
        self.extended_key_usages.as_deref().unwrap_or_default()
    }

    pub fn wants_ca(&self) -> bool {
        self.basic_constraints.map(|bc| bc.is_ca).unwrap_or(false)
    }
}

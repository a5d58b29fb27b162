//! CA (Certificate Authority) 模块
//!
//! - CA 摘要信息与类型
//! - CA 能力与算法兼容性检查
//! - 签发接口与进程内 CA 实现

pub mod authority;
pub mod config;
pub mod signer;

use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

pub use authority::InternalCaSigner;
pub use config::CaConfig;
pub use signer::{CaIssuedCertificate, CaSigner, IssueFromCaParams, SignFromCaParams};

use crate::{
    error::{PkiError, Result},
    policy::CertificatePolicy,
};

/// CA类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaType {
    /// 平台内部CA
    Internal,
    /// ACME 前置的外部CA
    Acme,
    /// Azure AD CS
    AzureAdCs,
    /// AWS Private CA
    AwsPca,
}

impl CaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaType::Internal => "internal",
            CaType::Acme => "acme",
            CaType::AzureAdCs => "azure-ad-cs",
            CaType::AwsPca => "aws-pca",
        }
    }

    /// 由外部系统异步签发
    pub fn is_external_async(&self) -> bool {
        !matches!(self, CaType::Internal)
    }

    /// 可以续期的 CA 类型（内部CA与已连接的外部CA）
    pub fn supports_renewal(&self) -> bool {
        matches!(self, CaType::Internal | CaType::Acme | CaType::AzureAdCs)
    }
}

impl fmt::Display for CaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CA状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaStatus {
    Active,
    Disabled,
    PendingCertificate,
}

impl CaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaStatus::Active => "active",
            CaStatus::Disabled => "disabled",
            CaStatus::PendingCertificate => "pending_certificate",
        }
    }
}

impl fmt::Display for CaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CA 摘要
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateAuthority {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub ca_type: CaType,
    pub status: CaStatus,
    /// 存储名称，例如 `RSA_2048`、`EC_prime256v1`；外部CA可能为空
    pub key_algorithm: Option<String>,
    /// CA 证书过期时间（仅内部CA）
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub not_after: Option<OffsetDateTime>,
}

impl CertificateAuthority {
    pub fn is_active(&self) -> bool {
        self.status == CaStatus::Active
    }
}

/// 仅内部CA支持的操作
pub fn validate_ca_support(ca: &CertificateAuthority, operation: &str) -> Result<()> {
    if ca.ca_type != CaType::Internal {
        return Err(PkiError::Unsupported(format!(
            "Only internal CAs support {operation}"
        )));
    }
    Ok(())
}

/// 检查策略允许的签名算法中是否至少有一个与 CA 密钥族匹配
///
/// 只比较算法族（名称最后一段为 `RSA` 或 `ECDSA`），不枚举密钥长度。
pub fn validate_algorithm_compatibility(
    ca: &CertificateAuthority,
    policy: &CertificatePolicy,
) -> Result<()> {
    let signatures = policy.signature_algorithms();
    if signatures.is_empty() {
        return Ok(());
    }

    let ca_key_algorithm = ca
        .key_algorithm
        .as_deref()
        .filter(|alg| !alg.is_empty())
        .ok_or_else(|| PkiError::BadRequest("CA key algorithm not found".to_string()))?;

    let family = if ca_key_algorithm.starts_with("RSA") {
        Some("RSA")
    } else if ca_key_algorithm.starts_with("EC") {
        Some("ECDSA")
    } else {
        None
    };

    let compatible = signatures.iter().any(|sig| {
        let key_type = sig.rsplit('-').next().unwrap_or_default();
        family.is_some_and(|family| key_type == family)
    });

    if !compatible {
        return Err(PkiError::BadRequest(format!(
            "Policy signature algorithms ({}) are not compatible with CA key algorithm ({ca_key_algorithm})",
            signatures.join(", ")
        )));
    }
    Ok(())
}

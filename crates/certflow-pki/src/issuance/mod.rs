//! 证书签发与续期编排
//!
//! - `defaults`: 配置文件缺省值合并
//! - `route`: 签发路径选择
//! - `queue`: 外部CA异步签发队列
//! - `orchestrator`: 签发编排器
//! - `renew`: 续期与续期配置

pub mod defaults;
pub mod orchestrator;
pub mod queue;
pub mod renew;
pub mod route;
#[cfg(test)]
pub(crate) mod testing;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

pub use defaults::apply_profile_defaults;
pub use orchestrator::{effective_algorithms, IssuanceDeps, IssuanceOrchestrator};
pub use queue::{AsyncIssuanceQueue, IssuanceJob, MemoryIssuanceQueue};
pub use renew::RenewOptions;
pub use route::IssuanceRoute;

/// 已签发并保存的证书
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedCertificate {
    pub certificate_id: Uuid,
    pub project_id: Uuid,
    pub profile_slug: String,
    pub serial_number: String,
    pub common_name: String,
    pub certificate_pem: String,
    pub certificate_chain_pem: String,
    /// 自签名证书为空
    pub issuing_ca_certificate_pem: String,
    /// CSR 签发时为空
    pub private_key_pem: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub not_before: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub not_after: OffsetDateTime,
    pub renew_before_days: Option<u32>,
}

/// 签发结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IssuanceResult {
    Issued(Box<IssuedCertificate>),
    /// 已交给外部CA异步处理
    Pending { request_id: Option<Uuid> },
}

impl IssuanceResult {
    pub fn issued(&self) -> Option<&IssuedCertificate> {
        match self {
            IssuanceResult::Issued(cert) => Some(cert),
            IssuanceResult::Pending { .. } => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, IssuanceResult::Pending { .. })
    }
}

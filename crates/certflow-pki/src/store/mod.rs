//! 存储接口
//!
//! 签发与续期所依赖的外部存储。所有多行修改通过 [`TxContext`] 一次提交。

mod memory;
mod tx;

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

pub use memory::MemoryStore;
pub use tx::{CertificatePatch, EncryptedBody, TxContext, TxOp};

use crate::{
    ca::CertificateAuthority,
    cert::Certificate,
    error::Result,
    policy::CompiledPolicy,
    profile::ProfileWithConfigs,
    ra::{CertificateRequest, RequestStatus},
};

/// 策略存储，返回加载时已编译的策略
#[async_trait]
pub trait PolicyStore: Send + Sync {
    async fn find_policy_by_id(&self, id: Uuid) -> Result<Option<Arc<CompiledPolicy>>>;

    /// 引用该策略的配置文件 slug
    async fn referencing_profiles(&self, policy_id: Uuid) -> Result<Vec<String>>;
}

/// 配置文件存储
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn find_by_id_with_configs(&self, id: Uuid) -> Result<Option<ProfileWithConfigs>>;
}

/// CA 存储
#[async_trait]
pub trait CaStore: Send + Sync {
    async fn find_ca_by_id(&self, id: Uuid) -> Result<Option<CertificateAuthority>>;
}

/// 证书请求存储
#[async_trait]
pub trait CertificateRequestStore: Send + Sync {
    async fn find_request_by_id(&self, id: Uuid) -> Result<Option<CertificateRequest>>;

    /// 在事务之外更新请求状态（失败标记使用此方法）
    async fn update_request_status(
        &self,
        id: Uuid,
        status: RequestStatus,
        error_message: Option<String>,
    ) -> Result<()>;
}

/// 证书存储
#[async_trait]
pub trait CertificateStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Certificate>>;

    /// 是否保存了私钥（CSR 签发的证书没有）
    async fn has_secret(&self, id: Uuid) -> Result<bool>;

    /// 按 id 升序返回 `after` 之后的续期候选：
    /// 属于配置文件、状态有效、未续期、未吊销、无续期错误
    async fn find_renewal_candidates(&self, after: Option<Uuid>, limit: usize) -> Result<Vec<Certificate>>;

    async fn set_renewal_error(&self, id: Uuid, error: Option<String>) -> Result<()>;

    async fn set_renew_before_days(&self, id: Uuid, days: Option<u32>) -> Result<()>;

    /// 全部应用或全部放弃
    async fn commit(&self, tx: TxContext) -> Result<()>;
}

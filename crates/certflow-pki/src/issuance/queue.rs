//! 外部CA异步签发队列

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::Result,
    ra::SubjectFields,
    types::{ExtendedKeyUsage, KeyAlgorithm, KeyUsage, SignatureAlgorithm, SubjectAltName, Ttl},
};

/// 排队的签发任务
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuanceJob {
    /// 直接续期时为空
    pub certificate_request_id: Option<Uuid>,
    pub profile_id: Uuid,
    pub ca_id: Uuid,
    pub ttl: Option<Ttl>,
    pub signature_algorithm: Option<SignatureAlgorithm>,
    pub key_algorithm: Option<KeyAlgorithm>,
    pub subject: SubjectFields,
    pub subject_alt_names: Vec<SubjectAltName>,
    pub key_usages: Vec<KeyUsage>,
    pub extended_key_usages: Vec<ExtendedKeyUsage>,
    pub csr: Option<String>,
    pub is_renewal: bool,
    pub original_certificate_id: Option<Uuid>,
}

/// 异步签发队列
#[async_trait]
pub trait AsyncIssuanceQueue: Send + Sync {
    async fn enqueue(&self, job: IssuanceJob) -> Result<()>;
}

/// 内存队列
#[derive(Default)]
pub struct MemoryIssuanceQueue {
    jobs: Mutex<Vec<IssuanceJob>>,
}

impl MemoryIssuanceQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }

    /// 取出全部任务
    pub fn drain(&self) -> Vec<IssuanceJob> {
        std::mem::take(&mut *self.jobs.lock())
    }
}

#[async_trait]
impl AsyncIssuanceQueue for MemoryIssuanceQueue {
    async fn enqueue(&self, job: IssuanceJob) -> Result<()> {
        tracing::debug!(
            profile_id = %job.profile_id,
            ca_id = %job.ca_id,
            is_renewal = job.is_renewal,
            "queued external CA issuance"
        );
        self.jobs.lock().push(job);
        Ok(())
    }
}

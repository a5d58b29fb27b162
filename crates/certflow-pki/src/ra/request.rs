//! 证书请求记录
//!
//! 一次签发尝试的瞬态记录。状态机：
//! `pending_approval → pending → {issued | failed | rejected}`，
//! `pending` 可重入，终态不可再迁移。

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::CertificateRequestInput;
use crate::error::{PkiError, Result};

/// 请求状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    PendingApproval,
    Pending,
    Issued,
    Failed,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::PendingApproval => "pending_approval",
            RequestStatus::Pending => "pending",
            RequestStatus::Issued => "issued",
            RequestStatus::Failed => "failed",
            RequestStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestStatus::Issued | RequestStatus::Failed | RequestStatus::Rejected
        )
    }

    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        match self {
            RequestStatus::PendingApproval => {
                matches!(next, RequestStatus::Pending | RequestStatus::Rejected)
            }
            RequestStatus::Pending => matches!(
                next,
                RequestStatus::Pending | RequestStatus::Issued | RequestStatus::Failed
            ),
            RequestStatus::Issued | RequestStatus::Failed | RequestStatus::Rejected => false,
        }
    }

    /// 校验状态迁移
    pub fn ensure_transition(&self, next: RequestStatus) -> Result<()> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(PkiError::BadRequest(format!(
                "Certificate request cannot move from {} to {}",
                self.as_str(),
                next.as_str()
            )))
        }
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 附加在请求上的资源元数据，签发成功后复制到证书
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMetadata {
    pub key: String,
    pub value: String,
}

/// 证书请求记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateRequest {
    pub id: Uuid,
    pub project_id: Uuid,
    pub profile_id: Option<Uuid>,
    pub status: RequestStatus,
    pub input: CertificateRequestInput,
    /// PEM 编码的 PKCS#10 请求
    pub csr: Option<String>,
    pub certificate_id: Option<Uuid>,
    pub error_message: Option<String>,
    pub metadata: Vec<ResourceMetadata>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl CertificateRequest {
    pub fn new(project_id: Uuid, profile_id: Uuid, input: CertificateRequestInput) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            project_id,
            profile_id: Some(profile_id),
            status: RequestStatus::Pending,
            input,
            csr: None,
            certificate_id: None,
            error_message: None,
            metadata: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_csr(mut self, csr_pem: impl Into<String>) -> Self {
        self.csr = Some(csr_pem.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.push(ResourceMetadata {
            key: key.into(),
            value: value.into(),
        });
        self
    }
}

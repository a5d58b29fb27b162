//! 显式工作单元
//!
//! 签发或续期过程中收集的修改，由 [`super::CertificateStore::commit`] 原子提交。
//! 未提交即丢弃的上下文等同于回滚。

use uuid::Uuid;

use crate::{cert::Certificate, ra::ResourceMetadata};

/// 加密后的证书正文
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedBody {
    pub encrypted_certificate: Vec<u8>,
    pub encrypted_certificate_chain: Vec<u8>,
}

/// 证书记录的部分更新；外层 `None` 表示不修改
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificatePatch {
    pub renew_before_days: Option<Option<u32>>,
    pub renewed_by_certificate_id: Option<Uuid>,
    pub renewed_from_certificate_id: Option<Uuid>,
    pub renewal_error: Option<Option<String>>,
}

impl CertificatePatch {
    pub fn apply(&self, cert: &mut Certificate) {
        if let Some(days) = self.renew_before_days {
            cert.renew_before_days = days;
        }
        if let Some(id) = self.renewed_by_certificate_id {
            cert.renewed_by_certificate_id = Some(id);
        }
        if let Some(id) = self.renewed_from_certificate_id {
            cert.renewed_from_certificate_id = Some(id);
        }
        if let Some(error) = &self.renewal_error {
            cert.renewal_error = error.clone();
        }
    }
}

/// 单项修改
#[derive(Debug, Clone)]
pub enum TxOp {
    CreateCertificate(Box<Certificate>),
    StoreBody {
        certificate_id: Uuid,
        body: EncryptedBody,
    },
    StoreSecret {
        certificate_id: Uuid,
        encrypted_private_key: Vec<u8>,
    },
    UpdateCertificate {
        certificate_id: Uuid,
        patch: CertificatePatch,
    },
    MarkRequestIssued {
        request_id: Uuid,
        certificate_id: Uuid,
    },
    CopyMetadata {
        certificate_id: Uuid,
        metadata: Vec<ResourceMetadata>,
    },
}

/// 工作单元
#[derive(Debug, Default)]
pub struct TxContext {
    ops: Vec<TxOp>,
}

impl TxContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: TxOp) -> &mut Self {
        self.ops.push(op);
        self
    }

    pub fn create_certificate(&mut self, cert: Certificate) -> &mut Self {
        self.push(TxOp::CreateCertificate(Box::new(cert)))
    }

    pub fn update_certificate(&mut self, certificate_id: Uuid, patch: CertificatePatch) -> &mut Self {
        self.push(TxOp::UpdateCertificate {
            certificate_id,
            patch,
        })
    }

    pub fn ops(&self) -> &[TxOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn into_ops(self) -> Vec<TxOp> {
        self.ops
    }
}

//! CA 签发接口

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    error::Result,
    ra::SubjectFields,
    types::{ExtendedKeyUsage, KeyAlgorithm, KeyUsage, SignatureAlgorithm, SubjectAltName},
};

/// 由 CA 生成密钥并签发证书的参数
#[derive(Debug, Clone)]
pub struct IssueFromCaParams {
    pub ca_id: Uuid,
    pub subject: SubjectFields,
    pub sans: Vec<SubjectAltName>,
    pub key_usages: Vec<KeyUsage>,
    pub extended_key_usages: Vec<ExtendedKeyUsage>,
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
    pub signature_algorithm: SignatureAlgorithm,
    pub key_algorithm: KeyAlgorithm,
    pub is_ca: bool,
    pub path_length: Option<i32>,
}

/// 由 CA 签署外部 CSR 的参数
#[derive(Debug, Clone)]
pub struct SignFromCaParams {
    pub ca_id: Uuid,
    pub csr_pem: String,
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
}

/// CA 签发结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaIssuedCertificate {
    pub certificate_pem: String,
    /// 从签发CA到根CA的证书链
    pub certificate_chain_pem: String,
    pub issuing_ca_certificate_pem: String,
    /// CSR 签署时为空
    pub private_key_pem: Option<String>,
    pub serial_number: String,
    pub common_name: Option<String>,
    /// 逗号分隔的 SAN 值
    pub alt_names: String,
    pub key_usages: Vec<KeyUsage>,
    pub extended_key_usages: Vec<ExtendedKeyUsage>,
    #[serde(with = "time::serde::rfc3339")]
    pub not_before: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub not_after: OffsetDateTime,
}

/// CA 签发器
#[async_trait]
pub trait CaSigner: Send + Sync {
    async fn issue_cert_from_ca(&self, params: IssueFromCaParams) -> Result<CaIssuedCertificate>;

    async fn sign_cert_from_ca(&self, params: SignFromCaParams) -> Result<CaIssuedCertificate>;
}

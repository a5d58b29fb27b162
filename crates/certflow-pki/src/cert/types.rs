use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{ra::SubjectFields, types::SubjectAltName};

/// 新生成的自签名证书
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelfSignedCertificate {
    /// 证书 PEM
    pub certificate_pem: String,
    /// PKCS#8 私钥 PEM
    pub private_key_pem: String,
    /// 十六进制序列号
    pub serial_number: String,
    /// 生效时间
    #[serde(with = "time::serde::rfc3339")]
    pub not_before: OffsetDateTime,
    /// 过期时间
    #[serde(with = "time::serde::rfc3339")]
    pub not_after: OffsetDateTime,
    /// 实际写入证书的主题
    pub subject: SubjectFields,
    /// 实际写入证书的 SAN
    pub sans: Vec<SubjectAltName>,
    /// 逗号分隔的 SAN 值，随证书记录保存
    pub alt_names: String,
}

/// 从已编码证书中读出的信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateInfo {
    /// 序列号
    pub serial_number: String,
    /// 证书主体
    pub subject: SubjectFields,
    /// 颁发者
    pub issuer: SubjectFields,
    /// 生效时间
    #[serde(with = "time::serde::rfc3339")]
    pub not_before: OffsetDateTime,
    /// 过期时间
    #[serde(with = "time::serde::rfc3339")]
    pub not_after: OffsetDateTime,
    /// 是否为CA证书
    pub is_ca: bool,
    /// 证书链深度限制
    pub path_len_constraint: Option<u8>,
}

impl CertificateInfo {
    /// 检查证书是否在有效期内
    pub fn is_valid_at(&self, time: OffsetDateTime) -> bool {
        time >= self.not_before && time <= self.not_after
    }
}

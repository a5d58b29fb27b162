//! 已签发证书记录

use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    ra::ResourceMetadata,
    types::{days_ceil, ExtendedKeyUsage, KeyAlgorithm, KeyUsage, SignatureAlgorithm},
};

/// 证书状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateStatus {
    Active,
    Revoked,
    Expired,
}

impl CertificateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateStatus::Active => "active",
            CertificateStatus::Revoked => "revoked",
            CertificateStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for CertificateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 证书记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub id: Uuid,
    pub project_id: Uuid,
    pub profile_id: Option<Uuid>,
    pub ca_id: Option<Uuid>,
    /// 导入证书关联的订阅者
    pub pki_subscriber_id: Option<Uuid>,
    pub serial_number: String,
    pub common_name: Option<String>,
    /// 逗号分隔的 SAN 值
    pub alt_names: String,
    pub key_usages: Vec<KeyUsage>,
    pub extended_key_usages: Vec<ExtendedKeyUsage>,
    pub signature_algorithm: Option<SignatureAlgorithm>,
    pub key_algorithm: Option<KeyAlgorithm>,
    #[serde(with = "time::serde::rfc3339")]
    pub not_before: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub not_after: OffsetDateTime,
    pub status: CertificateStatus,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub revoked_at: Option<OffsetDateTime>,
    pub renew_before_days: Option<u32>,
    pub renewed_by_certificate_id: Option<Uuid>,
    pub renewed_from_certificate_id: Option<Uuid>,
    pub renewal_error: Option<String>,
    #[serde(default)]
    pub metadata: Vec<ResourceMetadata>,
}

impl Certificate {
    /// 由吊销时间与过期时间推导的状态
    pub fn effective_status(&self, now: OffsetDateTime) -> CertificateStatus {
        if self.revoked_at.is_some() {
            CertificateStatus::Revoked
        } else if self.not_after <= now {
            CertificateStatus::Expired
        } else {
            self.status
        }
    }

    /// 有效期天数（向上取整）
    pub fn ttl_days(&self) -> i64 {
        days_ceil(self.not_after - self.not_before)
    }

    /// 由订阅者导入、不属于任何配置文件
    pub fn is_imported(&self) -> bool {
        self.pki_subscriber_id.is_some() && self.profile_id.is_none()
    }

    pub fn is_renewed(&self) -> bool {
        self.renewed_by_certificate_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use time::{macros::datetime, Duration};

    use super::*;

    fn sample() -> Certificate {
        Certificate {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            profile_id: Some(Uuid::new_v4()),
            ca_id: None,
            pki_subscriber_id: None,
            serial_number: "01".into(),
            common_name: Some("a.example.com".into()),
            alt_names: String::new(),
            key_usages: vec![],
            extended_key_usages: vec![],
            signature_algorithm: None,
            key_algorithm: None,
            not_before: datetime!(2024-01-01 0:00 UTC),
            not_after: datetime!(2024-02-01 0:00 UTC),
            status: CertificateStatus::Active,
            revoked_at: None,
            renew_before_days: None,
            renewed_by_certificate_id: None,
            renewed_from_certificate_id: None,
            renewal_error: None,
            metadata: vec![],
        }
    }

    #[test]
    fn test_effective_status() {
        let mut cert = sample();
        assert_eq!(cert.effective_status(datetime!(2024-01-15 0:00 UTC)), CertificateStatus::Active);
        assert_eq!(cert.effective_status(cert.not_after), CertificateStatus::Expired);
        cert.revoked_at = Some(datetime!(2024-01-10 0:00 UTC));
        assert_eq!(cert.effective_status(datetime!(2024-01-15 0:00 UTC)), CertificateStatus::Revoked);
    }

    #[test]
    fn test_ttl_days_rounds_up() {
        let mut cert = sample();
        assert_eq!(cert.ttl_days(), 31);
        cert.not_after += Duration::hours(1);
        assert_eq!(cert.ttl_days(), 32);
    }
}

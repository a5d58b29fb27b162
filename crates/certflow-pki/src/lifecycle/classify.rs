//! 续期错误分类
//!
//! 把续期失败的原始消息映射为面向用户的固定类别，仅影响展示。

use serde::{Deserialize, Serialize};

/// 续期错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenewalErrorCategory {
    PolicyDrift,
    CaMissing,
    CaInactive,
    OutlivesCa,
    TtlTooShort,
    NotEligible,
    ValidityExceedsMaximum,
    PolicyDisallowed,
    Unknown,
}

/// 按顺序匹配，越具体的类别越靠前；同一行内任一关键词命中即可
const CLASSIFIERS: &[(RenewalErrorCategory, &[&str])] = &[
    (
        RenewalErrorCategory::CaMissing,
        &["certificate authority not found", "certificate authority id not found"],
    ),
    (RenewalErrorCategory::CaInactive, &["certificate authority is "]),
    (
        RenewalErrorCategory::OutlivesCa,
        &["after its issuing ca", "exceeds issuing ca expiry"],
    ),
    (
        RenewalErrorCategory::TtlTooShort,
        &["ttl is too short", "invalid ttl"],
    ),
    (
        RenewalErrorCategory::ValidityExceedsMaximum,
        &["exceeds maximum allowed duration"],
    ),
    (
        RenewalErrorCategory::PolicyDisallowed,
        &[
            "not allowed by policy",
            "denied by policy",
            "not compatible with ca key algorithm",
        ],
    ),
    (
        RenewalErrorCategory::PolicyDrift,
        &[
            "certificate renewal failed",
            "policy validation failed",
            "policy not found",
        ],
    ),
    (
        RenewalErrorCategory::NotEligible,
        &["not eligible for renewal", "cannot be renewed"],
    ),
];

impl RenewalErrorCategory {
    /// 记录在证书上的消息
    pub fn user_message(&self, raw: &str) -> String {
        match self {
            RenewalErrorCategory::PolicyDrift => {
                "Certificate no longer satisfies its policy. Update the policy or profile, then renew manually".to_string()
            }
            RenewalErrorCategory::CaMissing => "Issuing Certificate Authority no longer exists".to_string(),
            RenewalErrorCategory::CaInactive => "Issuing Certificate Authority is not active".to_string(),
            RenewalErrorCategory::OutlivesCa => {
                "Renewed certificate would expire after its issuing Certificate Authority. Renew the CA first".to_string()
            }
            RenewalErrorCategory::TtlTooShort => {
                "Certificate validity period is too short for automatic renewal".to_string()
            }
            RenewalErrorCategory::NotEligible => format!("Certificate is not eligible for automatic renewal: {raw}"),
            RenewalErrorCategory::ValidityExceedsMaximum => {
                "Certificate validity period exceeds the maximum allowed by its policy".to_string()
            }
            RenewalErrorCategory::PolicyDisallowed => {
                "Certificate settings are no longer allowed by its policy".to_string()
            }
            RenewalErrorCategory::Unknown => format!("Automatic renewal failed: {raw}"),
        }
    }
}

/// 对续期错误消息分类
pub fn classify_renewal_error(message: &str) -> RenewalErrorCategory {
    let lower = message.to_lowercase();
    CLASSIFIERS
        .iter()
        .find(|(_, needles)| needles.iter().any(|needle| lower.contains(needle)))
        .map(|(category, _)| *category)
        .unwrap_or(RenewalErrorCategory::Unknown)
}

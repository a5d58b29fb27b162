//! 续期阈值计算
//!
//! 阈值 `renew_before_days` 表示到期前多少天触发自动续期。

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::profile::ApiEnrollmentConfig;

/// 按证书有效期收紧阈值
///
/// 阈值不小于有效期时改为到期前一天（至少 1 天）；未配置或为 0 时返回 `None`。
pub fn calculate_renewal_threshold(renew_before_days: Option<u32>, ttl_days: i64) -> Option<u32> {
    let threshold = renew_before_days.filter(|days| *days > 0)?;
    if ttl_days > i64::from(threshold) {
        return Some(threshold);
    }
    let clamped = (ttl_days - 1).max(1);
    Some(u32::try_from(clamped).unwrap_or(1))
}

/// 续期日期（到期时间减阈值）必须不早于 `now` 所在时区的明天零点
pub fn is_valid_renewal_timing(renew_before_days: u32, expiry: OffsetDateTime, now: OffsetDateTime) -> bool {
    let renewal_date = expiry - Duration::days(i64::from(renew_before_days));
    let Some(tomorrow) = now.date().next_day() else {
        return false;
    };
    renewal_date >= tomorrow.midnight().assume_offset(now.offset())
}

/// 配置文件的自动续期设置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RenewalConfig {
    Disabled,
    Enabled { renew_before_days: u32 },
}

impl RenewalConfig {
    /// 只有开启自动续期且配置了正数阈值时才启用
    pub fn from_api_config(config: Option<&ApiEnrollmentConfig>) -> Self {
        match config {
            Some(ApiEnrollmentConfig {
                auto_renew: true,
                renew_before_days: Some(days),
            }) if *days > 0 => RenewalConfig::Enabled {
                renew_before_days: *days,
            },
            _ => RenewalConfig::Disabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, RenewalConfig::Enabled { .. })
    }

    pub fn renew_before_days(&self) -> Option<u32> {
        match self {
            RenewalConfig::Enabled { renew_before_days } => Some(*renew_before_days),
            RenewalConfig::Disabled => None,
        }
    }

    /// 新证书上记录的最终阈值；会立即触发的阈值被丢弃
    pub fn final_renew_before_days(
        &self,
        ttl_days: i64,
        expiry: OffsetDateTime,
        now: OffsetDateTime,
    ) -> Option<u32> {
        let threshold = calculate_renewal_threshold(self.renew_before_days(), ttl_days)?;
        if is_valid_renewal_timing(threshold, expiry, now) {
            Some(threshold)
        } else {
            tracing::debug!(
                threshold,
                ttl_days,
                %expiry,
                "renewal threshold would fire immediately, not scheduling renewal"
            );
            None
        }
    }
}

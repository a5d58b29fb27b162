use std::{path::Path, time::Duration};

use certflow_pki::{CaConfig, DailySchedule, RenewalJobConfig};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::Result;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub service: ServiceCfg,
    pub log: LogCfg,
    pub vault: VaultCfg,
    pub ca: CaConfig,
    pub renewal: RenewalCfg,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ServiceCfg {
    /// 根CA所属项目，缺省时每次启动随机生成
    pub project_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogCfg {
    /// `RUST_LOG` 未设置时使用的过滤级别
    pub level: String,
    pub with_target: bool,
}

impl Default for LogCfg {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            with_target: false,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct VaultCfg {
    /// 64 位十六进制主密钥，缺省时随机生成（重启后旧密文不可读）
    pub master_key_hex: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RenewalCfg {
    pub enabled: bool,
    /// 每日运行时刻（UTC）
    pub run_at: DailySchedule,
    pub start_delay_secs: u64,
    pub batch_size: usize,
    pub min_renew_before_days: u32,
    pub max_renew_before_days: u32,
}

impl Default for RenewalCfg {
    fn default() -> Self {
        let job = RenewalJobConfig::default();
        Self {
            enabled: true,
            run_at: DailySchedule::midnight(),
            start_delay_secs: 10,
            batch_size: job.batch_size,
            min_renew_before_days: job.min_renew_before_days,
            max_renew_before_days: job.max_renew_before_days,
        }
    }
}

impl RenewalCfg {
    pub fn job_config(&self) -> RenewalJobConfig {
        RenewalJobConfig {
            batch_size: self.batch_size,
            min_renew_before_days: self.min_renew_before_days,
            max_renew_before_days: self.max_renew_before_days,
        }
    }

    pub fn start_delay(&self) -> Duration {
        Duration::from_secs(self.start_delay_secs)
    }
}

impl Settings {
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(config_path)?;
        let r = toml::from_str(&raw)?;
        Ok(r)
    }

    /// 配置文件不存在时使用默认配置
    pub fn load_or_default(config_path: impl AsRef<Path>) -> Result<Self> {
        let config_path = config_path.as_ref();
        if config_path.exists() {
            Self::load(config_path)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use certflow_pki::types::KeyAlgorithm;

    use super::*;

    #[test]
    fn test_load_settings() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[log]
level = "debug"

[ca]
name = "Ops Root CA"
key_algorithm = "RSA_2048"
signature_algorithm = "RSA-SHA256"
validity_days = 1825

[renewal]
run_at = "02:30"
batch_size = 50
"#
        )
        .unwrap();

        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings.log.level, "debug");
        assert_eq!(settings.ca.name, "Ops Root CA");
        assert_eq!(settings.ca.key_algorithm, KeyAlgorithm::Rsa2048);
        assert_eq!(settings.ca.validity_days, 1825);
        assert_eq!(settings.renewal.run_at.to_string(), "02:30");
        assert_eq!(settings.renewal.job_config().batch_size, 50);
        assert_eq!(settings.renewal.job_config().max_renew_before_days, 30);
        assert!(settings.renewal.enabled);
        assert!(settings.vault.master_key_hex.is_none());
    }

    #[test]
    fn test_invalid_schedule_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[renewal]\nrun_at = \"25:00\"\n").unwrap();
        assert!(Settings::load(file.path()).is_err());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_or_default(dir.path().join("services.toml")).unwrap();
        assert_eq!(settings.renewal.run_at, DailySchedule::midnight());
        assert_eq!(settings.renewal.start_delay(), Duration::from_secs(10));
        assert_eq!(settings.ca.name, "Certflow Root CA");
        assert!(Settings::load(dir.path().join("services.toml")).is_err());
    }
}

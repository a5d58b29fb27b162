//! 每日自动续期任务

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use super::ScheduledJob;
use crate::{
    cert::Certificate,
    error::Result,
    issuance::{IssuanceOrchestrator, RenewOptions},
    lifecycle::{classify_renewal_error, RenewalConfig},
    store::{CertificateStore, ProfileStore},
};

/// 续期任务配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenewalJobConfig {
    pub batch_size: usize,
    pub min_renew_before_days: u32,
    pub max_renew_before_days: u32,
}

impl Default for RenewalJobConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            min_renew_before_days: 1,
            max_renew_before_days: 30,
        }
    }
}

/// 一次运行的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenewalRunSummary {
    pub scanned: usize,
    pub eligible: usize,
    pub renewed: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    Skipped,
    Renewed,
    Failed,
}

pub struct RenewalJob {
    certificates: Arc<dyn CertificateStore>,
    profiles: Arc<dyn ProfileStore>,
    orchestrator: Arc<IssuanceOrchestrator>,
    config: RenewalJobConfig,
}

impl RenewalJob {
    pub fn new(orchestrator: Arc<IssuanceOrchestrator>, config: RenewalJobConfig) -> Self {
        Self {
            certificates: orchestrator.deps().certificates.clone(),
            profiles: orchestrator.deps().profiles.clone(),
            orchestrator,
            config,
        }
    }

    pub fn config(&self) -> &RenewalJobConfig {
        &self.config
    }

    /// 扫描全部候选证书并续期到期的证书
    ///
    /// 批次之间顺序执行，批内并发；单个证书失败只记录在该证书上。
    /// 分页以证书 id 为游标，续期后离开过滤条件的证书不会使后续批次错位。
    pub async fn run_once(&self, now: OffsetDateTime) -> Result<RenewalRunSummary> {
        let batch_size = self.config.batch_size.max(1);
        let mut summary = RenewalRunSummary::default();
        let mut cursor = None;

        loop {
            let batch = self
                .certificates
                .find_renewal_candidates(cursor, batch_size)
                .await?;
            let Some(last) = batch.last() else { break };
            cursor = Some(last.id);
            summary.scanned += batch.len();

            let outcomes = join_all(batch.iter().map(|cert| self.process(cert, now))).await;
            for outcome in outcomes {
                match outcome {
                    ItemOutcome::Skipped => summary.skipped += 1,
                    ItemOutcome::Renewed => {
                        summary.eligible += 1;
                        summary.renewed += 1;
                    }
                    ItemOutcome::Failed => {
                        summary.eligible += 1;
                        summary.failed += 1;
                    }
                }
            }

            if batch.len() < batch_size {
                break;
            }
        }

        tracing::info!(
            scanned = summary.scanned,
            eligible = summary.eligible,
            renewed = summary.renewed,
            failed = summary.failed,
            skipped = summary.skipped,
            "renewal run finished"
        );
        Ok(summary)
    }

    /// 证书或配置文件上的阈值，证书优先
    async fn renewal_threshold(&self, cert: &Certificate) -> Result<Option<u32>> {
        let Some(profile_id) = cert.profile_id else {
            return Ok(None);
        };
        let profile = self.profiles.find_by_id_with_configs(profile_id).await?;
        let config = RenewalConfig::from_api_config(profile.as_ref().and_then(|p| p.api_config.as_ref()));

        if !config.is_enabled() && cert.renew_before_days.is_none() {
            return Ok(None);
        }
        Ok(cert.renew_before_days.or(config.renew_before_days()))
    }

    fn is_due(&self, cert: &Certificate, threshold: u32, now: OffsetDateTime) -> bool {
        let bounds = self.config.min_renew_before_days..=self.config.max_renew_before_days;
        bounds.contains(&threshold) && cert.not_after - Duration::days(i64::from(threshold)) <= now
    }

    async fn process(&self, cert: &Certificate, now: OffsetDateTime) -> ItemOutcome {
        let threshold = match self.renewal_threshold(cert).await {
            Ok(Some(threshold)) => threshold,
            Ok(None) => return ItemOutcome::Skipped,
            Err(err) => {
                tracing::warn!(certificate_id = %cert.id, error = %err, "failed to load renewal threshold");
                return ItemOutcome::Skipped;
            }
        };
        if !self.is_due(cert, threshold, now) {
            return ItemOutcome::Skipped;
        }

        match self
            .orchestrator
            .renew_certificate_at(cert.id, RenewOptions::internal(), now)
            .await
        {
            Ok(_) => {
                if let Err(err) = self.certificates.set_renewal_error(cert.id, None).await {
                    tracing::warn!(certificate_id = %cert.id, error = %err, "failed to clear renewal error");
                }
                ItemOutcome::Renewed
            }
            Err(err) => {
                let raw = err.to_string();
                let category = classify_renewal_error(&raw);
                tracing::warn!(
                    certificate_id = %cert.id,
                    ?category,
                    error = %raw,
                    "automatic renewal failed"
                );
                if let Err(store_err) = self
                    .certificates
                    .set_renewal_error(cert.id, Some(category.user_message(&raw)))
                    .await
                {
                    tracing::error!(certificate_id = %cert.id, error = %store_err, "failed to record renewal error");
                }
                ItemOutcome::Failed
            }
        }
    }
}

#[async_trait]
impl ScheduledJob for RenewalJob {
    async fn run(&self, now: OffsetDateTime) {
        if let Err(err) = self.run_once(now).await {
            tracing::error!(error = %err, "renewal run aborted");
        }
    }
}

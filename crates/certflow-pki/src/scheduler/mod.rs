//! 后台任务调度
//!
//! 每个任务按固定的 UTC 时刻每日运行一次，启动时先等待固定延迟。
//! [`Scheduler::ensure`] 是幂等的：规格不变时不做任何事，规格变化时替换正在运行的任务。

pub mod job;

use std::{collections::HashMap, fmt, str::FromStr, sync::Arc, time::Duration as StdDuration};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime, Time};
use tokio::{sync::broadcast, task::JoinHandle};

pub use job::{RenewalJob, RenewalJobConfig, RenewalRunSummary};

use crate::error::{PkiError, Result};

/// 每日固定 UTC 时刻，格式 `HH:MM`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DailySchedule {
    hour: u8,
    minute: u8,
}

impl DailySchedule {
    pub fn new(hour: u8, minute: u8) -> Result<Self> {
        if hour > 23 || minute > 59 {
            return Err(PkiError::BadRequest(format!(
                "Invalid schedule time {hour:02}:{minute:02}"
            )));
        }
        Ok(Self { hour, minute })
    }

    /// UTC 零点
    pub fn midnight() -> Self {
        Self { hour: 0, minute: 0 }
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    /// 严格晚于 `now` 的下一次触发时间
    pub fn next_after(&self, now: OffsetDateTime) -> OffsetDateTime {
        let now = now.to_offset(time::UtcOffset::UTC);
        let at = Time::from_hms(self.hour, self.minute, 0).unwrap_or(Time::MIDNIGHT);
        let today = now.replace_time(at);
        if today > now {
            today
        } else {
            today + Duration::days(1)
        }
    }
}

impl Default for DailySchedule {
    fn default() -> Self {
        Self::midnight()
    }
}

impl FromStr for DailySchedule {
    type Err = PkiError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || PkiError::BadRequest(format!("Invalid schedule time: {s}, expected HH:MM"));
        let (hour, minute) = s.trim().split_once(':').ok_or_else(invalid)?;
        if hour.len() != 2 || minute.len() != 2 {
            return Err(invalid());
        }
        let hour = hour.parse().map_err(|_| invalid())?;
        let minute = minute.parse().map_err(|_| invalid())?;
        Self::new(hour, minute).map_err(|_| invalid())
    }
}

impl fmt::Display for DailySchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl Serialize for DailySchedule {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DailySchedule {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// 任务规格
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub name: String,
    pub schedule: DailySchedule,
    pub start_delay: StdDuration,
}

/// 可被调度的任务
#[async_trait]
pub trait ScheduledJob: Send + Sync {
    async fn run(&self, now: OffsetDateTime);
}

struct RunningJob {
    spec: JobSpec,
    shutdown_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

impl RunningJob {
    fn stop(self) -> JoinHandle<()> {
        let _ = self.shutdown_tx.send(());
        self.handle
    }
}

/// 调度器句柄，由进程生命周期持有
#[derive(Default)]
pub struct Scheduler {
    jobs: Mutex<HashMap<String, RunningJob>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// 确保任务按给定规格运行，返回是否（重新）启动了任务
    pub fn ensure(&self, spec: JobSpec, job: Arc<dyn ScheduledJob>) -> bool {
        let mut jobs = self.jobs.lock();
        if let Some(running) = jobs.get(&spec.name) {
            if running.spec == spec && !running.handle.is_finished() {
                tracing::debug!(job = %spec.name, "scheduled job already running");
                return false;
            }
        }

        if let Some(previous) = jobs.remove(&spec.name) {
            tracing::info!(job = %spec.name, "replacing scheduled job");
            previous.stop().abort();
        }

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(run_job(spec.clone(), job, shutdown_rx));
        tracing::info!(
            job = %spec.name,
            schedule = %spec.schedule,
            start_delay_secs = spec.start_delay.as_secs(),
            "scheduled job started"
        );
        jobs.insert(
            spec.name.clone(),
            RunningJob {
                spec,
                shutdown_tx,
                handle,
            },
        );
        true
    }

    /// 停止单个任务
    pub fn stop(&self, name: &str) -> bool {
        match self.jobs.lock().remove(name) {
            Some(running) => {
                running.stop().abort();
                true
            }
            None => false,
        }
    }

    pub fn running_jobs(&self) -> Vec<String> {
        let mut names: Vec<String> = self.jobs.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// 通知全部任务退出并等待结束；正在执行的运行会完成当前批次
    pub async fn shutdown(&self) {
        let handles: Vec<(String, JoinHandle<()>)> = self
            .jobs
            .lock()
            .drain()
            .map(|(name, running)| (name, running.stop()))
            .collect();

        for (name, handle) in handles {
            if let Err(err) = handle.await {
                if !err.is_cancelled() {
                    tracing::warn!(job = %name, error = %err, "scheduled job ended abnormally");
                }
            }
            tracing::info!(job = %name, "scheduled job stopped");
        }
    }
}

async fn run_job(spec: JobSpec, job: Arc<dyn ScheduledJob>, mut shutdown_rx: broadcast::Receiver<()>) {
    tokio::select! {
        _ = tokio::time::sleep(spec.start_delay) => {}
        _ = shutdown_rx.recv() => return,
    }

    loop {
        let now = OffsetDateTime::now_utc();
        let next = spec.schedule.next_after(now);
        let wait = StdDuration::try_from(next - now).unwrap_or_default();
        tracing::debug!(job = %spec.name, next_run = %next, "waiting for next run");

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = shutdown_rx.recv() => break,
        }

        tracing::info!(job = %spec.name, "scheduled job running");
        job.run(OffsetDateTime::now_utc()).await;
    }
}

//! Periodic pruning of aged records and run logs.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::schedule::CronSchedule;
use crate::traits::{RecordStore, RunStore};

/// Daily at midnight UTC.
pub const DEFAULT_SWEEP_SCHEDULE: &str = "0 0 * * *";

/// How long rows are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub record_retention: TimeDelta,
    pub run_retention: TimeDelta,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            record_retention: TimeDelta::days(90),
            run_retention: TimeDelta::days(30),
        }
    }
}

impl RetentionPolicy {
    pub fn from_days(record_days: u32, run_days: u32) -> Self {
        Self {
            record_retention: TimeDelta::days(i64::from(record_days)),
            run_retention: TimeDelta::days(i64::from(run_days)),
        }
    }
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub records_deleted: u64,
    pub runs_deleted: u64,
    /// Messages of any deletes that failed; the other delete still ran.
    pub failures: Vec<String>,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct RetentionSweeper<R: RunStore, S: RecordStore> {
    runs: R,
    records: S,
    policy: RetentionPolicy,
    schedule: CronSchedule,
}

impl<R: RunStore, S: RecordStore> RetentionSweeper<R, S> {
    pub fn new(runs: R, records: S, policy: RetentionPolicy) -> Result<Self, AppError> {
        Self::with_schedule(runs, records, policy, DEFAULT_SWEEP_SCHEDULE)
    }

    pub fn with_schedule(
        runs: R,
        records: S,
        policy: RetentionPolicy,
        schedule: &str,
    ) -> Result<Self, AppError> {
        Ok(Self {
            runs,
            records,
            policy,
            schedule: CronSchedule::parse(schedule)?,
        })
    }

    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    /// Delete everything strictly older than the retention windows ending at
    /// `now`. Rows exactly at a cutoff are kept.
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> SweepReport {
        let record_cutoff = now - self.policy.record_retention;
        let run_cutoff = now - self.policy.run_retention;
        let mut report = SweepReport::default();

        match self.records.delete_records_before(record_cutoff).await {
            Ok(n) => report.records_deleted = n,
            Err(e) => {
                tracing::error!(cutoff = %record_cutoff, error = %e, "Failed to delete old records");
                report.failures.push(format!("records: {e}"));
            }
        }

        match self.runs.delete_runs_before(run_cutoff).await {
            Ok(n) => report.runs_deleted = n,
            Err(e) => {
                tracing::error!(cutoff = %run_cutoff, error = %e, "Failed to delete old runs");
                report.failures.push(format!("runs: {e}"));
            }
        }

        tracing::info!(
            records_deleted = report.records_deleted,
            runs_deleted = report.runs_deleted,
            failures = report.failures.len(),
            "Retention sweep finished"
        );
        report
    }

    /// Sweep on schedule until cancelled.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(schedule = %self.schedule.as_str(), "Retention sweeper started");
        let mut cursor = Utc::now();

        while let Some(next) = self.schedule.next_after(&cursor) {
            let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(wait) => {}
            }
            cursor = next.max(Utc::now());
            self.sweep_once(Utc::now()).await;
        }

        tracing::info!("Retention sweeper stopped");
    }
}

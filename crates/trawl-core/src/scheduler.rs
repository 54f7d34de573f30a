//! Timer-driven job scheduling.
//!
//! The [`Scheduler`] owns one timer task per active, schedule-bearing job,
//! keyed by job id. A timer sleeps until the next cron fire time and then
//! hands the job to the [`JobRunner`] on a background task. Cancelling a
//! timer only prevents future fires; runs already in flight finish normally.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use crate::error::AppError;
use crate::executor::JobRunner;
use crate::models::ScrapeJobConfig;
use crate::schedule::{CronEstimator, CronSchedule, NextRunEstimator};
use crate::traits::JobStore;

/// What to do when a job fires while a previous run is still going.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverlapPolicy {
    /// Drop the new fire and log it.
    #[default]
    SkipIfRunning,
    /// Start another run alongside the existing one.
    AllowConcurrent,
}

impl FromStr for OverlapPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "skip" | "skip_if_running" => Ok(OverlapPolicy::SkipIfRunning),
            "allow" | "allow_concurrent" => Ok(OverlapPolicy::AllowConcurrent),
            _ => Err(format!("Unknown overlap policy: {}", s)),
        }
    }
}

impl fmt::Display for OverlapPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverlapPolicy::SkipIfRunning => f.write_str("skip"),
            OverlapPolicy::AllowConcurrent => f.write_str("allow"),
        }
    }
}

/// Acknowledgement returned by [`Scheduler::trigger_now`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerAck {
    Started,
    AlreadyRunning,
}

/// Snapshot of one registered timer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimerStatus {
    pub job_id: Uuid,
    pub job_name: String,
    pub schedule: String,
    pub next_fire_at: Option<DateTime<Utc>>,
    pub running: bool,
}

/// What [`Scheduler::reschedule_job`] ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RescheduleOutcome {
    /// A fresh timer now exists for the job.
    Scheduled,
    /// The job is inactive, has no schedule, or its schedule is invalid.
    Unscheduled,
    /// The job no longer exists.
    Missing,
    /// The job store could not be read; timers were left untouched.
    StoreUnavailable,
}

#[derive(Clone)]
pub struct SchedulerConfig {
    pub overlap: OverlapPolicy,
    pub estimator: Arc<dyn NextRunEstimator>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            overlap: OverlapPolicy::default(),
            estimator: Arc::new(CronEstimator),
        }
    }
}

impl fmt::Debug for SchedulerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerConfig")
            .field("overlap", &self.overlap)
            .finish_non_exhaustive()
    }
}

struct TimerEntry {
    job_name: String,
    schedule: CronSchedule,
    cancel: CancellationToken,
    /// Distinguishes this timer from any later replacement for the same job.
    generation: u64,
}

#[derive(Default)]
struct SchedulerState {
    timers: HashMap<Uuid, TimerEntry>,
    /// In-flight run count per job.
    running: HashMap<Uuid, usize>,
    next_generation: u64,
}

struct Inner<R, J> {
    runner: Arc<R>,
    jobs: J,
    config: SchedulerConfig,
    state: Mutex<SchedulerState>,
    tracker: TaskTracker,
    /// Parent of every timer token.
    timers_token: CancellationToken,
    /// Parent of every run token; only cancelled when shutdown gives up waiting.
    runs_token: CancellationToken,
}

impl<R, J> Inner<R, J> {
    fn lock_state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Recovered from poisoned scheduler mutex");
            poisoned.into_inner()
        })
    }
}

/// Releases a job's in-flight slot when the run task ends.
struct RunGuard<R, J> {
    inner: Arc<Inner<R, J>>,
    job_id: Uuid,
}

impl<R, J> Drop for RunGuard<R, J> {
    fn drop(&mut self) {
        let mut state = self.inner.lock_state();
        if let Some(count) = state.running.get_mut(&self.job_id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                state.running.remove(&self.job_id);
            }
        }
    }
}

/// Owns the job-id → timer registry and the background run tasks.
pub struct Scheduler<R, J> {
    inner: Arc<Inner<R, J>>,
}

impl<R, J> Clone for Scheduler<R, J> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<R, J> Scheduler<R, J>
where
    R: JobRunner + 'static,
    J: JobStore + 'static,
{
    pub fn new(runner: R, jobs: J, config: SchedulerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                runner: Arc::new(runner),
                jobs,
                config,
                state: Mutex::new(SchedulerState::default()),
                tracker: TaskTracker::new(),
                timers_token: CancellationToken::new(),
                runs_token: CancellationToken::new(),
            }),
        }
    }

    pub fn overlap_policy(&self) -> OverlapPolicy {
        self.inner.config.overlap
    }

    /// Load every active job from the store and register its timer.
    pub async fn start(&self) -> Result<usize, AppError> {
        let configs = self.inner.jobs.list_active_jobs().await?;
        let registered = self.register_all(&configs);
        tracing::info!(registered, total = configs.len(), "Scheduler started");
        Ok(registered)
    }

    /// Register timers for every active config with a schedule. Invalid
    /// schedules are logged and skipped. Returns the number registered.
    pub fn register_all(&self, configs: &[ScrapeJobConfig]) -> usize {
        configs
            .iter()
            .filter(|c| c.is_schedulable())
            .filter(|c| self.schedule_job(c).is_ok())
            .count()
    }

    /// Create (or replace) the timer for a job.
    pub fn schedule_job(&self, config: &ScrapeJobConfig) -> Result<(), AppError> {
        if !config.is_active {
            return Err(AppError::Validation(format!(
                "Job '{}' is inactive",
                config.name
            )));
        }
        let Some(expression) = config.schedule() else {
            return Err(AppError::Validation(format!(
                "Job '{}' has no schedule",
                config.name
            )));
        };
        if self.inner.timers_token.is_cancelled() {
            return Err(AppError::Generic("Scheduler is shut down".into()));
        }

        let schedule = CronSchedule::parse(expression).inspect_err(|e| {
            tracing::warn!(job_id = %config.id, job_name = %config.name, error = %e, "Invalid schedule, job not scheduled");
        })?;

        let cancel = self.inner.timers_token.child_token();
        let (generation, previous) = {
            let mut state = self.inner.lock_state();
            state.next_generation += 1;
            let generation = state.next_generation;
            let previous = state.timers.insert(
                config.id,
                TimerEntry {
                    job_name: config.name.clone(),
                    schedule: schedule.clone(),
                    cancel: cancel.clone(),
                    generation,
                },
            );
            (generation, previous)
        };
        if let Some(previous) = previous {
            previous.cancel.cancel();
            tracing::debug!(job_id = %config.id, "Replaced existing timer");
        }

        self.spawn_timer(config.clone(), schedule, cancel, generation);
        tracing::info!(job_id = %config.id, job_name = %config.name, schedule = %expression, "Job scheduled");
        Ok(())
    }

    /// Stop and remove a job's timer. Returns whether one existed.
    pub fn cancel_job(&self, job_id: Uuid) -> bool {
        let removed = self.inner.lock_state().timers.remove(&job_id);
        match removed {
            Some(entry) => {
                entry.cancel.cancel();
                tracing::info!(%job_id, "Job unscheduled");
                true
            }
            None => false,
        }
    }

    /// Re-read a job from the store and bring its timer in line with it.
    ///
    /// Never fails: store errors and bad schedules are logged.
    pub async fn reschedule_job(&self, job_id: Uuid) -> RescheduleOutcome {
        let config = match self.inner.jobs.get_job(job_id).await {
            Ok(Some(config)) => config,
            Ok(None) => {
                tracing::warn!(%job_id, "Cannot reschedule missing job");
                self.cancel_job(job_id);
                return RescheduleOutcome::Missing;
            }
            Err(e) => {
                tracing::error!(%job_id, error = %e, "Failed to load job for rescheduling");
                return RescheduleOutcome::StoreUnavailable;
            }
        };

        self.cancel_job(job_id);
        if config.is_schedulable() && self.schedule_job(&config).is_ok() {
            RescheduleOutcome::Scheduled
        } else {
            RescheduleOutcome::Unscheduled
        }
    }

    /// Next fire time for a schedule string, per the configured estimator.
    pub fn next_run_estimate(&self, schedule: &str) -> Option<DateTime<Utc>> {
        self.inner.config.estimator.next_run(schedule, Utc::now())
    }

    /// Cancel every timer. Returns how many were stopped.
    pub fn stop_all(&self) -> usize {
        let drained: Vec<TimerEntry> = self
            .inner
            .lock_state()
            .timers
            .drain()
            .map(|(_, entry)| entry)
            .collect();
        for entry in &drained {
            entry.cancel.cancel();
        }
        tracing::info!(stopped = drained.len(), "All timers stopped");
        drained.len()
    }

    /// Registered timers, ordered by job name.
    pub fn status(&self) -> Vec<TimerStatus> {
        let now = Utc::now();
        let state = self.inner.lock_state();
        let mut timers: Vec<TimerStatus> = state
            .timers
            .iter()
            .map(|(job_id, entry)| TimerStatus {
                job_id: *job_id,
                job_name: entry.job_name.clone(),
                schedule: entry.schedule.as_str().to_string(),
                next_fire_at: entry.schedule.next_after(&now),
                running: state.running.contains_key(job_id),
            })
            .collect();
        timers.sort_by(|a, b| a.job_name.cmp(&b.job_name).then(a.job_id.cmp(&b.job_id)));
        timers
    }

    pub fn is_scheduled(&self, job_id: Uuid) -> bool {
        self.inner.lock_state().timers.contains_key(&job_id)
    }

    pub fn is_running(&self, job_id: Uuid) -> bool {
        self.inner.lock_state().running.contains_key(&job_id)
    }

    pub fn timer_count(&self) -> usize {
        self.inner.lock_state().timers.len()
    }

    /// Start a run right away without waiting for it.
    pub fn trigger_now(&self, config: &ScrapeJobConfig) -> Result<TriggerAck, AppError> {
        if !config.is_active {
            return Err(AppError::Validation(format!(
                "Job '{}' is inactive",
                config.name
            )));
        }
        if self.inner.tracker.is_closed() {
            return Err(AppError::Generic("Scheduler is shut down".into()));
        }
        tracing::info!(job_id = %config.id, job_name = %config.name, "Manual run requested");
        Ok(self.dispatch(config))
    }

    /// Stop all timers and wait for in-flight runs to finish.
    pub async fn shutdown(&self) {
        self.close();
        self.inner.tracker.wait().await;
        tracing::info!("Scheduler stopped");
    }

    /// Like [`shutdown`](Self::shutdown), but abandons runs still going after
    /// `grace`. Returns `false` if any run was abandoned.
    pub async fn shutdown_timeout(&self, grace: Duration) -> bool {
        self.close();
        if tokio::time::timeout(grace, self.inner.tracker.wait())
            .await
            .is_ok()
        {
            tracing::info!("Scheduler stopped");
            return true;
        }
        tracing::warn!(
            grace_secs = grace.as_secs(),
            "Runs still in flight after grace period, abandoning"
        );
        self.inner.runs_token.cancel();
        self.inner.tracker.wait().await;
        false
    }

    fn close(&self) {
        self.stop_all();
        self.inner.timers_token.cancel();
        self.inner.tracker.close();
    }

    fn spawn_timer(
        &self,
        config: ScrapeJobConfig,
        schedule: CronSchedule,
        cancel: CancellationToken,
        generation: u64,
    ) {
        let scheduler = self.clone();
        self.inner.tracker.spawn(async move {
            let mut cursor = Utc::now();
            loop {
                let Some(next) = schedule.next_after(&cursor) else {
                    tracing::warn!(job_id = %config.id, "Schedule has no future fire times");
                    break;
                };
                let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);

                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(wait) => {}
                }

                // Never fire the same slot twice, and skip slots missed while
                // the process was suspended.
                cursor = next.max(Utc::now());
                tracing::info!(job_id = %config.id, job_name = %config.name, fire_at = %next, "Schedule fired");
                scheduler.dispatch(&config);
            }
            scheduler.release_timer(config.id, generation);
            tracing::debug!(job_id = %config.id, "Timer stopped");
        });
    }

    /// Drop the registry entry for an exited timer task unless it has
    /// already been replaced or removed.
    fn release_timer(&self, job_id: Uuid, generation: u64) {
        let mut state = self.inner.lock_state();
        if state
            .timers
            .get(&job_id)
            .is_some_and(|entry| entry.generation == generation)
        {
            state.timers.remove(&job_id);
        }
    }

    fn dispatch(&self, config: &ScrapeJobConfig) -> TriggerAck {
        let Some(guard) = self.begin_run(config.id) else {
            tracing::info!(job_id = %config.id, job_name = %config.name, "Previous run still in progress, skipping");
            return TriggerAck::AlreadyRunning;
        };

        let runner = self.inner.runner.clone();
        let config = config.clone();
        let abandon = self.inner.runs_token.child_token();
        self.inner.tracker.spawn(async move {
            let _guard = guard;
            tokio::select! {
                result = runner.run(&config) => match result {
                    Ok(summary) => tracing::debug!(
                        job_id = %config.id,
                        run_id = %summary.run_id,
                        items = summary.items_scraped,
                        "Background run finished"
                    ),
                    Err(e) => tracing::error!(
                        job_id = %config.id,
                        job_name = %config.name,
                        error = %e,
                        "Background run failed"
                    ),
                },
                () = abandon.cancelled() => {
                    tracing::warn!(job_id = %config.id, "Run abandoned at shutdown");
                }
            }
        });
        TriggerAck::Started
    }

    fn begin_run(&self, job_id: Uuid) -> Option<RunGuard<R, J>> {
        let mut state = self.inner.lock_state();
        let count = state.running.entry(job_id).or_insert(0);
        if *count > 0 && self.inner.config.overlap == OverlapPolicy::SkipIfRunning {
            return None;
        }
        *count += 1;
        Some(RunGuard {
            inner: self.inner.clone(),
            job_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::JobType;
    use crate::schedule::FixedOffsetEstimator;
    use crate::testutil::{InMemoryStore, MockRunner, make_test_config};

    fn scheduler(runner: MockRunner, store: InMemoryStore) -> Scheduler<MockRunner, InMemoryStore> {
        Scheduler::new(runner, store, SchedulerConfig::default())
    }

    fn job(schedule: &str) -> ScrapeJobConfig {
        let mut config = make_test_config(JobType::News, "https://techcrunch.com/");
        config.schedule = Some(schedule.to_string());
        config
    }

    async fn wait_until_idle(s: &Scheduler<MockRunner, InMemoryStore>, job_id: Uuid) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while s.is_running(job_id) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("run did not finish");
    }

    #[tokio::test]
    async fn schedule_job_registers_timer() {
        let s = scheduler(MockRunner::new(), InMemoryStore::new());
        let config = job("0 * * * *");

        s.schedule_job(&config).unwrap();

        assert!(s.is_scheduled(config.id));
        let status = s.status();
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].schedule, "0 * * * *");
        assert!(status[0].next_fire_at.unwrap() > Utc::now());
        assert!(!status[0].running);
        s.shutdown().await;
    }

    #[tokio::test]
    async fn invalid_schedule_is_rejected() {
        let s = scheduler(MockRunner::new(), InMemoryStore::new());
        let config = job("every now and then");

        let err = s.schedule_job(&config).unwrap_err();

        assert!(matches!(err, AppError::InvalidSchedule { .. }));
        assert_eq!(s.timer_count(), 0);
    }

    #[tokio::test]
    async fn rescheduling_replaces_existing_timer() {
        let s = scheduler(MockRunner::new(), InMemoryStore::new());
        let mut config = job("0 * * * *");
        s.schedule_job(&config).unwrap();

        config.schedule = Some("30 2 * * *".into());
        s.schedule_job(&config).unwrap();

        assert_eq!(s.timer_count(), 1);
        assert_eq!(s.status()[0].schedule, "30 2 * * *");
        s.shutdown().await;
    }

    #[tokio::test]
    async fn exhausted_schedule_leaves_no_timer_behind() {
        let s = scheduler(MockRunner::new(), InMemoryStore::new());
        // Only fires in a year that has already passed.
        let config = job("0 0 0 1 1 * 2000");

        s.schedule_job(&config).unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while s.timer_count() > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("exhausted timer was not released");
        assert!(!s.is_scheduled(config.id));
        assert!(s.status().is_empty());

        // A fresh registration for the same job is unaffected.
        let mut config = config;
        config.schedule = Some("0 * * * *".into());
        s.schedule_job(&config).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(s.is_scheduled(config.id));
        s.shutdown().await;
    }

    #[tokio::test]
    async fn cancel_job_is_idempotent() {
        let s = scheduler(MockRunner::new(), InMemoryStore::new());
        let config = job("0 * * * *");
        s.schedule_job(&config).unwrap();

        assert!(s.cancel_job(config.id));
        assert!(!s.is_scheduled(config.id));
        assert!(!s.cancel_job(config.id));
        assert!(!s.cancel_job(Uuid::new_v4()));
    }

    #[tokio::test]
    async fn register_all_skips_unschedulable_configs() {
        let s = scheduler(MockRunner::new(), InMemoryStore::new());
        let mut inactive = job("0 * * * *");
        inactive.is_active = false;
        let mut blank = job("0 * * * *");
        blank.schedule = Some("  ".into());

        let registered = s.register_all(&[
            job("0 * * * *"),
            job("*/5 * * * *"),
            inactive,
            blank,
            job("not a schedule"),
        ]);

        assert_eq!(registered, 2);
        assert_eq!(s.timer_count(), 2);
        assert_eq!(s.stop_all(), 2);
        assert_eq!(s.timer_count(), 0);
    }

    #[tokio::test]
    async fn start_loads_active_jobs_from_store() {
        let store = InMemoryStore::new();
        store.insert_job(job("0 * * * *"));
        let mut inactive = job("0 * * * *");
        inactive.is_active = false;
        store.insert_job(inactive);
        let s = scheduler(MockRunner::new(), store);

        assert_eq!(s.start().await.unwrap(), 1);
        s.shutdown().await;
    }

    #[tokio::test]
    async fn reschedule_inactive_job_leaves_no_timer() {
        let store = InMemoryStore::new();
        let config = job("0 * * * *");
        store.insert_job(config.clone());
        let s = scheduler(MockRunner::new(), store.clone());
        s.schedule_job(&config).unwrap();

        store.set_active(config.id, false);
        let outcome = s.reschedule_job(config.id).await;

        assert_eq!(outcome, RescheduleOutcome::Unscheduled);
        assert!(!s.is_scheduled(config.id));
    }

    #[tokio::test]
    async fn reschedule_picks_up_new_schedule() {
        let store = InMemoryStore::new();
        let mut config = job("0 * * * *");
        store.insert_job(config.clone());
        let s = scheduler(MockRunner::new(), store.clone());
        s.schedule_job(&config).unwrap();

        config.schedule = Some("15 4 * * 1".into());
        store.insert_job(config.clone());

        assert_eq!(
            s.reschedule_job(config.id).await,
            RescheduleOutcome::Scheduled
        );
        assert_eq!(s.status()[0].schedule, "15 4 * * 1");
        s.shutdown().await;
    }

    #[tokio::test]
    async fn reschedule_missing_job_does_not_error() {
        let s = scheduler(MockRunner::new(), InMemoryStore::new());
        let config = job("0 * * * *");
        s.schedule_job(&config).unwrap();

        assert_eq!(
            s.reschedule_job(config.id).await,
            RescheduleOutcome::Missing
        );
        assert!(!s.is_scheduled(config.id));
    }

    #[tokio::test]
    async fn reschedule_keeps_timer_when_store_fails() {
        let store = InMemoryStore::new();
        let config = job("0 * * * *");
        store.insert_job(config.clone());
        let s = scheduler(MockRunner::new(), store.clone());
        s.schedule_job(&config).unwrap();

        store.fail_job_lookups();

        assert_eq!(
            s.reschedule_job(config.id).await,
            RescheduleOutcome::StoreUnavailable
        );
        assert!(s.is_scheduled(config.id));
        s.shutdown().await;
    }

    #[tokio::test]
    async fn trigger_rejects_inactive_job() {
        let runner = MockRunner::new();
        let s = scheduler(runner.clone(), InMemoryStore::new());
        let mut config = job("0 * * * *");
        config.is_active = false;

        let err = s.trigger_now(&config).unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        s.shutdown().await;
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn overlapping_trigger_is_skipped() {
        let runner = MockRunner::gated();
        let s = scheduler(runner.clone(), InMemoryStore::new());
        let config = job("0 * * * *");

        assert_eq!(s.trigger_now(&config).unwrap(), TriggerAck::Started);
        assert_eq!(s.trigger_now(&config).unwrap(), TriggerAck::AlreadyRunning);
        assert!(s.is_running(config.id));

        runner.release(1);
        wait_until_idle(&s, config.id).await;
        assert_eq!(s.trigger_now(&config).unwrap(), TriggerAck::Started);

        runner.release(1);
        s.shutdown().await;
        assert_eq!(runner.completed(), 2);
    }

    #[tokio::test]
    async fn allow_concurrent_starts_parallel_runs() {
        let runner = MockRunner::gated();
        let s = Scheduler::new(
            runner.clone(),
            InMemoryStore::new(),
            SchedulerConfig {
                overlap: OverlapPolicy::AllowConcurrent,
                ..Default::default()
            },
        );
        let config = job("0 * * * *");

        assert_eq!(s.trigger_now(&config).unwrap(), TriggerAck::Started);
        assert_eq!(s.trigger_now(&config).unwrap(), TriggerAck::Started);

        runner.release(2);
        s.shutdown().await;
        assert_eq!(runner.completed(), 2);
        assert!(!s.is_running(config.id));
    }

    #[tokio::test]
    async fn cancel_does_not_interrupt_in_flight_run() {
        let runner = MockRunner::gated();
        let s = scheduler(runner.clone(), InMemoryStore::new());
        let config = job("0 * * * *");
        s.schedule_job(&config).unwrap();
        s.trigger_now(&config).unwrap();

        assert!(s.cancel_job(config.id));
        runner.release(1);
        s.shutdown().await;

        assert_eq!(runner.completed(), 1);
    }

    #[tokio::test]
    async fn failed_run_is_contained() {
        let runner = MockRunner::failing("boom");
        let s = scheduler(runner.clone(), InMemoryStore::new());
        let config = job("0 * * * *");

        assert_eq!(s.trigger_now(&config).unwrap(), TriggerAck::Started);
        wait_until_idle(&s, config.id).await;
        assert_eq!(s.trigger_now(&config).unwrap(), TriggerAck::Started);

        s.shutdown().await;
        assert_eq!(runner.calls().len(), 2);
    }

    #[tokio::test]
    async fn timer_fires_runs() {
        let runner = MockRunner::new();
        let s = scheduler(runner.clone(), InMemoryStore::new());
        let config = job("* * * * * *");
        s.schedule_job(&config).unwrap();

        tokio::time::timeout(Duration::from_secs(3), async {
            while runner.calls().is_empty() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("timer never fired");

        s.shutdown().await;
        assert_eq!(runner.calls()[0], config.id);
    }

    #[tokio::test]
    async fn trigger_after_shutdown_is_refused() {
        let s = scheduler(MockRunner::new(), InMemoryStore::new());
        s.shutdown().await;
        assert!(s.trigger_now(&job("0 * * * *")).is_err());
        assert!(s.schedule_job(&job("0 * * * *")).is_err());
    }

    #[tokio::test]
    async fn shutdown_timeout_abandons_stuck_runs() {
        let runner = MockRunner::gated();
        let s = scheduler(runner.clone(), InMemoryStore::new());
        s.trigger_now(&job("0 * * * *")).unwrap();

        let clean = s.shutdown_timeout(Duration::from_millis(50)).await;

        assert!(!clean);
        assert_eq!(runner.completed(), 0);
    }

    #[test]
    fn next_run_estimate_uses_configured_estimator() {
        let s: Scheduler<MockRunner, InMemoryStore> = Scheduler::new(
            MockRunner::new(),
            InMemoryStore::new(),
            SchedulerConfig {
                estimator: Arc::new(FixedOffsetEstimator::default()),
                ..Default::default()
            },
        );
        let before = Utc::now();
        let estimate = s.next_run_estimate("0 0 1 1 *").unwrap();
        assert!(estimate >= before + chrono::TimeDelta::hours(1));
        assert!(estimate < before + chrono::TimeDelta::hours(2));
    }

    #[test]
    fn overlap_policy_parses() {
        assert_eq!("skip".parse(), Ok(OverlapPolicy::SkipIfRunning));
        assert_eq!("ALLOW".parse(), Ok(OverlapPolicy::AllowConcurrent));
        assert!("sometimes".parse::<OverlapPolicy>().is_err());
        assert_eq!(OverlapPolicy::default().to_string(), "skip");
    }
}

use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use uuid::Uuid;

use trawl_core::error::AppError;
use trawl_core::models::ScrapeJobConfig;
use trawl_core::scheduler::{OverlapPolicy, RescheduleOutcome, TimerStatus, TriggerAck};
use trawl_core::traits::JobStore;
use trawl_core::{JobRunner, Scheduler};
use trawl_db::Database;

/// What the routes need from the scheduler, with the runner and store
/// types erased.
pub trait SchedulerControl: Send + Sync {
    fn trigger(&self, config: &ScrapeJobConfig) -> Result<TriggerAck, AppError>;

    fn reschedule(&self, job_id: Uuid) -> BoxFuture<'_, RescheduleOutcome>;

    fn timers(&self) -> Vec<TimerStatus>;

    fn overlap(&self) -> OverlapPolicy;
}

impl<R, J> SchedulerControl for Scheduler<R, J>
where
    R: JobRunner + 'static,
    J: JobStore + 'static,
{
    fn trigger(&self, config: &ScrapeJobConfig) -> Result<TriggerAck, AppError> {
        self.trigger_now(config)
    }

    fn reschedule(&self, job_id: Uuid) -> BoxFuture<'_, RescheduleOutcome> {
        self.reschedule_job(job_id).boxed()
    }

    fn timers(&self) -> Vec<TimerStatus> {
        self.status()
    }

    fn overlap(&self) -> OverlapPolicy {
        self.overlap_policy()
    }
}

/// Shared application state, available to all route handlers via `State<Arc<AppState>>`.
pub struct AppState {
    pub db: Database,
    pub scheduler: Arc<dyn SchedulerControl>,
}

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::extract::ScrapeOutput;
use crate::models::{
    JobOptions, NewRecord, RecordType, RunOutcome, RunStatus, ScrapeJobConfig, ScrapeRun,
    ScrapedRecord, UpsertOutcome,
};

/// Fetches raw HTML content from a URL with a plain HTTP GET.
pub trait Fetcher: Send + Sync + Clone {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// What a [`PageRenderer`] should wait for before returning the DOM.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Selectors tried in order; rendering proceeds once any one appears.
    pub wait_for_any: Vec<String>,
    /// How long to wait for each selector before trying the next.
    pub selector_timeout: Duration,
    /// Scroll this many pixels (or to the bottom) to trigger lazy loading.
    pub scroll_limit_px: u32,
    /// Extra settle time after scrolling.
    pub settle: Duration,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            wait_for_any: Vec::new(),
            selector_timeout: Duration::from_secs(5),
            scroll_limit_px: 2000,
            settle: Duration::from_secs(2),
        }
    }
}

/// Renders a page in a headless browser and returns the resulting DOM as HTML.
pub trait PageRenderer: Send + Sync + Clone {
    fn render(
        &self,
        url: &str,
        options: &RenderOptions,
    ) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// Source-specific extraction strategy.
///
/// One call covers the whole run: every page the options allow. Per-item
/// and per-page problems are returned as warnings, not errors.
pub trait Extractor: Send + Sync {
    fn scrape(
        &self,
        target_url: &str,
        options: &JobOptions,
    ) -> impl Future<Output = Result<ScrapeOutput, AppError>> + Send;
}

/// Builds the extractor for a job configuration.
///
/// Fails with [`AppError::UnsupportedConfiguration`] when no strategy
/// matches the job's type and URL.
pub trait ExtractorFactory: Send + Sync + Clone {
    type Extractor: Extractor;

    fn create(&self, config: &ScrapeJobConfig) -> Result<Self::Extractor, AppError>;
}

/// Read access to job configurations, plus the run-tracking write-back.
pub trait JobStore: Send + Sync + Clone {
    fn get_job(
        &self,
        job_id: Uuid,
    ) -> impl Future<Output = Result<Option<ScrapeJobConfig>, AppError>> + Send;

    fn list_active_jobs(
        &self,
    ) -> impl Future<Output = Result<Vec<ScrapeJobConfig>, AppError>> + Send;

    /// Update `last_run_at` / `next_run_at` after a run.
    fn record_run(
        &self,
        job_id: Uuid,
        last_run_at: DateTime<Utc>,
        next_run_at: Option<DateTime<Utc>>,
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Persists the run log.
///
/// Implementations must refuse to finish a run that is no longer `running`
/// with [`AppError::InvalidRunTransition`].
pub trait RunStore: Send + Sync + Clone {
    fn start_run(
        &self,
        job_id: Uuid,
        started_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<ScrapeRun, AppError>> + Send;

    fn finish_run(
        &self,
        run_id: Uuid,
        outcome: &RunOutcome,
        completed_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<ScrapeRun, AppError>> + Send;

    /// Runs for a job, newest first.
    fn list_runs(
        &self,
        job_id: Uuid,
        status: Option<RunStatus>,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<ScrapeRun>, AppError>> + Send;

    /// Delete runs that started strictly before `cutoff`. Returns the count.
    fn delete_runs_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> impl Future<Output = Result<u64, AppError>> + Send;
}

/// Filter for record history queries.
#[derive(Debug, Clone)]
pub struct RecordFilter {
    pub job_id: Option<Uuid>,
    pub record_type: Option<RecordType>,
    pub limit: usize,
}

impl Default for RecordFilter {
    fn default() -> Self {
        Self {
            job_id: None,
            record_type: None,
            limit: 100,
        }
    }
}

/// Persists scraped records with insert-or-update semantics.
pub trait RecordStore: Send + Sync + Clone {
    /// Insert, or update in place when `(job_id, external_id)` already exists
    /// and `external_id` is non-null. `created_at` of an existing row is kept.
    fn upsert_record(
        &self,
        record: &NewRecord,
    ) -> impl Future<Output = Result<UpsertOutcome, AppError>> + Send;

    /// Records matching the filter, most recently captured first.
    fn list_records(
        &self,
        filter: &RecordFilter,
    ) -> impl Future<Output = Result<Vec<ScrapedRecord>, AppError>> + Send;

    /// Delete records captured strictly before `cutoff`. Returns the count.
    fn delete_records_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> impl Future<Output = Result<u64, AppError>> + Send;
}

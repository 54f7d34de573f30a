//! Test utilities: mock implementations of all core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::error::AppError;
use crate::executor::{JobRunner, RunEvent, RunReporter, RunSummary};
use crate::extract::ScrapeOutput;
use crate::models::{
    JobOptions, JobType, NewRecord, RunOutcome, RunStatus, ScrapeJobConfig, ScrapeRun,
    ScrapedRecord, UpsertOutcome,
};
use crate::traits::{
    Extractor, ExtractorFactory, Fetcher, JobStore, PageRenderer, RecordFilter, RecordStore,
    RenderOptions, RunStore,
};

const DEFAULT_HTML: &str = "<html><body>default</body></html>";

/// An active, hourly job configuration named `test job`.
pub fn make_test_config(job_type: JobType, target_url: &str) -> ScrapeJobConfig {
    let now = Utc::now();
    ScrapeJobConfig {
        id: Uuid::new_v4(),
        name: "test job".to_string(),
        job_type,
        target_url: target_url.to_string(),
        schedule: Some("0 * * * *".to_string()),
        is_active: true,
        options: JobOptions::default(),
        last_run_at: None,
        next_run_at: None,
        created_at: now,
        updated_at: now,
    }
}

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// Mock fetcher that returns a configurable response.
#[derive(Clone)]
pub struct MockFetcher {
    /// Queue of responses. Each call pops the first element.
    /// If empty, returns a default HTML string.
    responses: Arc<Mutex<Vec<Result<String, AppError>>>>,
    requested: Arc<Mutex<Vec<String>>>,
}

impl MockFetcher {
    pub fn new(html: &str) -> Self {
        Self::with_responses(vec![Ok(html.to_string())])
    }

    pub fn with_error(error: AppError) -> Self {
        Self::with_responses(vec![Err(error)])
    }

    pub fn with_responses(responses: Vec<Result<String, AppError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            requested: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every URL fetched so far, in call order.
    pub fn requested_urls(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        self.requested.lock().unwrap().push(url.to_string());
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(DEFAULT_HTML.to_string())
        } else {
            responses.remove(0)
        }
    }
}

// ---------------------------------------------------------------------------
// MockRenderer
// ---------------------------------------------------------------------------

/// Mock browser renderer. Same queue semantics as [`MockFetcher`].
#[derive(Clone)]
pub struct MockRenderer {
    responses: Arc<Mutex<Vec<Result<String, AppError>>>>,
    calls: Arc<Mutex<Vec<(String, RenderOptions)>>>,
}

impl MockRenderer {
    pub fn new(html: &str) -> Self {
        Self::with_responses(vec![Ok(html.to_string())])
    }

    pub fn with_error(error: AppError) -> Self {
        Self::with_responses(vec![Err(error)])
    }

    pub fn with_responses(responses: Vec<Result<String, AppError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> Vec<(String, RenderOptions)> {
        self.calls.lock().unwrap().clone()
    }
}

impl PageRenderer for MockRenderer {
    async fn render(&self, url: &str, options: &RenderOptions) -> Result<String, AppError> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), options.clone()));
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            Ok(DEFAULT_HTML.to_string())
        } else {
            responses.remove(0)
        }
    }
}

// ---------------------------------------------------------------------------
// MockExtractor
// ---------------------------------------------------------------------------

/// Mock extractor fed from a queue shared with its factory.
#[derive(Clone)]
pub struct MockExtractor {
    outputs: Arc<Mutex<Vec<Result<ScrapeOutput, AppError>>>>,
    calls: Arc<AtomicUsize>,
}

impl Extractor for MockExtractor {
    async fn scrape(
        &self,
        _target_url: &str,
        _options: &JobOptions,
    ) -> Result<ScrapeOutput, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut outputs = self.outputs.lock().unwrap();
        if outputs.is_empty() {
            Ok(ScrapeOutput::default())
        } else {
            outputs.remove(0)
        }
    }
}

// ---------------------------------------------------------------------------
// MockExtractorFactory
// ---------------------------------------------------------------------------

/// Mock factory. Every created extractor pops from the same output queue,
/// so retries see successive entries.
#[derive(Clone)]
pub struct MockExtractorFactory {
    outputs: Arc<Mutex<Vec<Result<ScrapeOutput, AppError>>>>,
    calls: Arc<AtomicUsize>,
    unsupported: bool,
}

impl MockExtractorFactory {
    pub fn with_outputs(outputs: Vec<Result<ScrapeOutput, AppError>>) -> Self {
        Self {
            outputs: Arc::new(Mutex::new(outputs)),
            calls: Arc::new(AtomicUsize::new(0)),
            unsupported: false,
        }
    }

    /// Factory whose `create` always fails with `UnsupportedConfiguration`.
    pub fn unsupported() -> Self {
        Self {
            unsupported: true,
            ..Self::with_outputs(Vec::new())
        }
    }

    /// Total `scrape` calls across all created extractors.
    pub fn scrape_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ExtractorFactory for MockExtractorFactory {
    type Extractor = MockExtractor;

    fn create(&self, config: &ScrapeJobConfig) -> Result<MockExtractor, AppError> {
        if self.unsupported {
            return Err(AppError::UnsupportedConfiguration {
                job_type: config.job_type,
                url: config.target_url.clone(),
            });
        }
        Ok(MockExtractor {
            outputs: self.outputs.clone(),
            calls: self.calls.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// MockReporter
// ---------------------------------------------------------------------------

/// Records the kind of every reported event.
#[derive(Clone, Default)]
pub struct MockReporter {
    kinds: Arc<Mutex<Vec<&'static str>>>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.kinds.lock().unwrap().clone()
    }
}

impl RunReporter for MockReporter {
    fn report(&self, event: RunEvent<'_>) {
        self.kinds.lock().unwrap().push(event.kind());
    }
}

// ---------------------------------------------------------------------------
// MockRunner
// ---------------------------------------------------------------------------

/// Mock job runner for scheduler tests.
///
/// A gated runner blocks every run until [`release`](Self::release) hands
/// out a permit.
#[derive(Clone)]
pub struct MockRunner {
    gate: Option<Arc<Semaphore>>,
    failure: Option<String>,
    calls: Arc<Mutex<Vec<Uuid>>>,
    completed: Arc<AtomicUsize>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self {
            gate: None,
            failure: None,
            calls: Arc::new(Mutex::new(Vec::new())),
            completed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn gated() -> Self {
        Self {
            gate: Some(Arc::new(Semaphore::new(0))),
            ..Self::new()
        }
    }

    /// Every run fails with `AppError::Generic(message)`.
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::new()
        }
    }

    /// Let `n` gated runs proceed.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// Job ids of every run started, in order.
    pub fn calls(&self) -> Vec<Uuid> {
        self.calls.lock().unwrap().clone()
    }

    /// Runs that finished successfully.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

impl Default for MockRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl JobRunner for MockRunner {
    async fn run(&self, config: &ScrapeJobConfig) -> Result<RunSummary, AppError> {
        self.calls.lock().unwrap().push(config.id);

        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|e| AppError::Generic(e.to_string()))?;
            permit.forget();
        }

        if let Some(message) = &self.failure {
            return Err(AppError::Generic(message.clone()));
        }

        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(RunSummary {
            run_id: Uuid::new_v4(),
            job_id: config.id,
            items_scraped: 0,
            records_written: 0,
            record_failures: 0,
            warnings: 0,
            attempts: 1,
            duration_ms: 0,
        })
    }
}

// ---------------------------------------------------------------------------
// InMemoryStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct StoreState {
    jobs: HashMap<Uuid, ScrapeJobConfig>,
    runs: Vec<ScrapeRun>,
    records: Vec<ScrapedRecord>,
    fail_writes_containing: Option<String>,
    fail_job_lookups: bool,
    fail_record_deletes: bool,
    fail_success_finish: bool,
}

/// In-memory implementation of [`JobStore`], [`RunStore`], and
/// [`RecordStore`] with the same semantics as the Postgres repositories.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a job configuration.
    pub fn insert_job(&self, job: ScrapeJobConfig) {
        self.state.lock().unwrap().jobs.insert(job.id, job);
    }

    pub fn set_active(&self, job_id: Uuid, active: bool) {
        if let Some(job) = self.state.lock().unwrap().jobs.get_mut(&job_id) {
            job.is_active = active;
        }
    }

    pub fn job(&self, job_id: Uuid) -> Option<ScrapeJobConfig> {
        self.state.lock().unwrap().jobs.get(&job_id).cloned()
    }

    /// All runs in insertion order.
    pub fn runs(&self) -> Vec<ScrapeRun> {
        self.state.lock().unwrap().runs.clone()
    }

    /// All records in insertion order.
    pub fn records(&self) -> Vec<ScrapedRecord> {
        self.state.lock().unwrap().records.clone()
    }

    pub fn insert_record(&self, record: ScrapedRecord) {
        self.state.lock().unwrap().records.push(record);
    }

    pub fn insert_run(&self, run: ScrapeRun) {
        self.state.lock().unwrap().runs.push(run);
    }

    /// Upserts of records whose title contains `needle` fail.
    pub fn fail_record_writes_containing(&self, needle: &str) {
        self.state.lock().unwrap().fail_writes_containing = Some(needle.to_string());
    }

    /// Every job read fails from now on.
    pub fn fail_job_lookups(&self) {
        self.state.lock().unwrap().fail_job_lookups = true;
    }

    pub fn fail_record_deletes(&self) {
        self.state.lock().unwrap().fail_record_deletes = true;
    }

    /// Closing a run as `success` fails from now on; `failed` still works.
    pub fn fail_success_finish(&self) {
        self.state.lock().unwrap().fail_success_finish = true;
    }
}

fn unavailable() -> AppError {
    AppError::DatabaseError("store unavailable".into())
}

impl JobStore for InMemoryStore {
    async fn get_job(&self, job_id: Uuid) -> Result<Option<ScrapeJobConfig>, AppError> {
        let state = self.state.lock().unwrap();
        if state.fail_job_lookups {
            return Err(unavailable());
        }
        Ok(state.jobs.get(&job_id).cloned())
    }

    async fn list_active_jobs(&self) -> Result<Vec<ScrapeJobConfig>, AppError> {
        let state = self.state.lock().unwrap();
        if state.fail_job_lookups {
            return Err(unavailable());
        }
        let mut jobs: Vec<_> = state.jobs.values().filter(|j| j.is_active).cloned().collect();
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }

    async fn record_run(
        &self,
        job_id: Uuid,
        last_run_at: DateTime<Utc>,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<(), AppError> {
        let mut state = self.state.lock().unwrap();
        let job = state
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| AppError::NotFound(format!("job {job_id}")))?;
        job.last_run_at = Some(last_run_at);
        job.next_run_at = next_run_at;
        job.updated_at = Utc::now();
        Ok(())
    }
}

impl RunStore for InMemoryStore {
    async fn start_run(
        &self,
        job_id: Uuid,
        started_at: DateTime<Utc>,
    ) -> Result<ScrapeRun, AppError> {
        let run = ScrapeRun {
            id: Uuid::new_v4(),
            job_id,
            status: RunStatus::Running,
            items_scraped: 0,
            error_message: None,
            started_at,
            completed_at: None,
            duration_ms: None,
        };
        self.state.lock().unwrap().runs.push(run.clone());
        Ok(run)
    }

    async fn finish_run(
        &self,
        run_id: Uuid,
        outcome: &RunOutcome,
        completed_at: DateTime<Utc>,
    ) -> Result<ScrapeRun, AppError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_success_finish && matches!(outcome, RunOutcome::Success { .. }) {
            return Err(AppError::DatabaseError("connection reset".into()));
        }
        let run = state
            .runs
            .iter_mut()
            .find(|r| r.id == run_id)
            .ok_or_else(|| AppError::NotFound(format!("run {run_id}")))?;

        let next = outcome.status();
        if !run.status.can_transition_to(next) {
            return Err(AppError::InvalidRunTransition {
                run_id,
                from: run.status,
                to: next,
            });
        }

        run.status = next;
        run.completed_at = Some(completed_at);
        run.duration_ms = Some(outcome.duration_ms());
        match outcome {
            RunOutcome::Success { items_scraped, .. } => run.items_scraped = *items_scraped,
            RunOutcome::Failed { error_message, .. } => {
                run.error_message = Some(error_message.clone())
            }
        }
        Ok(run.clone())
    }

    async fn list_runs(
        &self,
        job_id: Uuid,
        status: Option<RunStatus>,
        limit: usize,
    ) -> Result<Vec<ScrapeRun>, AppError> {
        let state = self.state.lock().unwrap();
        let mut runs: Vec<_> = state
            .runs
            .iter()
            .filter(|r| r.job_id == job_id && status.is_none_or(|s| r.status == s))
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs.truncate(limit);
        Ok(runs)
    }

    async fn delete_runs_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let mut state = self.state.lock().unwrap();
        let before = state.runs.len();
        state.runs.retain(|r| r.started_at >= cutoff);
        Ok((before - state.runs.len()) as u64)
    }
}

impl RecordStore for InMemoryStore {
    async fn upsert_record(&self, record: &NewRecord) -> Result<UpsertOutcome, AppError> {
        let mut state = self.state.lock().unwrap();
        if let Some(needle) = &state.fail_writes_containing
            && record.title.contains(needle.as_str())
        {
            return Err(AppError::DatabaseError(format!(
                "write rejected for '{}'",
                record.title
            )));
        }

        let existing = record.external_id.as_ref().and_then(|ext| {
            state
                .records
                .iter_mut()
                .find(|r| r.job_id == record.job_id && r.external_id.as_ref() == Some(ext))
        });

        if let Some(row) = existing {
            row.record_type = record.record_type;
            row.title = record.title.clone();
            row.description = record.description.clone();
            row.price = record.price;
            row.currency = record.currency.clone();
            row.source_url = record.source_url.clone();
            row.image_url = record.image_url.clone();
            row.metadata = record.metadata.clone();
            row.captured_at = record.captured_at;
            return Ok(UpsertOutcome::Updated(row.id));
        }

        let id = Uuid::new_v4();
        state.records.push(ScrapedRecord {
            id,
            job_id: record.job_id,
            record_type: record.record_type,
            external_id: record.external_id.clone(),
            title: record.title.clone(),
            description: record.description.clone(),
            price: record.price,
            currency: record.currency.clone(),
            source_url: record.source_url.clone(),
            image_url: record.image_url.clone(),
            metadata: record.metadata.clone(),
            captured_at: record.captured_at,
            created_at: record.captured_at,
        });
        Ok(UpsertOutcome::Inserted(id))
    }

    async fn list_records(&self, filter: &RecordFilter) -> Result<Vec<ScrapedRecord>, AppError> {
        let state = self.state.lock().unwrap();
        let mut records: Vec<_> = state
            .records
            .iter()
            .filter(|r| filter.job_id.is_none_or(|id| r.job_id == id))
            .filter(|r| filter.record_type.is_none_or(|t| r.record_type == t))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.captured_at.cmp(&a.captured_at));
        records.truncate(filter.limit);
        Ok(records)
    }

    async fn delete_records_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_record_deletes {
            return Err(unavailable());
        }
        let before = state.records.len();
        state.records.retain(|r| r.captured_at >= cutoff);
        Ok((before - state.records.len()) as u64)
    }
}

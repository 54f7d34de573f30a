use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use trawl_core::models::{ScrapeRun, ScrapedRecord};
use trawl_core::scheduler::TimerStatus;

// ---------------------------------------------------------------------------
// Triggers
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct TriggerResponse {
    pub job_id: Uuid,
    /// Always `started`; the run itself proceeds in the background.
    pub status: String,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct TimerResponse {
    pub job_id: Uuid,
    pub job_name: String,
    pub schedule: String,
    pub next_fire_at: Option<DateTime<Utc>>,
    pub running: bool,
}

impl From<TimerStatus> for TimerResponse {
    fn from(t: TimerStatus) -> Self {
        Self {
            job_id: t.job_id,
            job_name: t.job_name,
            schedule: t.schedule,
            next_fire_at: t.next_fire_at,
            running: t.running,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct SchedulerStatusResponse {
    /// `skip` or `allow`
    pub overlap_policy: String,
    pub timers: Vec<TimerResponse>,
    pub total: usize,
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ListRunsQuery {
    /// `running`, `success`, or `failed`
    pub status: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct RunResponse {
    pub id: Uuid,
    pub job_id: Uuid,
    pub status: String,
    pub items_scraped: u32,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
}

impl From<ScrapeRun> for RunResponse {
    fn from(run: ScrapeRun) -> Self {
        Self {
            id: run.id,
            job_id: run.job_id,
            status: run.status.to_string(),
            items_scraped: run.items_scraped,
            error_message: run.error_message,
            started_at: run.started_at,
            completed_at: run.completed_at,
            duration_ms: run.duration_ms,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct RunListResponse {
    pub runs: Vec<RunResponse>,
    pub total: usize,
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ListRecordsQuery {
    pub job_id: Option<Uuid>,
    /// `product`, `job`, or `article`
    pub record_type: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct RecordResponse {
    pub id: Uuid,
    pub job_id: Uuid,
    pub record_type: String,
    pub external_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub source_url: String,
    pub image_url: Option<String>,
    pub metadata: serde_json::Value,
    pub captured_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<ScrapedRecord> for RecordResponse {
    fn from(r: ScrapedRecord) -> Self {
        Self {
            id: r.id,
            job_id: r.job_id,
            record_type: r.record_type.to_string(),
            external_id: r.external_id,
            title: r.title,
            description: r.description,
            price: r.price,
            currency: r.currency,
            source_url: r.source_url,
            image_url: r.image_url,
            metadata: r.metadata,
            captured_at: r.captured_at,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct RecordListResponse {
    pub records: Vec<RecordResponse>,
    pub total: usize,
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
    pub timers: usize,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of source a job scrapes. Persisted as `ecommerce`, `jobs`, or `news`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    Ecommerce,
    Jobs,
    News,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Ecommerce => "ecommerce",
            JobType::Jobs => "jobs",
            JobType::News => "news",
        }
    }

    /// Kind of record jobs of this type produce.
    pub fn record_type(&self) -> RecordType {
        match self {
            JobType::Ecommerce => RecordType::Product,
            JobType::Jobs => RecordType::Job,
            JobType::News => RecordType::Article,
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ecommerce" => Ok(JobType::Ecommerce),
            "jobs" => Ok(JobType::Jobs),
            "news" => Ok(JobType::News),
            _ => Err(format!("Unknown job type: {}", s)),
        }
    }
}

/// Status of a single scrape run. Persisted as `running`, `success`, or `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Success | RunStatus::Failed)
    }

    /// Only `running -> success` and `running -> failed` are legal.
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        matches!(
            (self, next),
            (RunStatus::Running, RunStatus::Success) | (RunStatus::Running, RunStatus::Failed)
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "running" => Ok(RunStatus::Running),
            "success" => Ok(RunStatus::Success),
            "failed" => Ok(RunStatus::Failed),
            _ => Err(format!("Unknown run status: {}", s)),
        }
    }
}

/// Kind of record an extractor produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    Product,
    Job,
    Article,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Product => "product",
            RecordType::Job => "job",
            RecordType::Article => "article",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "product" => Ok(RecordType::Product),
            "job" => Ok(RecordType::Job),
            "article" => Ok(RecordType::Article),
            _ => Err(format!("Unknown record type: {}", s)),
        }
    }
}

/// Type-specific knobs stored alongside a job configuration.
///
/// Every field is optional; extractors fall back to their own defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOptions {
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "maxPages")]
    pub max_pages: Option<u32>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        alias = "maxItems",
        alias = "maxArticles"
    )]
    pub max_items: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<u64>,
}

impl JobOptions {
    /// Parse options from the stored JSON blob, ignoring unknown keys.
    ///
    /// Each field is read on its own: numbers and numeric strings are
    /// accepted, anything else is logged and left unset. When several
    /// aliases are present the first valid one wins. A null or non-object
    /// value yields the defaults.
    pub fn from_json(value: &serde_json::Value) -> Self {
        let map = match value {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => return Self::default(),
            other => {
                tracing::warn!(options = %other, "Job options are not an object, using defaults");
                return Self::default();
            }
        };

        Self {
            max_pages: option_field(map, &["max_pages", "maxPages"]),
            max_items: option_field(map, &["max_items", "maxItems", "maxArticles"]),
            min_delay_ms: option_field(map, &["min_delay_ms", "minDelayMs"]),
            max_delay_ms: option_field(map, &["max_delay_ms", "maxDelayMs"]),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    pub fn max_pages_or(&self, default: u32) -> u32 {
        self.max_pages.filter(|p| *p > 0).unwrap_or(default)
    }

    /// Per-job inter-page delay override, if both bounds are present.
    pub fn delay_override(&self) -> Option<(Duration, Duration)> {
        match (self.min_delay_ms, self.max_delay_ms) {
            (Some(min), Some(max)) => Some((
                Duration::from_millis(min.min(max)),
                Duration::from_millis(min.max(max)),
            )),
            _ => None,
        }
    }
}

fn option_field<T>(map: &serde_json::Map<String, serde_json::Value>, keys: &[&str]) -> Option<T>
where
    T: TryFrom<u64> + FromStr,
{
    keys.iter().find_map(|&key| {
        let raw = map.get(key)?;
        let parsed = match raw {
            serde_json::Value::Null => return None,
            serde_json::Value::Number(n) => n.as_u64().and_then(|n| T::try_from(n).ok()),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        if parsed.is_none() {
            tracing::warn!(key, value = %raw, "Ignoring invalid job option");
        }
        parsed
    })
}

/// Declarative description of what to scrape and how often.
///
/// Owned by the external configuration API. The engine reads it and only
/// writes back `last_run_at` / `next_run_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeJobConfig {
    pub id: Uuid,
    pub name: String,
    pub job_type: JobType,
    pub target_url: String,
    pub schedule: Option<String>,
    pub is_active: bool,
    pub options: JobOptions,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScrapeJobConfig {
    /// The trimmed schedule string, if one is set and non-empty.
    pub fn schedule(&self) -> Option<&str> {
        self.schedule
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// True when the scheduler should own a timer for this job.
    pub fn is_schedulable(&self) -> bool {
        self.is_active && self.schedule().is_some()
    }
}

/// Request to create a job configuration (used by the CLI and tests; the
/// production API owns configuration CRUD).
#[derive(Debug, Clone)]
pub struct NewScrapeJob {
    pub name: String,
    pub job_type: JobType,
    pub target_url: String,
    pub schedule: Option<String>,
    pub is_active: bool,
    pub options: JobOptions,
}

impl NewScrapeJob {
    pub fn new(name: impl Into<String>, job_type: JobType, target_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            job_type,
            target_url: target_url.into(),
            schedule: None,
            is_active: true,
            options: JobOptions::default(),
        }
    }

    pub fn with_schedule(mut self, schedule: impl Into<String>) -> Self {
        self.schedule = Some(schedule.into());
        self
    }

    pub fn with_options(mut self, options: JobOptions) -> Self {
        self.options = options;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

/// One execution attempt's lifecycle record.
#[derive(Debug, Clone, Serialize)]
pub struct ScrapeRun {
    pub id: Uuid,
    pub job_id: Uuid,
    pub status: RunStatus,
    pub items_scraped: u32,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
}

/// Terminal outcome written to a run row exactly once.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Success {
        items_scraped: u32,
        duration_ms: u64,
    },
    Failed {
        error_message: String,
        duration_ms: u64,
    },
}

impl RunOutcome {
    pub fn status(&self) -> RunStatus {
        match self {
            RunOutcome::Success { .. } => RunStatus::Success,
            RunOutcome::Failed { .. } => RunStatus::Failed,
        }
    }

    pub fn duration_ms(&self) -> u64 {
        match self {
            RunOutcome::Success { duration_ms, .. } | RunOutcome::Failed { duration_ms, .. } => {
                *duration_ms
            }
        }
    }
}

/// A normalized item produced by an extractor, before persistence.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RawRecord {
    pub title: String,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub url: String,
    pub image_url: Option<String>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub external_id: Option<String>,
}

/// Row payload handed to a [`RecordStore`](crate::traits::RecordStore) for upsert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewRecord {
    pub job_id: Uuid,
    pub record_type: RecordType,
    pub external_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub source_url: String,
    pub image_url: Option<String>,
    pub metadata: serde_json::Value,
    pub captured_at: DateTime<Utc>,
}

/// A persisted record.
#[derive(Debug, Clone, Serialize)]
pub struct ScrapedRecord {
    pub id: Uuid,
    pub job_id: Uuid,
    pub record_type: RecordType,
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

/// Result of a single upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted(Uuid),
    Updated(Uuid),
}

impl UpsertOutcome {
    pub fn id(&self) -> Uuid {
        match self {
            UpsertOutcome::Inserted(id) | UpsertOutcome::Updated(id) => *id,
        }
    }
}

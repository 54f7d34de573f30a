use chrono::{DateTime, Utc};
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

use trawl_core::error::AppError;
use trawl_core::models::{JobOptions, JobType, NewScrapeJob, ScrapeJobConfig};
use trawl_core::schedule::validate_schedule;
use trawl_core::traits::JobStore;

use crate::db_err;

/// Job configurations in PostgreSQL.
///
/// The engine reads configurations and writes back run timestamps; creation
/// and listing exist for the CLI and tests.
#[derive(Clone)]
pub struct JobConfigRepository {
    pool: Pool<Postgres>,
}

impl JobConfigRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create_job(&self, job: &NewScrapeJob) -> Result<ScrapeJobConfig, AppError> {
        if let Some(schedule) = job.schedule.as_deref().filter(|s| !s.trim().is_empty()) {
            validate_schedule(schedule)?;
        }

        let row = sqlx::query_as::<_, JobConfigRow>(
            r#"
            INSERT INTO scrape_job_configs (name, job_type, target_url, schedule, is_active, options)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(&job.name)
        .bind(job.job_type.as_str())
        .bind(&job.target_url)
        .bind(&job.schedule)
        .bind(job.is_active)
        .bind(job.options.to_json())
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        row.try_into()
    }

    /// All configurations, oldest first.
    pub async fn list_jobs(&self) -> Result<Vec<ScrapeJobConfig>, AppError> {
        let rows = sqlx::query_as::<_, JobConfigRow>(
            "SELECT * FROM scrape_job_configs ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        convert_rows(rows)
    }

    pub async fn set_active(&self, job_id: Uuid, active: bool) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE scrape_job_configs SET is_active = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(job_id)
        .bind(active)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() > 0)
    }
}

// -- Internal row type for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct JobConfigRow {
    id: Uuid,
    name: String,
    job_type: String,
    target_url: String,
    schedule: Option<String>,
    is_active: bool,
    options: serde_json::Value,
    last_run_at: Option<DateTime<Utc>>,
    next_run_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<JobConfigRow> for ScrapeJobConfig {
    type Error = AppError;

    fn try_from(row: JobConfigRow) -> Result<Self, AppError> {
        let job_type: JobType = row.job_type.parse().map_err(AppError::Validation)?;
        Ok(ScrapeJobConfig {
            id: row.id,
            name: row.name,
            job_type,
            target_url: row.target_url,
            schedule: row.schedule,
            is_active: row.is_active,
            options: JobOptions::from_json(&row.options),
            last_run_at: row.last_run_at,
            next_run_at: row.next_run_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn convert_rows(rows: Vec<JobConfigRow>) -> Result<Vec<ScrapeJobConfig>, AppError> {
    rows.into_iter().map(TryInto::try_into).collect()
}

// -- Trait implementation --

impl JobStore for JobConfigRepository {
    async fn get_job(&self, job_id: Uuid) -> Result<Option<ScrapeJobConfig>, AppError> {
        let row = sqlx::query_as::<_, JobConfigRow>("SELECT * FROM scrape_job_configs WHERE id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list_active_jobs(&self) -> Result<Vec<ScrapeJobConfig>, AppError> {
        let rows = sqlx::query_as::<_, JobConfigRow>(
            "SELECT * FROM scrape_job_configs WHERE is_active ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        convert_rows(rows)
    }

    async fn record_run(
        &self,
        job_id: Uuid,
        last_run_at: DateTime<Utc>,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            r#"
            UPDATE scrape_job_configs
            SET last_run_at = $2, next_run_at = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(last_run_at)
        .bind(next_run_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("job {job_id}")));
        }
        Ok(())
    }
}

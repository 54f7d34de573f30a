use chrono::{DateTime, Utc};
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

use trawl_core::error::AppError;
use trawl_core::models::{RunOutcome, RunStatus, ScrapeRun};
use trawl_core::traits::RunStore;

use crate::db_err;

/// Run log in PostgreSQL.
///
/// `finish_run` only touches rows still in `running`, so a terminal run can
/// never be rewritten even by a late or duplicated completion.
#[derive(Clone)]
pub struct RunRepository {
    pool: Pool<Postgres>,
}

impl RunRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_run(&self, run_id: Uuid) -> Result<Option<ScrapeRun>, AppError> {
        let row = sqlx::query_as::<_, RunRow>("SELECT * FROM scrape_runs WHERE id = $1")
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(TryInto::try_into).transpose()
    }

    /// Runs still marked `running`. After a crash these are orphans.
    pub async fn list_running(&self) -> Result<Vec<ScrapeRun>, AppError> {
        let rows = sqlx::query_as::<_, RunRow>(
            "SELECT * FROM scrape_runs WHERE status = 'running' ORDER BY started_at",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

// -- Internal row type for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct RunRow {
    id: Uuid,
    job_id: Uuid,
    status: String,
    items_scraped: i32,
    error_message: Option<String>,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    duration_ms: Option<i64>,
}

impl TryFrom<RunRow> for ScrapeRun {
    type Error = AppError;

    fn try_from(row: RunRow) -> Result<Self, AppError> {
        Ok(ScrapeRun {
            id: row.id,
            job_id: row.job_id,
            status: row.status.parse().map_err(AppError::Validation)?,
            items_scraped: u32::try_from(row.items_scraped).unwrap_or(0),
            error_message: row.error_message,
            started_at: row.started_at,
            completed_at: row.completed_at,
            duration_ms: row.duration_ms.and_then(|d| u64::try_from(d).ok()),
        })
    }
}

// -- Trait implementation --

impl RunStore for RunRepository {
    async fn start_run(
        &self,
        job_id: Uuid,
        started_at: DateTime<Utc>,
    ) -> Result<ScrapeRun, AppError> {
        let row = sqlx::query_as::<_, RunRow>(
            r#"
            INSERT INTO scrape_runs (job_id, status, started_at)
            VALUES ($1, 'running', $2)
            RETURNING *
            "#,
        )
        .bind(job_id)
        .bind(started_at)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        row.try_into()
    }

    async fn finish_run(
        &self,
        run_id: Uuid,
        outcome: &RunOutcome,
        completed_at: DateTime<Utc>,
    ) -> Result<ScrapeRun, AppError> {
        let (items_scraped, error_message) = match outcome {
            RunOutcome::Success { items_scraped, .. } => {
                (Some(i32::try_from(*items_scraped).unwrap_or(i32::MAX)), None)
            }
            RunOutcome::Failed { error_message, .. } => (None, Some(error_message.as_str())),
        };
        let next = outcome.status();

        let row = sqlx::query_as::<_, RunRow>(
            r#"
            UPDATE scrape_runs
            SET status = $2,
                items_scraped = COALESCE($3, items_scraped),
                error_message = $4,
                completed_at = $5,
                duration_ms = $6
            WHERE id = $1 AND status = 'running'
            RETURNING *
            "#,
        )
        .bind(run_id)
        .bind(next.as_str())
        .bind(items_scraped)
        .bind(error_message)
        .bind(completed_at)
        .bind(i64::try_from(outcome.duration_ms()).unwrap_or(i64::MAX))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        if let Some(row) = row {
            return row.try_into();
        }

        // Nothing updated: either the run is gone or it already finished.
        match self.get_run(run_id).await? {
            Some(current) => Err(AppError::InvalidRunTransition {
                run_id,
                from: current.status,
                to: next,
            }),
            None => Err(AppError::NotFound(format!("run {run_id}"))),
        }
    }

    async fn list_runs(
        &self,
        job_id: Uuid,
        status: Option<RunStatus>,
        limit: usize,
    ) -> Result<Vec<ScrapeRun>, AppError> {
        let rows = sqlx::query_as::<_, RunRow>(
            r#"
            SELECT * FROM scrape_runs
            WHERE job_id = $1 AND ($2::VARCHAR IS NULL OR status = $2)
            ORDER BY started_at DESC
            LIMIT $3
            "#,
        )
        .bind(job_id)
        .bind(status.map(|s| s.as_str()))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn delete_runs_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM scrape_runs WHERE started_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(result.rows_affected())
    }
}

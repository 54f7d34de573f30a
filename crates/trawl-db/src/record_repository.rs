use chrono::{DateTime, Utc};
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

use trawl_core::error::AppError;
use trawl_core::models::{NewRecord, ScrapedRecord, UpsertOutcome};
use trawl_core::traits::{RecordFilter, RecordStore};

use crate::db_err;

/// Scraped records in PostgreSQL.
#[derive(Clone)]
pub struct RecordRepository {
    pool: Pool<Postgres>,
}

impl RecordRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn count_for_job(&self, job_id: Uuid) -> Result<i64, AppError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM scraped_records WHERE job_id = $1")
            .bind(job_id)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.0)
    }
}

// -- Internal row types for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct RecordRow {
    id: Uuid,
    job_id: Uuid,
    record_type: String,
    external_id: Option<String>,
    title: String,
    description: Option<String>,
    price: Option<f64>,
    currency: Option<String>,
    source_url: String,
    image_url: Option<String>,
    metadata: serde_json::Value,
    captured_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl TryFrom<RecordRow> for ScrapedRecord {
    type Error = AppError;

    fn try_from(row: RecordRow) -> Result<Self, AppError> {
        Ok(ScrapedRecord {
            id: row.id,
            job_id: row.job_id,
            record_type: row.record_type.parse().map_err(AppError::Validation)?,
            external_id: row.external_id,
            title: row.title,
            description: row.description,
            price: row.price,
            currency: row.currency,
            source_url: row.source_url,
            image_url: row.image_url,
            metadata: row.metadata,
            captured_at: row.captured_at,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct UpsertRow {
    id: Uuid,
    inserted: bool,
}

// -- Trait implementation --

impl RecordStore for RecordRepository {
    async fn upsert_record(&self, record: &NewRecord) -> Result<UpsertOutcome, AppError> {
        // `xmax = 0` only holds for a freshly inserted tuple.
        let row = sqlx::query_as::<_, UpsertRow>(
            r#"
            INSERT INTO scraped_records (
                job_id, record_type, external_id, title, description, price, currency,
                source_url, image_url, metadata, captured_at, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
            ON CONFLICT (job_id, external_id) DO UPDATE SET
                record_type = EXCLUDED.record_type,
                title = EXCLUDED.title,
                description = EXCLUDED.description,
                price = EXCLUDED.price,
                currency = EXCLUDED.currency,
                source_url = EXCLUDED.source_url,
                image_url = EXCLUDED.image_url,
                metadata = EXCLUDED.metadata,
                captured_at = EXCLUDED.captured_at
            RETURNING id, (xmax = 0) AS inserted
            "#,
        )
        .bind(record.job_id)
        .bind(record.record_type.as_str())
        .bind(&record.external_id)
        .bind(&record.title)
        .bind(&record.description)
        .bind(record.price)
        .bind(&record.currency)
        .bind(&record.source_url)
        .bind(&record.image_url)
        .bind(&record.metadata)
        .bind(record.captured_at)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(if row.inserted {
            UpsertOutcome::Inserted(row.id)
        } else {
            UpsertOutcome::Updated(row.id)
        })
    }

    async fn list_records(&self, filter: &RecordFilter) -> Result<Vec<ScrapedRecord>, AppError> {
        let rows = sqlx::query_as::<_, RecordRow>(
            r#"
            SELECT * FROM scraped_records
            WHERE ($1::UUID IS NULL OR job_id = $1)
              AND ($2::VARCHAR IS NULL OR record_type = $2)
            ORDER BY captured_at DESC
            LIMIT $3
            "#,
        )
        .bind(filter.job_id)
        .bind(filter.record_type.map(|t| t.as_str()))
        .bind(filter.limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn delete_records_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM scraped_records WHERE captured_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(result.rows_affected())
    }
}

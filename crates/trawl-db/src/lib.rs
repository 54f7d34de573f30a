pub mod config;
pub mod database;
pub mod job_repository;
pub mod record_repository;
pub mod run_repository;

pub use config::DatabaseConfig;
pub use database::Database;
pub use job_repository::JobConfigRepository;
pub use record_repository::RecordRepository;
pub use run_repository::RunRepository;

/// Map any sqlx failure onto the core error type.
pub(crate) fn db_err(e: sqlx::Error) -> trawl_core::AppError {
    trawl_core::AppError::DatabaseError(e.to_string())
}

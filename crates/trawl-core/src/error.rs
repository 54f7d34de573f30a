use thiserror::Error;
use uuid::Uuid;

use crate::models::{JobType, RunStatus};

/// Application-wide error types for Trawl.
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP request failed before a response was received, or the body was unreadable.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Server answered with a non-success status code.
    #[error("HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },

    /// Headless browser navigation or evaluation failed.
    #[error("Browser error: {0}")]
    BrowserError(String),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// A single item or page could not be parsed.
    #[error("Extraction error: {0}")]
    ExtractionError(String),

    /// Cron expression could not be parsed.
    #[error("Invalid schedule '{schedule}': {reason}")]
    InvalidSchedule { schedule: String, reason: String },

    /// Job configuration is malformed or not runnable.
    #[error("Validation error: {0}")]
    Validation(String),

    /// No extractor is registered for this (type, url) pair.
    #[error("Unsupported scraper configuration: no extractor for type '{job_type}' and url '{url}'")]
    UnsupportedConfiguration { job_type: JobType, url: String },

    /// Attempted to move a run out of a terminal state.
    #[error("Run {run_id} cannot transition from {from} to {to}")]
    InvalidRunTransition {
        run_id: Uuid,
        from: RunStatus,
        to: RunStatus,
    },

    /// Requested entity does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Missing or invalid configuration value.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Returns true if this error is transient and worth retrying.
    ///
    /// Validation, dispatch, and persistence errors are never retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::NetworkError(_) | AppError::Timeout(_) | AppError::BrowserError(_) => true,
            AppError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Returns true for errors that must surface immediately without retry
    /// or per-item skipping.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AppError::InvalidSchedule { .. }
                | AppError::Validation(_)
                | AppError::UnsupportedConfiguration { .. }
                | AppError::ConfigError(_)
        )
    }
}

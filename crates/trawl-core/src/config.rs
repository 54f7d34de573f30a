use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::error::AppError;
use crate::executor::ExecutorConfig;
use crate::pacing::PageDelay;
use crate::retry::RetryPolicy;
use crate::schedule::CronEstimator;
use crate::scheduler::{OverlapPolicy, SchedulerConfig};
use crate::sweeper::RetentionPolicy;

/// Engine tuning read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub retry: RetryPolicy,
    pub page_delay: PageDelay,
    pub http_timeout: Duration,
    pub browser_timeout: Duration,
    pub retention: RetentionPolicy,
    pub overlap: OverlapPolicy,
    /// Listen port of the HTTP control surface.
    pub server_port: u16,
    /// How long shutdown waits for in-flight runs.
    pub shutdown_grace: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            page_delay: PageDelay::default(),
            http_timeout: Duration::from_secs(30),
            browser_timeout: Duration::from_secs(60),
            retention: RetentionPolicy::default(),
            overlap: OverlapPolicy::default(),
            server_port: 3000,
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

impl EngineConfig {
    /// Read configuration from environment variables.
    ///
    /// All optional:
    /// - `TRAWL_MAX_ATTEMPTS` (3), `TRAWL_RETRY_BASE_MS` (2000)
    /// - `TRAWL_PAGE_DELAY_MIN_MS` (1000), `TRAWL_PAGE_DELAY_MAX_MS` (3000)
    /// - `TRAWL_HTTP_TIMEOUT_SECS` (30), `TRAWL_BROWSER_TIMEOUT_SECS` (60)
    /// - `TRAWL_RECORD_RETENTION_DAYS` (90), `TRAWL_RUN_RETENTION_DAYS` (30)
    /// - `TRAWL_OVERLAP_POLICY` (`skip` or `allow`)
    /// - `TRAWL_SERVER_PORT` (3000), `TRAWL_SHUTDOWN_GRACE_SECS` (30)
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup<L>(lookup: L) -> Result<Self, AppError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let max_attempts: u32 = parse_var(&lookup, "TRAWL_MAX_ATTEMPTS", 3)?;
        if max_attempts == 0 {
            return Err(AppError::ConfigError(
                "TRAWL_MAX_ATTEMPTS must be at least 1".into(),
            ));
        }
        let retry_base_ms: u64 = parse_var(&lookup, "TRAWL_RETRY_BASE_MS", 2000)?;

        let delay_min_ms: u64 = parse_var(&lookup, "TRAWL_PAGE_DELAY_MIN_MS", 1000)?;
        let delay_max_ms: u64 = parse_var(&lookup, "TRAWL_PAGE_DELAY_MAX_MS", 3000)?;
        if delay_min_ms > delay_max_ms {
            return Err(AppError::ConfigError(format!(
                "TRAWL_PAGE_DELAY_MIN_MS ({delay_min_ms}) exceeds TRAWL_PAGE_DELAY_MAX_MS ({delay_max_ms})"
            )));
        }

        let http_timeout_secs: u64 = parse_var(&lookup, "TRAWL_HTTP_TIMEOUT_SECS", 30)?;
        let browser_timeout_secs: u64 = parse_var(&lookup, "TRAWL_BROWSER_TIMEOUT_SECS", 60)?;
        let record_days: u32 = parse_var(&lookup, "TRAWL_RECORD_RETENTION_DAYS", 90)?;
        let run_days: u32 = parse_var(&lookup, "TRAWL_RUN_RETENTION_DAYS", 30)?;
        let server_port: u16 = parse_var(&lookup, "TRAWL_SERVER_PORT", 3000)?;
        let grace_secs: u64 = parse_var(&lookup, "TRAWL_SHUTDOWN_GRACE_SECS", 30)?;

        let overlap = match lookup("TRAWL_OVERLAP_POLICY") {
            None => OverlapPolicy::default(),
            Some(raw) => raw.parse().map_err(|e: String| {
                AppError::ConfigError(format!("Invalid TRAWL_OVERLAP_POLICY: {e}"))
            })?,
        };

        Ok(Self {
            retry: RetryPolicy::new(max_attempts, Duration::from_millis(retry_base_ms)),
            page_delay: PageDelay::new(
                Duration::from_millis(delay_min_ms),
                Duration::from_millis(delay_max_ms),
            ),
            http_timeout: Duration::from_secs(http_timeout_secs),
            browser_timeout: Duration::from_secs(browser_timeout_secs),
            retention: RetentionPolicy::from_days(record_days, run_days),
            overlap,
            server_port,
            shutdown_grace: Duration::from_secs(grace_secs),
        })
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            retry: self.retry.clone(),
            estimator: Arc::new(CronEstimator),
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            overlap: self.overlap,
            estimator: Arc::new(CronEstimator),
        }
    }
}

fn parse_var<T, L>(lookup: &L, key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    L: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| {
            AppError::ConfigError(format!(
                "Invalid {key} '{raw}': must be a non-negative integer"
            ))
        }),
    }
}

//! Executes one scrape run end to end.
//!
//! A run is: insert a `running` row, resolve the extractor, call `scrape()`
//! under bounded retry, persist the records, then close the row as `success`
//! or `failed`. Only the whole `scrape()` call is retried; records are written
//! once, after it succeeds.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::error::AppError;
use crate::extract::{ExtractionWarning, ScrapeOutput};
use crate::models::{RunOutcome, ScrapeJobConfig};
use crate::persist::RecordWriter;
use crate::retry::{RetryPolicy, retry_with_backoff};
use crate::schedule::{CronEstimator, NextRunEstimator};
use crate::traits::{Extractor, ExtractorFactory, JobStore, RecordStore, RunStore};

/// Events emitted while a run executes.
#[derive(Debug, Clone)]
pub enum RunEvent<'a> {
    Started {
        job_id: Uuid,
        run_id: Uuid,
        job_name: &'a str,
        url: &'a str,
    },
    RetryScheduled {
        job_id: Uuid,
        run_id: Uuid,
        attempt: u32,
        max_attempts: u32,
        delay: Duration,
        error: &'a AppError,
    },
    ItemWarning {
        job_id: Uuid,
        run_id: Uuid,
        page: u32,
        index: usize,
        reason: &'a str,
    },
    PageSkipped {
        job_id: Uuid,
        run_id: Uuid,
        page: u32,
        url: &'a str,
        error: &'a str,
    },
    RecordWriteFailed {
        job_id: Uuid,
        run_id: Uuid,
        url: &'a str,
        error: &'a AppError,
    },
    Completed {
        job_id: Uuid,
        run_id: Uuid,
        items_scraped: u32,
        duration_ms: u64,
    },
    Failed {
        job_id: Uuid,
        run_id: Uuid,
        error: &'a AppError,
        duration_ms: u64,
    },
}

impl RunEvent<'_> {
    pub fn kind(&self) -> &'static str {
        match self {
            RunEvent::Started { .. } => "started",
            RunEvent::RetryScheduled { .. } => "retry_scheduled",
            RunEvent::ItemWarning { .. } => "item_warning",
            RunEvent::PageSkipped { .. } => "page_skipped",
            RunEvent::RecordWriteFailed { .. } => "record_write_failed",
            RunEvent::Completed { .. } => "completed",
            RunEvent::Failed { .. } => "failed",
        }
    }
}

/// Trait for receiving run events (decoupled logging).
pub trait RunReporter: Send + Sync {
    fn report(&self, event: RunEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingRunReporter;

impl RunReporter for TracingRunReporter {
    fn report(&self, event: RunEvent<'_>) {
        match event {
            RunEvent::Started {
                job_id,
                run_id,
                job_name,
                url,
            } => {
                tracing::info!(%job_id, %run_id, %job_name, %url, "Run started");
            }
            RunEvent::RetryScheduled {
                job_id,
                run_id,
                attempt,
                max_attempts,
                delay,
                error,
            } => {
                tracing::warn!(
                    %job_id,
                    %run_id,
                    attempt,
                    max_attempts,
                    delay_ms = %delay.as_millis(),
                    %error,
                    "Scrape attempt failed, retrying"
                );
            }
            RunEvent::ItemWarning {
                job_id,
                page,
                index,
                reason,
                ..
            } => {
                tracing::warn!(%job_id, page, index, %reason, "Item skipped");
            }
            RunEvent::PageSkipped {
                job_id,
                page,
                url,
                error,
                ..
            } => {
                tracing::warn!(%job_id, page, %url, %error, "Page skipped");
            }
            RunEvent::RecordWriteFailed {
                job_id, url, error, ..
            } => {
                tracing::error!(%job_id, %url, %error, "Failed to save record");
            }
            RunEvent::Completed {
                job_id,
                run_id,
                items_scraped,
                duration_ms,
            } => {
                tracing::info!(%job_id, %run_id, items_scraped, duration_ms, "Run completed");
            }
            RunEvent::Failed {
                job_id,
                run_id,
                error,
                duration_ms,
            } => {
                tracing::error!(%job_id, %run_id, %error, duration_ms, "Run failed");
            }
        }
    }
}

/// What a finished successful run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub job_id: Uuid,
    pub items_scraped: u32,
    pub records_written: u32,
    pub record_failures: u32,
    pub warnings: usize,
    pub attempts: u32,
    pub duration_ms: u64,
}

/// Anything that can execute a job configuration once.
pub trait JobRunner: Send + Sync {
    fn run(
        &self,
        config: &ScrapeJobConfig,
    ) -> impl Future<Output = Result<RunSummary, AppError>> + Send;
}

/// Executor tuning.
#[derive(Clone)]
pub struct ExecutorConfig {
    pub retry: RetryPolicy,
    pub estimator: Arc<dyn NextRunEstimator>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            estimator: Arc::new(CronEstimator),
        }
    }
}

impl std::fmt::Debug for ExecutorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorConfig")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

/// Runs scrape jobs against injected stores and extractors.
pub struct Executor<J, R, S, EF, RR>
where
    J: JobStore,
    R: RunStore,
    S: RecordStore,
    EF: ExtractorFactory,
    RR: RunReporter,
{
    jobs: J,
    runs: R,
    writer: RecordWriter<S>,
    factory: EF,
    reporter: RR,
    config: ExecutorConfig,
}

impl<J, R, S, EF, RR> Executor<J, R, S, EF, RR>
where
    J: JobStore,
    R: RunStore,
    S: RecordStore,
    EF: ExtractorFactory,
    RR: RunReporter,
{
    pub fn new(
        jobs: J,
        runs: R,
        records: S,
        factory: EF,
        reporter: RR,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            jobs,
            runs,
            writer: RecordWriter::new(records),
            factory,
            reporter,
            config,
        }
    }

    /// Execute one run of `config`, returning the final error on failure.
    pub async fn execute(&self, config: &ScrapeJobConfig) -> Result<RunSummary, AppError> {
        let clock = tokio::time::Instant::now();
        let run = self.runs.start_run(config.id, Utc::now()).await?;

        self.reporter.report(RunEvent::Started {
            job_id: config.id,
            run_id: run.id,
            job_name: &config.name,
            url: &config.target_url,
        });

        let scraped = match self.factory.create(config) {
            Ok(extractor) => self.scrape_with_retry(&extractor, config, run.id).await,
            Err(e) => Err(e),
        };

        match scraped {
            Ok((output, attempts)) => {
                self.report_warnings(config.id, run.id, &output.warnings);

                let summary = self
                    .writer
                    .write_all(
                        config.id,
                        config.job_type.record_type(),
                        &output.records,
                        |raw, error| {
                            self.reporter.report(RunEvent::RecordWriteFailed {
                                job_id: config.id,
                                run_id: run.id,
                                url: &raw.url,
                                error,
                            })
                        },
                    )
                    .await;

                let items_scraped = u32::try_from(output.records.len()).unwrap_or(u32::MAX);
                let duration_ms = elapsed_ms(clock);
                let outcome = RunOutcome::Success {
                    items_scraped,
                    duration_ms,
                };
                if let Err(e) = self.runs.finish_run(run.id, &outcome, Utc::now()).await {
                    tracing::error!(run_id = %run.id, error = %e, "Failed to mark run as successful");
                    return Err(self.fail_run(config.id, run.id, e, duration_ms).await);
                }

                let now = Utc::now();
                let next_run_at = config
                    .schedule()
                    .and_then(|s| self.config.estimator.next_run(s, now));
                if let Err(e) = self.jobs.record_run(config.id, now, next_run_at).await {
                    tracing::warn!(job_id = %config.id, error = %e, "Failed to update job run timestamps");
                }

                self.reporter.report(RunEvent::Completed {
                    job_id: config.id,
                    run_id: run.id,
                    items_scraped,
                    duration_ms,
                });

                Ok(RunSummary {
                    run_id: run.id,
                    job_id: config.id,
                    items_scraped,
                    records_written: summary.written(),
                    record_failures: summary.failed,
                    warnings: output.warnings.len(),
                    attempts,
                    duration_ms,
                })
            }
            Err(error) => Err(self
                .fail_run(config.id, run.id, error, elapsed_ms(clock))
                .await),
        }
    }

    /// Close `run_id` as failed and report it, handing `error` back.
    async fn fail_run(
        &self,
        job_id: Uuid,
        run_id: Uuid,
        error: AppError,
        duration_ms: u64,
    ) -> AppError {
        let outcome = RunOutcome::Failed {
            error_message: error.to_string(),
            duration_ms,
        };
        if let Err(e) = self.runs.finish_run(run_id, &outcome, Utc::now()).await {
            tracing::error!(%run_id, error = %e, "Failed to mark run as failed");
        }

        self.reporter.report(RunEvent::Failed {
            job_id,
            run_id,
            error: &error,
            duration_ms,
        });
        error
    }

    async fn scrape_with_retry(
        &self,
        extractor: &EF::Extractor,
        config: &ScrapeJobConfig,
        run_id: Uuid,
    ) -> Result<(ScrapeOutput, u32), AppError> {
        let mut attempts = 0;
        let output = retry_with_backoff(
            &self.config.retry,
            AppError::is_retryable,
            |notice| {
                self.reporter.report(RunEvent::RetryScheduled {
                    job_id: config.id,
                    run_id,
                    attempt: notice.attempt,
                    max_attempts: notice.max_attempts,
                    delay: notice.delay,
                    error: notice.error,
                })
            },
            |attempt| {
                attempts = attempt;
                extractor.scrape(&config.target_url, &config.options)
            },
        )
        .await?;
        Ok((output, attempts))
    }

    fn report_warnings(&self, job_id: Uuid, run_id: Uuid, warnings: &[ExtractionWarning]) {
        for warning in warnings {
            let event = match warning {
                ExtractionWarning::ItemSkipped {
                    page,
                    index,
                    reason,
                } => RunEvent::ItemWarning {
                    job_id,
                    run_id,
                    page: *page,
                    index: *index,
                    reason,
                },
                ExtractionWarning::PageSkipped { page, url, error } => RunEvent::PageSkipped {
                    job_id,
                    run_id,
                    page: *page,
                    url,
                    error,
                },
            };
            self.reporter.report(event);
        }
    }
}

impl<J, R, S, EF, RR> JobRunner for Executor<J, R, S, EF, RR>
where
    J: JobStore,
    R: RunStore,
    S: RecordStore,
    EF: ExtractorFactory,
    RR: RunReporter,
{
    async fn run(&self, config: &ScrapeJobConfig) -> Result<RunSummary, AppError> {
        self.execute(config).await
    }
}

fn elapsed_ms(since: tokio::time::Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}

use std::time::Duration;

use trawl_core::error::AppError;
use trawl_core::executor::{Executor, ExecutorConfig, TracingRunReporter};
use trawl_core::extract::ScrapeOutput;
use trawl_core::models::{JobType, RawRecord, RunStatus};
use trawl_core::retry::RetryPolicy;
use trawl_core::testutil::MockExtractorFactory;
use trawl_core::traits::{JobStore, RunStore};
use trawl_db::Database;

use crate::integration::common::{seed_job, setup_test_db};

fn articles(n: usize) -> ScrapeOutput {
    ScrapeOutput {
        records: (0..n)
            .map(|i| RawRecord {
                title: format!("Story {i}"),
                url: format!("https://techcrunch.com/2026/03/0{i}/story-{i}/"),
                ..Default::default()
            })
            .collect(),
        warnings: vec![],
    }
}

fn executor(
    db: &Database,
    factory: MockExtractorFactory,
) -> Executor<
    trawl_db::JobConfigRepository,
    trawl_db::RunRepository,
    trawl_db::RecordRepository,
    MockExtractorFactory,
    TracingRunReporter,
> {
    Executor::new(
        db.job_repo(),
        db.run_repo(),
        db.record_repo(),
        factory,
        TracingRunReporter,
        ExecutorConfig {
            retry: RetryPolicy::new(3, Duration::from_millis(1)),
            ..Default::default()
        },
    )
}

#[tokio::test]
async fn retried_run_persists_once() {
    let (db, _container) = setup_test_db().await;
    let job = seed_job(&db, JobType::News, "https://techcrunch.com").await;
    let factory = MockExtractorFactory::with_outputs(vec![
        Err(AppError::Timeout(30)),
        Err(AppError::NetworkError("reset".into())),
        Ok(articles(3)),
    ]);

    let summary = executor(&db, factory).execute(&job).await.unwrap();
    assert_eq!(summary.attempts, 3);
    assert_eq!(summary.records_written, 3);

    let runs = db.run_repo().list_runs(job.id, None, 10).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Success);
    assert_eq!(runs[0].items_scraped, 3);
    assert_eq!(db.record_repo().count_for_job(job.id).await.unwrap(), 3);

    let reloaded = db.job_repo().get_job(job.id).await.unwrap().unwrap();
    assert!(reloaded.last_run_at.is_some());
    assert!(reloaded.next_run_at.is_some());
}

#[tokio::test]
async fn second_run_updates_existing_records() {
    let (db, _container) = setup_test_db().await;
    let job = seed_job(&db, JobType::News, "https://techcrunch.com").await;
    let factory = MockExtractorFactory::with_outputs(vec![Ok(articles(2)), Ok(articles(2))]);
    let executor = executor(&db, factory);

    executor.execute(&job).await.unwrap();
    executor.execute(&job).await.unwrap();

    assert_eq!(db.record_repo().count_for_job(job.id).await.unwrap(), 2);
    assert_eq!(db.run_repo().list_runs(job.id, None, 10).await.unwrap().len(), 2);
}

#[tokio::test]
async fn exhausted_retries_record_failed_run() {
    let (db, _container) = setup_test_db().await;
    let job = seed_job(&db, JobType::News, "https://techcrunch.com").await;
    let factory = MockExtractorFactory::with_outputs(vec![
        Err(AppError::Timeout(30)),
        Err(AppError::Timeout(30)),
        Err(AppError::Timeout(30)),
    ]);

    let err = executor(&db, factory).execute(&job).await.unwrap_err();
    assert!(matches!(err, AppError::Timeout(30)));

    let runs = db
        .run_repo()
        .list_runs(job.id, Some(RunStatus::Failed), 10)
        .await
        .unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].error_message.as_deref(), Some("Request timed out after 30 seconds"));
    assert!(db.job_repo().get_job(job.id).await.unwrap().unwrap().last_run_at.is_none());
}

use chrono::{TimeDelta, Utc};
use trawl_core::error::AppError;
use trawl_core::models::{JobOptions, JobType, NewScrapeJob};
use trawl_core::traits::JobStore;
use uuid::Uuid;

use crate::integration::common::{seed_job, setup_test_db};

#[tokio::test]
async fn create_and_get_job_round_trips_options() {
    let (db, _container) = setup_test_db().await;
    let repo = db.job_repo();

    let options = JobOptions {
        max_pages: Some(5),
        min_delay_ms: Some(100),
        max_delay_ms: Some(200),
        ..Default::default()
    };
    let created = repo
        .create_job(
            &NewScrapeJob::new("laptops", JobType::Ecommerce, "https://www.tokopedia.com/search?q=laptop")
                .with_schedule("*/30 * * * *")
                .with_options(options.clone()),
        )
        .await
        .unwrap();

    let loaded = repo.get_job(created.id).await.unwrap().expect("job exists");
    assert_eq!(loaded.name, "laptops");
    assert_eq!(loaded.job_type, JobType::Ecommerce);
    assert_eq!(loaded.schedule(), Some("*/30 * * * *"));
    assert_eq!(loaded.options, options);
    assert!(loaded.last_run_at.is_none());
}

#[tokio::test]
async fn create_job_rejects_bad_schedule() {
    let (db, _container) = setup_test_db().await;
    let err = db
        .job_repo()
        .create_job(&NewScrapeJob::new("x", JobType::News, "https://techcrunch.com").with_schedule("daily"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidSchedule { .. }));
}

#[tokio::test]
async fn missing_job_is_none() {
    let (db, _container) = setup_test_db().await;
    assert!(db.job_repo().get_job(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn list_active_jobs_excludes_inactive() {
    let (db, _container) = setup_test_db().await;
    let repo = db.job_repo();
    let active = seed_job(&db, JobType::News, "https://techcrunch.com").await;
    let inactive = seed_job(&db, JobType::Jobs, "https://glints.com/id/opportunities/jobs/explore").await;
    assert!(repo.set_active(inactive.id, false).await.unwrap());

    let jobs = repo.list_active_jobs().await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].id, active.id);
    assert_eq!(repo.list_jobs().await.unwrap().len(), 2);
}

#[tokio::test]
async fn record_run_updates_timestamps() {
    let (db, _container) = setup_test_db().await;
    let repo = db.job_repo();
    let job = seed_job(&db, JobType::News, "https://techcrunch.com").await;

    let last = Utc::now();
    let next = last + TimeDelta::hours(1);
    repo.record_run(job.id, last, Some(next)).await.unwrap();

    let loaded = repo.get_job(job.id).await.unwrap().unwrap();
    let stored_last = loaded.last_run_at.unwrap();
    assert!((stored_last - last).num_milliseconds().abs() < 1);
    assert!(loaded.next_run_at.unwrap() > stored_last);
}

#[tokio::test]
async fn record_run_for_missing_job_is_not_found() {
    let (db, _container) = setup_test_db().await;
    let err = db
        .job_repo()
        .record_run(Uuid::new_v4(), Utc::now(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

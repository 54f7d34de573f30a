use chrono::{SubsecRound, TimeDelta, Utc};
use trawl_core::error::AppError;
use trawl_core::models::{JobType, RunOutcome, RunStatus};
use trawl_core::traits::RunStore;
use uuid::Uuid;

use crate::integration::common::{seed_job, setup_test_db};

#[tokio::test]
async fn start_then_finish_success() {
    let (db, _container) = setup_test_db().await;
    let repo = db.run_repo();
    let job = seed_job(&db, JobType::News, "https://techcrunch.com").await;

    let run = repo.start_run(job.id, Utc::now()).await.unwrap();
    assert_eq!(run.status, RunStatus::Running);
    assert_eq!(repo.list_running().await.unwrap().len(), 1);

    let finished = repo
        .finish_run(
            run.id,
            &RunOutcome::Success {
                items_scraped: 12,
                duration_ms: 3400,
            },
            Utc::now(),
        )
        .await
        .unwrap();

    assert_eq!(finished.status, RunStatus::Success);
    assert_eq!(finished.items_scraped, 12);
    assert_eq!(finished.duration_ms, Some(3400));
    assert!(finished.completed_at.is_some());
    assert!(finished.error_message.is_none());
    assert!(repo.list_running().await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_run_keeps_error_message() {
    let (db, _container) = setup_test_db().await;
    let repo = db.run_repo();
    let job = seed_job(&db, JobType::News, "https://techcrunch.com").await;
    let run = repo.start_run(job.id, Utc::now()).await.unwrap();

    let finished = repo
        .finish_run(
            run.id,
            &RunOutcome::Failed {
                error_message: "HTTP 503 for https://techcrunch.com".into(),
                duration_ms: 10,
            },
            Utc::now(),
        )
        .await
        .unwrap();

    assert_eq!(finished.status, RunStatus::Failed);
    assert_eq!(finished.items_scraped, 0);
    assert_eq!(
        finished.error_message.as_deref(),
        Some("HTTP 503 for https://techcrunch.com")
    );
}

#[tokio::test]
async fn terminal_run_cannot_transition_again() {
    let (db, _container) = setup_test_db().await;
    let repo = db.run_repo();
    let job = seed_job(&db, JobType::News, "https://techcrunch.com").await;
    let run = repo.start_run(job.id, Utc::now()).await.unwrap();
    let success = RunOutcome::Success {
        items_scraped: 1,
        duration_ms: 1,
    };
    repo.finish_run(run.id, &success, Utc::now()).await.unwrap();

    let err = repo
        .finish_run(
            run.id,
            &RunOutcome::Failed {
                error_message: "late".into(),
                duration_ms: 2,
            },
            Utc::now(),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AppError::InvalidRunTransition {
            from: RunStatus::Success,
            to: RunStatus::Failed,
            ..
        }
    ));
    let stored = repo.get_run(run.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Success);
    assert!(stored.error_message.is_none());
}

#[tokio::test]
async fn finishing_unknown_run_is_not_found() {
    let (db, _container) = setup_test_db().await;
    let err = db
        .run_repo()
        .finish_run(
            Uuid::new_v4(),
            &RunOutcome::Success {
                items_scraped: 0,
                duration_ms: 0,
            },
            Utc::now(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn list_runs_filters_and_orders_newest_first() {
    let (db, _container) = setup_test_db().await;
    let repo = db.run_repo();
    let job = seed_job(&db, JobType::News, "https://techcrunch.com").await;
    let now = Utc::now();

    let older = repo.start_run(job.id, now - TimeDelta::hours(2)).await.unwrap();
    let newer = repo.start_run(job.id, now - TimeDelta::hours(1)).await.unwrap();
    repo.finish_run(
        older.id,
        &RunOutcome::Failed {
            error_message: "boom".into(),
            duration_ms: 1,
        },
        now,
    )
    .await
    .unwrap();

    let all = repo.list_runs(job.id, None, 10).await.unwrap();
    assert_eq!(all.iter().map(|r| r.id).collect::<Vec<_>>(), vec![newer.id, older.id]);

    let failed = repo.list_runs(job.id, Some(RunStatus::Failed), 10).await.unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].id, older.id);

    assert_eq!(repo.list_runs(job.id, None, 1).await.unwrap().len(), 1);
}

#[tokio::test]
async fn delete_runs_before_keeps_cutoff_instant() {
    let (db, _container) = setup_test_db().await;
    let repo = db.run_repo();
    let job = seed_job(&db, JobType::News, "https://techcrunch.com").await;
    let cutoff = (Utc::now() - TimeDelta::days(30)).trunc_subsecs(6);

    repo.start_run(job.id, cutoff).await.unwrap();
    repo.start_run(job.id, cutoff - TimeDelta::seconds(1)).await.unwrap();

    assert_eq!(repo.delete_runs_before(cutoff).await.unwrap(), 1);
    assert_eq!(repo.list_runs(job.id, None, 10).await.unwrap().len(), 1);
}

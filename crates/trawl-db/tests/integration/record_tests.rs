use chrono::{SubsecRound, TimeDelta, Utc};
use trawl_core::models::{JobType, NewRecord, RecordType, UpsertOutcome};
use trawl_core::traits::{RecordFilter, RecordStore};
use uuid::Uuid;

use crate::integration::common::{seed_job, setup_test_db};

fn product(job_id: Uuid, external_id: Option<&str>, title: &str, price: f64) -> NewRecord {
    NewRecord {
        job_id,
        record_type: RecordType::Product,
        external_id: external_id.map(String::from),
        title: title.to_string(),
        description: None,
        price: Some(price),
        currency: Some("IDR".into()),
        source_url: "https://www.tokopedia.com/acme/laptop-pro-14".into(),
        image_url: None,
        metadata: serde_json::json!({ "source": "tokopedia" }),
        captured_at: Utc::now(),
    }
}

#[tokio::test]
async fn repeat_upsert_updates_in_place() {
    let (db, _container) = setup_test_db().await;
    let repo = db.record_repo();
    let job = seed_job(&db, JobType::Ecommerce, "https://www.tokopedia.com/search?q=laptop").await;

    let first = repo
        .upsert_record(&product(job.id, Some("laptop-pro-14"), "Laptop Pro 14", 15_000_000.0))
        .await
        .unwrap();
    let mut again = product(job.id, Some("laptop-pro-14"), "Laptop Pro 14 (2026)", 14_500_000.0);
    again.captured_at = Utc::now() + TimeDelta::seconds(5);
    let second = repo.upsert_record(&again).await.unwrap();

    assert!(matches!(first, UpsertOutcome::Inserted(_)));
    assert!(matches!(second, UpsertOutcome::Updated(_)));
    assert_eq!(first.id(), second.id());
    assert_eq!(repo.count_for_job(job.id).await.unwrap(), 1);

    let stored = repo
        .list_records(&RecordFilter {
            job_id: Some(job.id),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(stored[0].title, "Laptop Pro 14 (2026)");
    assert_eq!(stored[0].price, Some(14_500_000.0));
    assert!(stored[0].captured_at > stored[0].created_at);
}

#[tokio::test]
async fn records_without_external_id_are_not_deduplicated() {
    let (db, _container) = setup_test_db().await;
    let repo = db.record_repo();
    let job = seed_job(&db, JobType::Ecommerce, "https://www.tokopedia.com/search?q=laptop").await;

    repo.upsert_record(&product(job.id, None, "a", 1.0)).await.unwrap();
    repo.upsert_record(&product(job.id, None, "a", 1.0)).await.unwrap();

    assert_eq!(repo.count_for_job(job.id).await.unwrap(), 2);
}

#[tokio::test]
async fn same_external_id_under_two_jobs_is_two_rows() {
    let (db, _container) = setup_test_db().await;
    let repo = db.record_repo();
    let a = seed_job(&db, JobType::Ecommerce, "https://www.tokopedia.com/search?q=a").await;
    let b = seed_job(&db, JobType::Ecommerce, "https://www.tokopedia.com/search?q=b").await;

    repo.upsert_record(&product(a.id, Some("x"), "x", 1.0)).await.unwrap();
    repo.upsert_record(&product(b.id, Some("x"), "x", 1.0)).await.unwrap();

    let all = repo.list_records(&RecordFilter::default()).await.unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn list_records_filters_by_type() {
    let (db, _container) = setup_test_db().await;
    let repo = db.record_repo();
    let job = seed_job(&db, JobType::News, "https://techcrunch.com").await;

    let mut article = product(job.id, Some("tc-1"), "story", 0.0);
    article.record_type = RecordType::Article;
    article.price = None;
    repo.upsert_record(&article).await.unwrap();
    repo.upsert_record(&product(job.id, Some("p-1"), "thing", 1.0)).await.unwrap();

    let articles = repo
        .list_records(&RecordFilter {
            record_type: Some(RecordType::Article),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(articles.len(), 1);
    assert_eq!(articles[0].title, "story");
    assert_eq!(articles[0].metadata["source"], "tokopedia");
}

#[tokio::test]
async fn delete_records_before_keeps_cutoff_instant() {
    let (db, _container) = setup_test_db().await;
    let repo = db.record_repo();
    let job = seed_job(&db, JobType::Ecommerce, "https://www.tokopedia.com/search?q=laptop").await;
    let cutoff = (Utc::now() - TimeDelta::days(90)).trunc_subsecs(6);

    let mut at_cutoff = product(job.id, Some("keep"), "keep", 1.0);
    at_cutoff.captured_at = cutoff;
    let mut older = product(job.id, Some("drop"), "drop", 1.0);
    older.captured_at = cutoff - TimeDelta::milliseconds(1);
    repo.upsert_record(&at_cutoff).await.unwrap();
    repo.upsert_record(&older).await.unwrap();

    assert_eq!(repo.delete_records_before(cutoff).await.unwrap(), 1);
    let left = repo.list_records(&RecordFilter::default()).await.unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].title, "keep");
}

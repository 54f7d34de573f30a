use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use chrono::Utc;
use http_body_util::BodyExt;
use tower::ServiceExt;
use uuid::Uuid;

use trawl_core::models::{NewRecord, RecordType, RunOutcome};
use trawl_core::traits::{RecordStore, RunStore};

use crate::integration::common::{news_job, seed_job, setup_gated_app, setup_test_app};

async fn json_body(response: Response) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

fn post(uri: String) -> Request<Body> {
    Request::post(uri).body(Body::empty()).unwrap()
}

fn get(uri: String) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn record(job_id: Uuid, record_type: RecordType, external_id: &str) -> NewRecord {
    NewRecord {
        job_id,
        record_type,
        external_id: Some(external_id.to_string()),
        title: format!("item {external_id}"),
        description: None,
        price: None,
        currency: None,
        source_url: format!("https://example.com/{external_id}"),
        image_url: None,
        metadata: serde_json::json!({}),
        captured_at: Utc::now(),
    }
}

#[tokio::test]
async fn health_returns_200() {
    let app = setup_test_app().await;

    let response = app.router.oneshot(get("/health".into())).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["database"], "ok");
    assert_eq!(json["timers"], 0);
}

#[tokio::test]
async fn trigger_missing_job_returns_404() {
    let app = setup_test_app().await;

    let response = app
        .router
        .oneshot(post(format!("/v1/jobs/{}/run", Uuid::new_v4())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"], "not_found");
    assert!(app.runner.calls().is_empty());
}

#[tokio::test]
async fn trigger_inactive_job_returns_400() {
    let app = setup_test_app().await;
    let job = seed_job(&app.db, news_job().inactive()).await;

    let response = app
        .router
        .oneshot(post(format!("/v1/jobs/{}/run", job.id)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "validation_error");
    assert!(app.runner.calls().is_empty());
}

#[tokio::test]
async fn trigger_active_job_returns_202_and_runs_in_background() {
    let app = setup_test_app().await;
    let job = seed_job(&app.db, news_job()).await;

    let response = app
        .router
        .oneshot(post(format!("/v1/jobs/{}/run", job.id)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = json_body(response).await;
    assert_eq!(json["status"], "started");
    assert_eq!(json["job_id"], job.id.to_string());

    for _ in 0..50 {
        if app.runner.completed() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(app.runner.calls(), vec![job.id]);
    assert_eq!(app.runner.completed(), 1);
}

#[tokio::test]
async fn trigger_while_running_returns_409() {
    let app = setup_gated_app().await;
    let job = seed_job(&app.db, news_job()).await;

    let first = app
        .router
        .clone()
        .oneshot(post(format!("/v1/jobs/{}/run", job.id)))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::ACCEPTED);
    assert!(app.scheduler.is_running(job.id));

    let second = app
        .router
        .clone()
        .oneshot(post(format!("/v1/jobs/{}/run", job.id)))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(second).await["error"], "conflict");

    app.runner.release(1);
    assert!(app.scheduler.shutdown_timeout(Duration::from_secs(5)).await);
    assert_eq!(app.runner.completed(), 1);
}

#[tokio::test]
async fn reschedule_follows_stored_configuration() {
    let app = setup_test_app().await;
    let job = seed_job(&app.db, news_job()).await;

    let response = app
        .router
        .clone()
        .oneshot(post(format!("/v1/jobs/{}/reschedule", job.id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .router
        .clone()
        .oneshot(get("/v1/scheduler".into()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["total"], 1);
    assert_eq!(json["overlap_policy"], "skip");
    assert_eq!(json["timers"][0]["job_id"], job.id.to_string());
    assert_eq!(json["timers"][0]["schedule"], "0 */6 * * *");
    assert!(json["timers"][0]["next_fire_at"].is_string());

    // Deactivating and rescheduling removes the timer.
    assert!(app.db.job_repo().set_active(job.id, false).await.unwrap());
    let response = app
        .router
        .clone()
        .oneshot(post(format!("/v1/jobs/{}/reschedule", job.id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(!app.scheduler.is_scheduled(job.id));

    let json = json_body(
        app.router
            .oneshot(get("/v1/scheduler".into()))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(json["total"], 0);
}

#[tokio::test]
async fn reschedule_missing_job_returns_404() {
    let app = setup_test_app().await;

    let response = app
        .router
        .oneshot(post(format!("/v1/jobs/{}/reschedule", Uuid::new_v4())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn list_runs_filters_by_status() {
    let app = setup_test_app().await;
    let job = seed_job(&app.db, news_job()).await;
    let runs = app.db.run_repo();

    let ok = runs.start_run(job.id, Utc::now()).await.unwrap();
    runs.finish_run(
        ok.id,
        &RunOutcome::Success {
            items_scraped: 12,
            duration_ms: 900,
        },
        Utc::now(),
    )
    .await
    .unwrap();
    let bad = runs.start_run(job.id, Utc::now()).await.unwrap();
    runs.finish_run(
        bad.id,
        &RunOutcome::Failed {
            error_message: "HTTP 503 for https://techcrunch.com/".into(),
            duration_ms: 400,
        },
        Utc::now(),
    )
    .await
    .unwrap();

    let response = app
        .router
        .clone()
        .oneshot(get(format!("/v1/jobs/{}/runs", job.id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["total"], 2);

    let response = app
        .router
        .clone()
        .oneshot(get(format!("/v1/jobs/{}/runs?status=failed", job.id)))
        .await
        .unwrap();
    let json = json_body(response).await;
    assert_eq!(json["total"], 1);
    assert_eq!(json["runs"][0]["id"], bad.id.to_string());
    assert_eq!(json["runs"][0]["status"], "failed");
    assert_eq!(
        json["runs"][0]["error_message"],
        "HTTP 503 for https://techcrunch.com/"
    );

    let response = app
        .router
        .oneshot(get(format!("/v1/jobs/{}/runs?status=cancelled", job.id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn list_runs_for_missing_job_returns_404() {
    let app = setup_test_app().await;

    let response = app
        .router
        .oneshot(get(format!("/v1/jobs/{}/runs", Uuid::new_v4())))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn list_records_filters_by_job_and_type() {
    let app = setup_test_app().await;
    let news = seed_job(&app.db, news_job()).await;
    let other = seed_job(&app.db, news_job()).await;
    let records = app.db.record_repo();

    records
        .upsert_record(&record(news.id, RecordType::Article, "a-1"))
        .await
        .unwrap();
    records
        .upsert_record(&record(news.id, RecordType::Article, "a-2"))
        .await
        .unwrap();
    records
        .upsert_record(&record(other.id, RecordType::Article, "b-1"))
        .await
        .unwrap();

    let response = app
        .router
        .clone()
        .oneshot(get(format!(
            "/v1/records?job_id={}&record_type=article",
            news.id
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["total"], 2);
    assert!(
        json["records"]
            .as_array()
            .unwrap()
            .iter()
            .all(|r| r["job_id"] == news.id.to_string())
    );

    let response = app
        .router
        .clone()
        .oneshot(get("/v1/records?record_type=product".into()))
        .await
        .unwrap();
    assert_eq!(json_body(response).await["total"], 0);

    let response = app
        .router
        .oneshot(get("/v1/records?record_type=weather".into()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

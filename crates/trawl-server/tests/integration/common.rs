use std::sync::Arc;

use axum::Router;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use testcontainers::core::{ContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};

use trawl_core::models::{JobType, NewScrapeJob, ScrapeJobConfig};
use trawl_core::testutil::MockRunner;
use trawl_core::{Scheduler, SchedulerConfig};
use trawl_db::{Database, JobConfigRepository};
use trawl_server::routes;
use trawl_server::state::AppState;

pub struct TestApp {
    pub router: Router,
    pub db: Database,
    pub scheduler: Scheduler<MockRunner, JobConfigRepository>,
    pub runner: MockRunner,
    _container: ContainerAsync<GenericImage>,
}

/// Spin up PostgreSQL and return the app wired to a scheduler with a mock runner.
pub async fn setup_test_app() -> TestApp {
    setup_with_runner(MockRunner::new()).await
}

/// Like [`setup_test_app`], but every run blocks until `app.runner.release(n)`.
pub async fn setup_gated_app() -> TestApp {
    setup_with_runner(MockRunner::gated()).await
}

async fn setup_with_runner(runner: MockRunner) -> TestApp {
    let container = GenericImage::new("postgres", "16")
        .with_exposed_port(ContainerPort::Tcp(5432))
        .with_wait_for(WaitFor::message_on_stderr(
            "database system is ready to accept connections",
        ))
        .with_env_var("POSTGRES_PASSWORD", "postgres")
        .with_env_var("POSTGRES_DB", "trawl_test")
        .start()
        .await
        .expect("Failed to start PostgreSQL container");

    let host = container.get_host().await.expect("Failed to get host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("Failed to get port");

    let url = format!("postgresql://postgres:postgres@{host}:{port}/trawl_test");

    let pool = retry_connect(&url).await;
    let db = Database::from_pool(pool);
    db.migrate().await.expect("Failed to run migrations");

    let scheduler = Scheduler::new(runner.clone(), db.job_repo(), SchedulerConfig::default());
    let state = Arc::new(AppState {
        db: db.clone(),
        scheduler: Arc::new(scheduler.clone()),
    });

    TestApp {
        router: routes::router(state),
        db,
        scheduler,
        runner,
        _container: container,
    }
}

async fn retry_connect(url: &str) -> PgPool {
    for _ in 0..30 {
        if let Ok(pool) = PgPoolOptions::new().max_connections(5).connect(url).await {
            return pool;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
    panic!("Failed to connect to test database");
}

pub async fn seed_job(db: &Database, job: NewScrapeJob) -> ScrapeJobConfig {
    db.job_repo()
        .create_job(&job)
        .await
        .expect("Failed to seed job")
}

pub fn news_job() -> NewScrapeJob {
    NewScrapeJob::new("techcrunch", JobType::News, "https://techcrunch.com/category/startups/")
        .with_schedule("0 */6 * * *")
}

use sqlx::postgres::PgPoolOptions;
use testcontainers::core::{ContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};
use trawl_core::models::{JobType, NewScrapeJob, ScrapeJobConfig};
use trawl_db::Database;

/// Spins up PostgreSQL, applies the migrations, and returns the facade.
///
/// Keep the container in scope for the whole test; dropping it stops
/// the database.
pub async fn setup_test_db() -> (Database, ContainerAsync<GenericImage>) {
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

    let mut attempts = 0;
    let pool = loop {
        match PgPoolOptions::new().max_connections(5).connect(&url).await {
            Ok(pool) => break pool,
            Err(e) => {
                attempts += 1;
                if attempts >= 30 {
                    panic!("Failed to connect to database after {attempts} attempts: {e}");
                }
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
        }
    };

    let db = Database::from_pool(pool);
    db.migrate().await.expect("Failed to run migrations");
    (db, container)
}

pub async fn seed_job(db: &Database, job_type: JobType, url: &str) -> ScrapeJobConfig {
    db.job_repo()
        .create_job(&NewScrapeJob::new("seeded", job_type, url).with_schedule("0 * * * *"))
        .await
        .expect("Failed to seed job")
}

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use trawl_client::{ReqwestFetcher, default_renderer};
use trawl_core::{
    EngineConfig, Executor, ExtractorRegistry, RetentionSweeper, Scheduler, SourceFactory,
    TracingRunReporter,
};
use trawl_db::{Database, DatabaseConfig};
use trawl_server::routes;
use trawl_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("trawl=info".parse()?))
        .with_target(false)
        .init();

    let engine = EngineConfig::from_env()?;
    let addr = format!("0.0.0.0:{}", engine.server_port);
    let db = Database::connect(&DatabaseConfig::from_env()?).await?;
    db.migrate().await?;

    let fetcher = ReqwestFetcher::with_timeout(engine.http_timeout)?;
    let renderer = default_renderer(&fetcher, engine.browser_timeout).await?;
    let factory = SourceFactory::new(
        ExtractorRegistry::builtin(),
        fetcher,
        renderer,
        engine.page_delay,
    );
    let executor = Executor::new(
        db.job_repo(),
        db.run_repo(),
        db.record_repo(),
        factory,
        TracingRunReporter,
        engine.executor_config(),
    );

    let scheduler = Scheduler::new(executor, db.job_repo(), engine.scheduler_config());
    let registered = scheduler.start().await?;
    tracing::info!(timers = registered, "Scheduler started");

    let cancel = CancellationToken::new();
    let sweeper = RetentionSweeper::new(db.run_repo(), db.record_repo(), engine.retention)?;
    let sweeper_task = tokio::spawn({
        let cancel = cancel.clone();
        async move { sweeper.run(cancel).await }
    });

    let state = Arc::new(AppState {
        db,
        scheduler: Arc::new(scheduler.clone()),
    });

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    tracing::info!("Starting server on {addr}");
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cancel.cancel();
    if !scheduler.shutdown_timeout(engine.shutdown_grace).await {
        tracing::warn!("Some runs were abandoned and stay marked running");
    }
    if let Err(e) = sweeper_task.await {
        tracing::error!(error = %e, "Retention sweeper task failed");
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use trawl_client::{DefaultRenderer, ReqwestFetcher, default_renderer};
use trawl_core::models::{JobOptions, NewScrapeJob, ScrapeJobConfig};
use trawl_core::schedule::CronSchedule;
use trawl_core::traits::{Extractor, ExtractorFactory, JobStore, RecordFilter, RecordStore, RunStore};
use trawl_core::{
    EngineConfig, Executor, ExtractorRegistry, JobType, RecordType, RetentionSweeper, RunStatus,
    Scheduler, ScrapedRecord, SourceFactory, TracingRunReporter,
};
use trawl_db::{Database, DatabaseConfig, JobConfigRepository, RecordRepository, RunRepository};

type Factory = SourceFactory<ReqwestFetcher, DefaultRenderer>;
type AppExecutor =
    Executor<JobConfigRepository, RunRepository, RecordRepository, Factory, TracingRunReporter>;

#[derive(Parser)]
#[command(name = "trawl", version, about = "Scheduled web scraping engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute one run of a stored job now and wait for it
    Run {
        /// Job configuration ID
        job_id: Uuid,
    },

    /// Scrape a URL and print the records without touching the database
    Scrape {
        /// Job type selecting the extractor family
        #[arg(short = 't', long = "type")]
        job_type: JobType,

        /// Listing or search URL
        #[arg(short, long)]
        url: String,

        /// Page limit (extractor default if omitted)
        #[arg(long)]
        max_pages: Option<u32>,

        /// Item limit for extractors that support one
        #[arg(long)]
        max_items: Option<usize>,
    },

    /// Schedule every active job and run until Ctrl+C
    Daemon {
        /// Seconds to wait for in-flight runs on shutdown (falls back to TRAWL_SHUTDOWN_GRACE_SECS)
        #[arg(long)]
        grace_secs: Option<u64>,

        /// Skip the periodic retention sweep
        #[arg(long, default_value_t = false)]
        no_sweep: bool,
    },

    /// Delete records and runs older than the retention windows
    Sweep,

    /// Show run history for a job
    History {
        /// Job configuration ID
        job_id: Uuid,

        /// Only runs with this status (running, success, failed)
        #[arg(short, long)]
        status: Option<RunStatus>,

        /// Number of runs to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Print the next fire times of a cron expression
    Schedule {
        /// Five-field cron expression, e.g. "0 */6 * * *"
        expression: String,

        /// How many fire times to print
        #[arg(short, long, default_value_t = 5)]
        count: usize,
    },

    /// Export scraped records
    Records {
        /// Only records of this job
        #[arg(short, long)]
        job_id: Option<Uuid>,

        /// Only records of this type (product, job, article)
        #[arg(short = 't', long = "type")]
        record_type: Option<RecordType>,

        /// Maximum number of records
        #[arg(short, long, default_value_t = 100)]
        limit: usize,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },

    /// Manage job configurations
    Jobs {
        #[command(subcommand)]
        action: JobsCommand,
    },
}

#[derive(Subcommand)]
enum JobsCommand {
    /// Create a job configuration
    Add {
        /// Display name
        #[arg(short, long)]
        name: String,

        /// Job type (ecommerce, jobs, news)
        #[arg(short = 't', long = "type")]
        job_type: JobType,

        /// Listing or search URL
        #[arg(short, long)]
        url: String,

        /// Five-field cron expression
        #[arg(short, long)]
        schedule: Option<String>,

        #[arg(long)]
        max_pages: Option<u32>,

        #[arg(long)]
        max_items: Option<usize>,

        /// Create the job paused
        #[arg(long, default_value_t = false)]
        inactive: bool,
    },

    /// List all job configurations
    List,

    /// Stop scheduling a job
    Pause { job_id: Uuid },

    /// Resume scheduling a job
    Resume { job_id: Uuid },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Csv,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("trawl=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { job_id } => {
            let engine = load_engine_config()?;
            let db = connect_db().await?;
            cmd_run(job_id, &db, &engine).await?;
        }
        Commands::Scrape {
            job_type,
            url,
            max_pages,
            max_items,
        } => {
            let engine = load_engine_config()?;
            let options = JobOptions {
                max_pages,
                max_items,
                ..JobOptions::default()
            };
            cmd_scrape(job_type, &url, options, &engine).await?;
        }
        Commands::Daemon {
            grace_secs,
            no_sweep,
        } => {
            let engine = load_engine_config()?;
            let db = connect_db().await?;
            let grace = grace_secs.map_or(engine.shutdown_grace, Duration::from_secs);
            cmd_daemon(&db, &engine, grace, !no_sweep).await?;
        }
        Commands::Sweep => {
            let engine = load_engine_config()?;
            let db = connect_db().await?;
            cmd_sweep(&db, &engine).await?;
        }
        Commands::History {
            job_id,
            status,
            limit,
        } => {
            let db = connect_db().await?;
            cmd_history(job_id, status, limit, &db).await?;
        }
        Commands::Schedule { expression, count } => {
            cmd_schedule(&expression, count)?;
        }
        Commands::Records {
            job_id,
            record_type,
            limit,
            format,
        } => {
            let db = connect_db().await?;
            let filter = RecordFilter {
                job_id,
                record_type,
                limit,
            };
            cmd_records(&filter, format, &db).await?;
        }
        Commands::Jobs { action } => {
            let db = connect_db().await?;
            cmd_jobs(action, &db).await?;
        }
    }

    Ok(())
}

fn load_engine_config() -> Result<EngineConfig> {
    EngineConfig::from_env().map_err(|e| anyhow::anyhow!(e))
}

/// Connect to PostgreSQL using DATABASE_URL and apply migrations.
async fn connect_db() -> Result<Database> {
    let config = DatabaseConfig::from_env()
        .map_err(|e| anyhow::anyhow!(e))
        .context("Database configuration missing or invalid. DATABASE_URL is required for this command.")?;

    let db = Database::connect(&config)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
    db.migrate().await.map_err(|e| anyhow::anyhow!(e))?;

    Ok(db)
}

async fn build_factory(engine: &EngineConfig) -> Result<Factory> {
    let fetcher =
        ReqwestFetcher::with_timeout(engine.http_timeout).context("Failed to create HTTP client")?;
    let renderer = default_renderer(&fetcher, engine.browser_timeout)
        .await
        .context("Failed to start page renderer")?;

    Ok(SourceFactory::new(
        ExtractorRegistry::builtin(),
        fetcher,
        renderer,
        engine.page_delay,
    ))
}

async fn build_executor(db: &Database, engine: &EngineConfig) -> Result<AppExecutor> {
    let factory = build_factory(engine).await?;
    Ok(Executor::new(
        db.job_repo(),
        db.run_repo(),
        db.record_repo(),
        factory,
        TracingRunReporter,
        engine.executor_config(),
    ))
}

async fn cmd_run(job_id: Uuid, db: &Database, engine: &EngineConfig) -> Result<()> {
    let config = db
        .job_repo()
        .get_job(job_id)
        .await
        .map_err(|e| anyhow::anyhow!(e))?
        .with_context(|| format!("Job {job_id} not found"))?;

    if !config.is_active {
        anyhow::bail!("Job {} ({}) is inactive", config.id, config.name);
    }

    let executor = build_executor(db, engine).await?;
    let summary = executor
        .execute(&config)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    println!("Run {} finished for \"{}\"", summary.run_id, config.name);
    println!("  items scraped:   {}", summary.items_scraped);
    println!(
        "  records written: {} ({} failed)",
        summary.records_written, summary.record_failures
    );
    println!("  warnings:        {}", summary.warnings);
    println!("  attempts:        {}", summary.attempts);
    println!("  duration:        {} ms", summary.duration_ms);

    Ok(())
}

async fn cmd_scrape(
    job_type: JobType,
    url: &str,
    options: JobOptions,
    engine: &EngineConfig,
) -> Result<()> {
    let factory = build_factory(engine).await?;
    let now = Utc::now();
    let config = ScrapeJobConfig {
        id: Uuid::new_v4(),
        name: "ad-hoc".into(),
        job_type,
        target_url: url.to_string(),
        schedule: None,
        is_active: true,
        options,
        last_run_at: None,
        next_run_at: None,
        created_at: now,
        updated_at: now,
    };

    let extractor = factory.create(&config).map_err(|e| anyhow::anyhow!(e))?;

    tracing::info!(%url, %job_type, "Scraping");
    let output = extractor
        .scrape(url, &config.options)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    for warning in &output.warnings {
        tracing::warn!(%warning, "Extraction warning");
    }
    tracing::info!(
        records = output.records.len(),
        warnings = output.warnings.len(),
        "Scrape complete"
    );

    println!("{}", serde_json::to_string_pretty(&output.records)?);
    Ok(())
}

async fn cmd_daemon(
    db: &Database,
    engine: &EngineConfig,
    grace: Duration,
    sweep: bool,
) -> Result<()> {
    let executor = build_executor(db, engine).await?;
    let scheduler = Scheduler::new(executor, db.job_repo(), engine.scheduler_config());

    let registered = scheduler.start().await.map_err(|e| anyhow::anyhow!(e))?;
    tracing::info!(
        timers = registered,
        overlap = ?scheduler.overlap_policy(),
        "Scheduler running, press Ctrl+C to stop"
    );

    let cancel = CancellationToken::new();
    let sweeper_handle = if sweep {
        let sweeper = RetentionSweeper::new(db.run_repo(), db.record_repo(), engine.retention)
            .map_err(|e| anyhow::anyhow!(e))?;
        let token = cancel.clone();
        Some(tokio::spawn(async move { sweeper.run(token).await }))
    } else {
        None
    };

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    tracing::info!("Shutdown requested");

    cancel.cancel();
    if !scheduler.shutdown_timeout(grace).await {
        tracing::warn!("Some runs were abandoned and stay marked running");
    }
    if let Some(handle) = sweeper_handle
        && let Err(e) = handle.await
    {
        tracing::error!(error = %e, "Retention sweeper task failed");
    }

    Ok(())
}

async fn cmd_sweep(db: &Database, engine: &EngineConfig) -> Result<()> {
    let sweeper = RetentionSweeper::new(db.run_repo(), db.record_repo(), engine.retention)
        .map_err(|e| anyhow::anyhow!(e))?;
    let report = sweeper.sweep_once(Utc::now()).await;

    println!(
        "Deleted {} records and {} runs",
        report.records_deleted, report.runs_deleted
    );

    if !report.is_clean() {
        anyhow::bail!("Sweep incomplete: {}", report.failures.join("; "));
    }
    Ok(())
}

async fn cmd_history(
    job_id: Uuid,
    status: Option<RunStatus>,
    limit: usize,
    db: &Database,
) -> Result<()> {
    let runs = db
        .run_repo()
        .list_runs(job_id, status, limit)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    if runs.is_empty() {
        println!("No runs found for job {}", job_id);
        return Ok(());
    }

    println!("Run history for job {}:\n", job_id);

    for run in &runs {
        let duration = run
            .duration_ms
            .map(|ms| format!("{ms} ms"))
            .unwrap_or_else(|| "-".into());
        println!(
            "  [{:<7}] {}  {}  items: {}  duration: {}",
            run.status.as_str(),
            run.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
            run.id,
            run.items_scraped,
            duration,
        );
        if let Some(error) = &run.error_message {
            println!("            error: {}", error);
        }
    }

    println!("\nTotal: {} runs", runs.len());

    Ok(())
}

fn cmd_schedule(expression: &str, count: usize) -> Result<()> {
    let schedule = CronSchedule::parse(expression).map_err(|e| anyhow::anyhow!(e))?;
    let upcoming = schedule.upcoming(&Utc::now(), count);

    if upcoming.is_empty() {
        println!("\"{}\" never fires", schedule.as_str());
        return Ok(());
    }

    println!("Next fire times for \"{}\":", schedule.as_str());
    for at in upcoming {
        println!("  {}", at.format("%Y-%m-%d %H:%M UTC (%a)"));
    }
    Ok(())
}

async fn cmd_records(filter: &RecordFilter, format: OutputFormat, db: &Database) -> Result<()> {
    let records = db
        .record_repo()
        .list_records(filter)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    tracing::info!(count = records.len(), "Exporting records");

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&records)?),
        OutputFormat::Csv => write_csv(&records, std::io::stdout())?,
    }
    Ok(())
}

const CSV_HEADER: [&str; 12] = [
    "id",
    "job_id",
    "record_type",
    "external_id",
    "title",
    "description",
    "price",
    "currency",
    "source_url",
    "image_url",
    "metadata",
    "captured_at",
];

fn write_csv<W: std::io::Write>(records: &[ScrapedRecord], out: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(CSV_HEADER)?;

    for r in records {
        writer.write_record([
            r.id.to_string(),
            r.job_id.to_string(),
            r.record_type.to_string(),
            r.external_id.clone().unwrap_or_default(),
            r.title.clone(),
            r.description.clone().unwrap_or_default(),
            r.price.map(|p| p.to_string()).unwrap_or_default(),
            r.currency.clone().unwrap_or_default(),
            r.source_url.clone(),
            r.image_url.clone().unwrap_or_default(),
            r.metadata.to_string(),
            r.captured_at.to_rfc3339(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

async fn cmd_jobs(action: JobsCommand, db: &Database) -> Result<()> {
    let repo = db.job_repo();

    match action {
        JobsCommand::Add {
            name,
            job_type,
            url,
            schedule,
            max_pages,
            max_items,
            inactive,
        } => {
            let mut job = NewScrapeJob::new(name, job_type, url).with_options(JobOptions {
                max_pages,
                max_items,
                ..JobOptions::default()
            });
            if let Some(schedule) = schedule {
                job = job.with_schedule(schedule);
            }
            if inactive {
                job = job.inactive();
            }

            let created = repo.create_job(&job).await.map_err(|e| anyhow::anyhow!(e))?;
            tracing::info!(job_id = %created.id, "Job created");
            println!("{}", created.id);
        }
        JobsCommand::List => {
            let jobs = repo.list_jobs().await.map_err(|e| anyhow::anyhow!(e))?;
            if jobs.is_empty() {
                println!("No jobs configured");
                return Ok(());
            }
            for job in &jobs {
                let last_run = job
                    .last_run_at
                    .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
                    .unwrap_or_else(|| "never".into());
                println!(
                    "  {} [{}] {:<8} {:<14} last run: {}  {}",
                    job.id,
                    if job.is_active { "active" } else { "paused" },
                    job.job_type.as_str(),
                    job.schedule().unwrap_or("-"),
                    last_run,
                    job.name,
                );
            }
        }
        JobsCommand::Pause { job_id } => set_active(&repo, job_id, false).await?,
        JobsCommand::Resume { job_id } => set_active(&repo, job_id, true).await?,
    }

    Ok(())
}

async fn set_active(repo: &JobConfigRepository, job_id: Uuid, active: bool) -> Result<()> {
    let updated = repo
        .set_active(job_id, active)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
    if !updated {
        anyhow::bail!("Job {job_id} not found");
    }
    println!(
        "Job {} {}. A running daemon picks this up on its next reschedule.",
        job_id,
        if active { "resumed" } else { "paused" }
    );
    Ok(())
}

pub mod config;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod extract;
pub mod models;
pub mod pacing;
pub mod persist;
pub mod retry;
pub mod schedule;
pub mod scheduler;
pub mod sweeper;
pub mod traits;
pub mod util;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use config::EngineConfig;
pub use dispatch::{ExtractorRegistry, SourceFactory, SourceKind};
pub use error::AppError;
pub use executor::{Executor, ExecutorConfig, JobRunner, RunSummary, TracingRunReporter};
pub use models::{JobType, RecordType, RunStatus, ScrapeJobConfig, ScrapeRun, ScrapedRecord};
pub use scheduler::{OverlapPolicy, Scheduler, SchedulerConfig};
pub use sweeper::{RetentionPolicy, RetentionSweeper};
pub use traits::{
    Extractor, ExtractorFactory, Fetcher, JobStore, PageRenderer, RecordStore, RunStore,
};

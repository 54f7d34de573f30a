//! Strategy table mapping `(job type, site)` to a concrete extractor.

use std::fmt;
use std::sync::Arc;

use crate::error::AppError;
use crate::extract::{GlintsExtractor, ScrapeOutput, TechCrunchExtractor, TokopediaExtractor};
use crate::models::{JobOptions, JobType, ScrapeJobConfig};
use crate::pacing::PageDelay;
use crate::traits::{Extractor, ExtractorFactory, Fetcher, PageRenderer};
use crate::util::host_of;

/// Every source the engine knows how to scrape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Tokopedia,
    Glints,
    TechCrunch,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Tokopedia => "tokopedia",
            SourceKind::Glints => "glints",
            SourceKind::TechCrunch => "techcrunch",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the strategy table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyEntry {
    pub job_type: JobType,
    /// Registrable domain, e.g. `tokopedia.com`. Subdomains match too.
    pub domain: String,
    pub source: SourceKind,
}

impl StrategyEntry {
    fn matches(&self, job_type: JobType, host: &str) -> bool {
        self.job_type == job_type
            && (host == self.domain
                || host
                    .strip_suffix(self.domain.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.')))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExtractorRegistry {
    entries: Vec<StrategyEntry>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The sources shipped with the engine.
    pub fn builtin() -> Self {
        Self::new()
            .register(JobType::Ecommerce, "tokopedia.com", SourceKind::Tokopedia)
            .register(JobType::Jobs, "glints.com", SourceKind::Glints)
            .register(JobType::News, "techcrunch.com", SourceKind::TechCrunch)
    }

    pub fn register(mut self, job_type: JobType, domain: &str, source: SourceKind) -> Self {
        self.entries.push(StrategyEntry {
            job_type,
            domain: domain.trim().to_ascii_lowercase(),
            source,
        });
        self
    }

    pub fn entries(&self) -> &[StrategyEntry] {
        &self.entries
    }

    /// First registered source matching the job type and URL host.
    pub fn resolve(&self, job_type: JobType, url: &str) -> Result<SourceKind, AppError> {
        let unsupported = || AppError::UnsupportedConfiguration {
            job_type,
            url: url.to_string(),
        };
        let host = host_of(url).ok_or_else(unsupported)?;

        self.entries
            .iter()
            .find(|e| e.matches(job_type, &host))
            .map(|e| e.source)
            .ok_or_else(unsupported)
    }
}

/// Concrete extractor chosen by [`SourceFactory`].
#[derive(Clone)]
pub enum SourceExtractor<F: Fetcher, R: PageRenderer> {
    Tokopedia(TokopediaExtractor<F>),
    Glints(GlintsExtractor<R>),
    TechCrunch(TechCrunchExtractor<F>),
}

impl<F: Fetcher, R: PageRenderer> Extractor for SourceExtractor<F, R> {
    async fn scrape(
        &self,
        target_url: &str,
        options: &JobOptions,
    ) -> Result<ScrapeOutput, AppError> {
        match self {
            SourceExtractor::Tokopedia(e) => e.scrape(target_url, options).await,
            SourceExtractor::Glints(e) => e.scrape(target_url, options).await,
            SourceExtractor::TechCrunch(e) => e.scrape(target_url, options).await,
        }
    }
}

/// Builds extractors from the registry using shared I/O capabilities.
#[derive(Clone)]
pub struct SourceFactory<F: Fetcher, R: PageRenderer> {
    registry: Arc<ExtractorRegistry>,
    fetcher: F,
    renderer: R,
    delay: PageDelay,
}

impl<F: Fetcher, R: PageRenderer> SourceFactory<F, R> {
    pub fn new(registry: ExtractorRegistry, fetcher: F, renderer: R, delay: PageDelay) -> Self {
        Self {
            registry: Arc::new(registry),
            fetcher,
            renderer,
            delay,
        }
    }

    pub fn registry(&self) -> &ExtractorRegistry {
        &self.registry
    }
}

impl<F: Fetcher, R: PageRenderer> ExtractorFactory for SourceFactory<F, R> {
    type Extractor = SourceExtractor<F, R>;

    fn create(&self, config: &ScrapeJobConfig) -> Result<Self::Extractor, AppError> {
        let source = self.registry.resolve(config.job_type, &config.target_url)?;
        tracing::debug!(job_id = %config.id, %source, "Resolved extractor");

        Ok(match source {
            SourceKind::Tokopedia => {
                SourceExtractor::Tokopedia(TokopediaExtractor::new(self.fetcher.clone(), self.delay))
            }
            SourceKind::Glints => {
                SourceExtractor::Glints(GlintsExtractor::new(self.renderer.clone(), self.delay))
            }
            SourceKind::TechCrunch => SourceExtractor::TechCrunch(TechCrunchExtractor::new(
                self.fetcher.clone(),
                self.delay,
            )),
        })
    }
}

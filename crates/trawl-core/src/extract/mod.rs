//! Source-specific extractors and the pagination driver they share.
//!
//! Each extractor walks pages 1..=max_pages in order. A failure on the first
//! page fails the whole scrape; later page failures are recorded as
//! [`ExtractionWarning::PageSkipped`] and the walk continues. HTML parsing is
//! kept in synchronous functions so that no parsed document is held across
//! an `.await`.

use std::fmt;
use std::future::Future;

use scraper::{ElementRef, Selector};
use url::Url;

use crate::error::AppError;
use crate::models::{JobOptions, RawRecord};
use crate::pacing::PageDelay;
use crate::util::non_empty_text;

pub mod ecommerce;
pub mod jobs;
pub mod news;

pub use ecommerce::TokopediaExtractor;
pub use jobs::GlintsExtractor;
pub use news::TechCrunchExtractor;

/// Everything one `scrape()` call produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScrapeOutput {
    pub records: Vec<RawRecord>,
    pub warnings: Vec<ExtractionWarning>,
}

/// A non-fatal problem encountered while extracting.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionWarning {
    /// A single card/article on a page could not be turned into a record.
    ItemSkipped {
        page: u32,
        index: usize,
        reason: String,
    },
    /// A whole page after the first failed to load or parse.
    PageSkipped { page: u32, url: String, error: String },
}

impl fmt::Display for ExtractionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionWarning::ItemSkipped {
                page,
                index,
                reason,
            } => write!(f, "page {page}, item {index}: {reason}"),
            ExtractionWarning::PageSkipped { page, url, error } => {
                write!(f, "page {page} ({url}) skipped: {error}")
            }
        }
    }
}

/// Records and warnings parsed from a single page.
#[derive(Debug, Default)]
pub(crate) struct PageParse {
    pub records: Vec<RawRecord>,
    pub warnings: Vec<ExtractionWarning>,
}

impl PageParse {
    pub fn skip_item(&mut self, page: u32, index: usize, reason: impl Into<String>) {
        self.warnings.push(ExtractionWarning::ItemSkipped {
            page,
            index,
            reason: reason.into(),
        });
    }
}

/// A source that is read one page at a time.
pub(crate) trait PagedSource: Send + Sync {
    /// Pages walked when the job options do not say otherwise.
    const DEFAULT_MAX_PAGES: u32;
    /// Item cap when the job options do not say otherwise.
    const DEFAULT_MAX_ITEMS: Option<usize> = None;

    fn page_url(&self, target_url: &str, page: u32) -> String;

    fn load_page(
        &self,
        url: &str,
        page: u32,
    ) -> impl Future<Output = Result<PageParse, AppError>> + Send;
}

/// Walk a paged source according to the job options.
pub(crate) async fn paginate<S: PagedSource>(
    source: &S,
    target_url: &str,
    options: &JobOptions,
    default_delay: PageDelay,
) -> Result<ScrapeOutput, AppError> {
    let max_pages = options.max_pages_or(S::DEFAULT_MAX_PAGES);
    let max_items = options.max_items.or(S::DEFAULT_MAX_ITEMS);
    let delay = options
        .delay_override()
        .map(|(min, max)| PageDelay::new(min, max))
        .unwrap_or(default_delay);

    let mut output = ScrapeOutput::default();

    for page in 1..=max_pages {
        let url = source.page_url(target_url, page);
        tracing::info!(page, max_pages, %url, "Scraping page");

        match source.load_page(&url, page).await {
            Ok(parsed) => {
                tracing::debug!(page, items = parsed.records.len(), "Page parsed");
                output.records.extend(parsed.records);
                output.warnings.extend(parsed.warnings);
            }
            Err(e) if page == 1 => return Err(e),
            Err(e) => {
                tracing::warn!(page, %url, error = %e, "Skipping page");
                output.warnings.push(ExtractionWarning::PageSkipped {
                    page,
                    url,
                    error: e.to_string(),
                });
            }
        }

        if let Some(max) = max_items
            && output.records.len() >= max
        {
            output.records.truncate(max);
            break;
        }

        if page < max_pages {
            delay.pause().await;
        }
    }

    Ok(output)
}

/// Set (or replace) the `page` query parameter on a URL.
pub(crate) fn with_page_param(target_url: &str, page: u32) -> String {
    match Url::parse(target_url) {
        Ok(mut url) => {
            let kept: Vec<(String, String)> = url
                .query_pairs()
                .filter(|(k, _)| k != "page")
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            url.query_pairs_mut()
                .clear()
                .extend_pairs(kept)
                .append_pair("page", &page.to_string());
            url.to_string()
        }
        Err(_) => {
            let sep = if target_url.contains('?') { '&' } else { '?' };
            format!("{target_url}{sep}page={page}")
        }
    }
}

pub(crate) fn css(selector: &str) -> Result<Selector, AppError> {
    Selector::parse(selector)
        .map_err(|e| AppError::ExtractionError(format!("Invalid selector '{selector}': {e}")))
}

/// Whitespace-normalised text of the first match of `selector` under `el`.
pub(crate) fn first_text(el: ElementRef<'_>, selector: &Selector) -> Option<String> {
    el.select(selector)
        .find_map(|m| non_empty_text(&m.text().collect::<Vec<_>>().join(" ")))
}

/// First non-empty value of any of `attrs` on elements matching `selector`.
pub(crate) fn first_attr(
    el: ElementRef<'_>,
    selector: &Selector,
    attrs: &[&str],
) -> Option<String> {
    el.select(selector).find_map(|m| {
        attrs
            .iter()
            .filter_map(|a| m.value().attr(a))
            .map(str::trim)
            .find(|v| !v.is_empty())
            .map(String::from)
    })
}

/// Visible text of an element split into trimmed, non-empty lines
/// (one per text node).
pub(crate) fn text_lines(el: ElementRef<'_>) -> Vec<String> {
    el.text().filter_map(non_empty_text).collect()
}

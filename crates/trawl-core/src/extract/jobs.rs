//! Glints job listings.
//!
//! The listing is client-rendered, so pages go through a [`PageRenderer`].
//! Card markup is unstable; cards are located by, in order of preference:
//! known card selectors, the nearest container of a job link, and finally any
//! block whose text looks like a job posting. Fields are then picked out of a
//! card's text lines by keyword heuristics.

use std::collections::HashSet;
use std::time::Duration;

use scraper::{ElementRef, Html};
use serde_json::json;

use super::{
    PageParse, PagedSource, ScrapeOutput, css, first_attr, paginate, text_lines, with_page_param,
};
use crate::error::AppError;
use crate::models::{JobOptions, RawRecord};
use crate::pacing::PageDelay;
use crate::traits::{Extractor, PageRenderer, RenderOptions};
use crate::util::resolve_url;

/// Selectors the renderer waits on before reading the DOM.
const WAIT_SELECTORS: &[&str] = &[
    "[data-cy='job-card']",
    ".JobSearchCard",
    ".job-card",
    ".opportunity-card",
    "article",
    "div[class*='job']",
    "div[class*='Job']",
];

const CARD_SELECTORS: &[&str] = &[
    "[data-cy='job-card']",
    ".JobSearchCard",
    ".job-card",
    ".opportunity-card",
    "article[class*='job']",
    "div[class*='job-card']",
];

const JOB_LINK: &str = "a[href*='/opportunities/jobs/']";

const LOCATION_KEYWORDS: &[&str] = &["Jakarta", "Surabaya", "Bandung", "Remote", "Hybrid", "On-site"];
const JOB_TYPE_KEYWORDS: &[&str] = &["Full-time", "Part-time", "Contract"];
const SALARY_KEYWORDS: &[&str] = &["Rp", "IDR", "Salary"];

/// Job listings from Glints, rendered in a headless browser.
#[derive(Clone)]
pub struct GlintsExtractor<R: PageRenderer> {
    renderer: R,
    delay: PageDelay,
}

impl<R: PageRenderer> GlintsExtractor<R> {
    pub fn new(renderer: R, delay: PageDelay) -> Self {
        Self { renderer, delay }
    }

    pub fn render_options() -> RenderOptions {
        RenderOptions {
            wait_for_any: WAIT_SELECTORS.iter().map(|s| s.to_string()).collect(),
            selector_timeout: Duration::from_secs(5),
            scroll_limit_px: 2000,
            settle: Duration::from_secs(2),
        }
    }
}

impl<R: PageRenderer> PagedSource for GlintsExtractor<R> {
    const DEFAULT_MAX_PAGES: u32 = 1;

    fn page_url(&self, target_url: &str, page: u32) -> String {
        if page <= 1 {
            target_url.to_string()
        } else {
            with_page_param(target_url, page)
        }
    }

    async fn load_page(&self, url: &str, page: u32) -> Result<PageParse, AppError> {
        let html = self.renderer.render(url, &Self::render_options()).await?;
        parse_job_page(&html, page, url)
    }
}

impl<R: PageRenderer> Extractor for GlintsExtractor<R> {
    async fn scrape(
        &self,
        target_url: &str,
        options: &JobOptions,
    ) -> Result<ScrapeOutput, AppError> {
        paginate(self, target_url, options, self.delay).await
    }
}

pub(crate) fn parse_job_page(
    html: &str,
    page: u32,
    page_url: &str,
) -> Result<PageParse, AppError> {
    let document = Html::parse_document(html);
    let link_sel = css(JOB_LINK)?;
    let any_link_sel = css("a[href]")?;
    let image_sel = css("img")?;

    let cards = find_cards(&document, &link_sel)?;
    tracing::debug!(page, cards = cards.len(), "Located job cards");

    let mut parsed = PageParse::default();
    let mut seen_urls = HashSet::new();

    for (index, card) in cards.into_iter().enumerate() {
        let lines = text_lines(card);
        let url = first_attr(card, &link_sel, &["href"])
            .or_else(|| first_attr(card, &any_link_sel, &["href"]))
            .and_then(|href| resolve_url(page_url, &href));
        let title = pick_title(&lines);

        let (Some(title), Some(url)) = (title, url) else {
            parsed.skip_item(page, index, "job card without recognisable title or link");
            continue;
        };
        if !seen_urls.insert(url.clone()) {
            continue;
        }

        let company = pick_company(&lines, &title);
        let location = lines.iter().find(|l| is_location(l)).cloned();
        let job_type = lines.iter().rev().find(|l| is_job_type(l)).cloned();
        let salary = lines.iter().rev().find(|l| is_salary(l)).cloned();

        let description = [&company, &location, &job_type]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" - ");

        let metadata = json!({
            "company": company,
            "location": location,
            "salary": salary,
            "jobType": job_type,
            "source": "glints",
        });

        parsed.records.push(RawRecord {
            title,
            description: (!description.is_empty()).then_some(description),
            price: None,
            currency: None,
            url,
            image_url: first_attr(card, &image_sel, &["src", "data-src"]),
            metadata: metadata.as_object().cloned().unwrap_or_default(),
            external_id: None,
        });
    }

    Ok(parsed)
}

fn find_cards<'a>(
    document: &'a Html,
    link_sel: &scraper::Selector,
) -> Result<Vec<ElementRef<'a>>, AppError> {
    for selector in CARD_SELECTORS {
        let sel = css(selector)?;
        let found: Vec<_> = document.select(&sel).collect();
        if !found.is_empty() {
            return Ok(found);
        }
    }

    let mut by_link: Vec<ElementRef<'a>> = Vec::new();
    for link in document.select(link_sel) {
        let container = link
            .ancestors()
            .take(5)
            .filter_map(ElementRef::wrap)
            .find(|el| matches!(el.value().name(), "div" | "article" | "li"));
        if let Some(container) = container
            && !by_link.contains(&container)
        {
            by_link.push(container);
        }
    }
    if !by_link.is_empty() {
        return Ok(by_link);
    }

    let blocks = css("div, article, li")?;
    Ok(document
        .select(&blocks)
        .filter(|el| {
            let text = text_lines(*el).join("\n");
            let len = text.chars().count();
            looks_like_posting(&text) && len > 100 && len < 2000
        })
        .collect())
}

fn looks_like_posting(text: &str) -> bool {
    ["Full-time", "Part-time", "Remote", "Salary", "Experience"]
        .iter()
        .any(|k| text.contains(k))
        || (text.contains("requirements") && text.chars().count() > 50)
}

/// Longest line that is not a name, location, job type, or salary.
fn pick_title(lines: &[String]) -> Option<String> {
    lines
        .iter()
        .filter(|l| {
            let len = l.chars().count();
            len > 10
                && len < 100
                && !["Full-time", "Part-time", "Remote", "Salary"]
                    .iter()
                    .any(|k| l.contains(k))
                && !is_location(l)
                && !is_salary(l)
                && !looks_like_person_name(l)
        })
        .reduce(|best, l| {
            if l.chars().count() > best.chars().count() {
                l
            } else {
                best
            }
        })
        .cloned()
}

/// First short, capitalised line that is not otherwise classified.
fn pick_company(lines: &[String], title: &str) -> Option<String> {
    lines
        .iter()
        .find(|l| {
            let len = l.chars().count();
            len > 2
                && len < 30
                && l.as_str() != title
                && l.chars().next().is_some_and(|c| !c.is_lowercase())
                && !is_job_type(l)
                && !is_location(l)
                && !is_salary(l)
        })
        .cloned()
}

fn is_location(line: &str) -> bool {
    LOCATION_KEYWORDS.iter().any(|k| line.contains(k))
}

fn is_job_type(line: &str) -> bool {
    JOB_TYPE_KEYWORDS.iter().any(|k| line.contains(k))
}

fn is_salary(line: &str) -> bool {
    SALARY_KEYWORDS.iter().any(|k| line.contains(k))
}

/// Two capitalised words, e.g. "John Doe".
fn looks_like_person_name(line: &str) -> bool {
    let words: Vec<&str> = line.split(' ').collect();
    words.len() == 2
        && words.iter().all(|w| {
            let mut chars = w.chars();
            chars.next().is_some_and(|c| c.is_ascii_uppercase())
                && w.len() > 1
                && chars.all(|c| c.is_ascii_lowercase())
        })
}

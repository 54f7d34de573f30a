use scraper::Html;
use serde_json::json;
use url::Url;

use super::{PageParse, PagedSource, ScrapeOutput, css, first_attr, first_text, paginate};
use crate::error::AppError;
use crate::models::{JobOptions, RawRecord};
use crate::pacing::PageDelay;
use crate::traits::{Extractor, Fetcher};
use crate::util::resolve_url;

const BASE_URL: &str = "https://techcrunch.com";

// Legacy river markup and the current loop-card markup.
const CARD: &str = "article.post-block, .loop-card";
const TITLE: &str = "h2.post-block__title, .loop-card__title";
const LINK: &str = "a.post-block__title__link, a.loop-card__title-link, .loop-card__title a";
const EXCERPT: &str = ".post-block__content, .loop-card__excerpt";
const IMAGE: &str = "img";
const AUTHOR: &str = ".river-byline__authors, .loop-card__author";
const PUBLISHED: &str = "time[datetime], time";

/// Article listings from TechCrunch, fetched over plain HTTP.
#[derive(Clone)]
pub struct TechCrunchExtractor<F: Fetcher> {
    fetcher: F,
    delay: PageDelay,
}

impl<F: Fetcher> TechCrunchExtractor<F> {
    pub fn new(fetcher: F, delay: PageDelay) -> Self {
        Self { fetcher, delay }
    }
}

impl<F: Fetcher> PagedSource for TechCrunchExtractor<F> {
    const DEFAULT_MAX_PAGES: u32 = 1;
    const DEFAULT_MAX_ITEMS: Option<usize> = Some(20);

    /// WordPress pagination: `/page/N/` appended to the listing path.
    fn page_url(&self, target_url: &str, page: u32) -> String {
        if page <= 1 {
            return target_url.to_string();
        }
        match Url::parse(target_url) {
            Ok(mut url) => {
                let path = url.path().trim_end_matches('/').to_string();
                url.set_path(&format!("{path}/page/{page}/"));
                url.to_string()
            }
            Err(_) => format!("{}/page/{page}/", target_url.trim_end_matches('/')),
        }
    }

    async fn load_page(&self, url: &str, page: u32) -> Result<PageParse, AppError> {
        let html = self.fetcher.fetch(url).await?;
        parse_article_page(&html, page)
    }
}

impl<F: Fetcher> Extractor for TechCrunchExtractor<F> {
    async fn scrape(
        &self,
        target_url: &str,
        options: &JobOptions,
    ) -> Result<ScrapeOutput, AppError> {
        paginate(self, target_url, options, self.delay).await
    }
}

pub(crate) fn parse_article_page(html: &str, page: u32) -> Result<PageParse, AppError> {
    let document = Html::parse_document(html);
    let card = css(CARD)?;
    let title_sel = css(TITLE)?;
    let link_sel = css(LINK)?;
    let excerpt_sel = css(EXCERPT)?;
    let image_sel = css(IMAGE)?;
    let author_sel = css(AUTHOR)?;
    let published_sel = css(PUBLISHED)?;

    let mut parsed = PageParse::default();

    for (index, el) in document.select(&card).enumerate() {
        let title = first_text(el, &title_sel);
        let url = first_attr(el, &link_sel, &["href"])
            .and_then(|href| resolve_url(BASE_URL, &href));

        let (Some(title), Some(url)) = (title, url) else {
            parsed.skip_item(page, index, "article block without headline or link");
            continue;
        };

        let published = first_attr(el, &published_sel, &["datetime"])
            .or_else(|| first_text(el, &published_sel));

        let metadata = json!({
            "author": first_text(el, &author_sel),
            "publishedDate": published,
            "source": "techcrunch",
        });

        parsed.records.push(RawRecord {
            title,
            description: first_text(el, &excerpt_sel),
            price: None,
            currency: None,
            url,
            image_url: first_attr(el, &image_sel, &["src", "data-src"]),
            metadata: metadata.as_object().cloned().unwrap_or_default(),
            external_id: None,
        });
    }

    Ok(parsed)
}

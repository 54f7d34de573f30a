use scraper::Html;
use serde_json::json;

use super::{PageParse, PagedSource, css, first_attr, first_text, paginate, with_page_param};
use crate::error::AppError;
use crate::extract::ScrapeOutput;
use crate::models::{JobOptions, RawRecord};
use crate::pacing::PageDelay;
use crate::traits::{Extractor, Fetcher};
use crate::util::{extract_price, resolve_url};

const BASE_URL: &str = "https://www.tokopedia.com";

// Class names churn with every frontend deploy; the data-testid hooks are
// more stable, so both are listed.
const CARD: &str =
    ".css-5wh65g, [data-testid='master-product-card'], [data-testid='divProductWrapper']";
const TITLE: &str =
    ".prd_link-product-name, [data-testid='spnSRPProdName'], [data-testid='linkProductName']";
const PRICE: &str =
    ".prd_link-product-price, [data-testid='spnSRPProdPrice'], [data-testid='linkProductPrice']";
const IMAGE: &str = "img";
const LINK: &str = "a[href]";
const RATING: &str = ".prd_rating-average-text, [data-testid='spnSRPProdRating']";
const SOLD: &str = ".prd_label-integrity, [data-testid='spnIntegrity']";
const LOCATION: &str = ".prd_link-shop-loc, [data-testid='spnSRPProdTabShopLoc']";

/// Product search results from Tokopedia, fetched over plain HTTP.
#[derive(Clone)]
pub struct TokopediaExtractor<F: Fetcher> {
    fetcher: F,
    delay: PageDelay,
}

impl<F: Fetcher> TokopediaExtractor<F> {
    pub fn new(fetcher: F, delay: PageDelay) -> Self {
        Self { fetcher, delay }
    }
}

impl<F: Fetcher> PagedSource for TokopediaExtractor<F> {
    const DEFAULT_MAX_PAGES: u32 = 3;

    fn page_url(&self, target_url: &str, page: u32) -> String {
        with_page_param(target_url, page)
    }

    async fn load_page(&self, url: &str, page: u32) -> Result<PageParse, AppError> {
        let html = self.fetcher.fetch(url).await?;
        parse_product_page(&html, page)
    }
}

impl<F: Fetcher> Extractor for TokopediaExtractor<F> {
    async fn scrape(
        &self,
        target_url: &str,
        options: &JobOptions,
    ) -> Result<ScrapeOutput, AppError> {
        paginate(self, target_url, options, self.delay).await
    }
}

/// Parse one search results page into product records.
pub(crate) fn parse_product_page(html: &str, page: u32) -> Result<PageParse, AppError> {
    let document = Html::parse_document(html);
    let card = css(CARD)?;
    let title_sel = css(TITLE)?;
    let price_sel = css(PRICE)?;
    let image_sel = css(IMAGE)?;
    let link_sel = css(LINK)?;
    let rating_sel = css(RATING)?;
    let sold_sel = css(SOLD)?;
    let location_sel = css(LOCATION)?;

    let mut parsed = PageParse::default();

    for (index, el) in document.select(&card).enumerate() {
        let title = first_text(el, &title_sel);
        let url = first_attr(el, &link_sel, &["href"])
            .and_then(|href| resolve_url(BASE_URL, &href));

        let (Some(title), Some(url)) = (title, url) else {
            parsed.skip_item(page, index, "product card without name or link");
            continue;
        };

        let price_text = first_text(el, &price_sel);
        let price = price_text.as_deref().and_then(extract_price);
        if price_text.is_some() && price.is_none() {
            tracing::debug!(page, index, ?price_text, "Unparseable price");
        }

        let metadata = json!({
            "rating": first_text(el, &rating_sel),
            "sold": first_text(el, &sold_sel),
            "location": first_text(el, &location_sel),
            "source": "tokopedia",
            "scrapedPage": page,
        });

        parsed.records.push(RawRecord {
            title,
            description: None,
            price,
            currency: Some("IDR".to_string()),
            url,
            image_url: first_attr(el, &image_sel, &["src", "data-src"]),
            metadata: metadata.as_object().cloned().unwrap_or_default(),
            external_id: None,
        });
    }

    Ok(parsed)
}

use trawl_core::error::AppError;
use trawl_core::traits::{Fetcher, PageRenderer, RenderOptions};

/// [`PageRenderer`] that fetches the raw HTML without executing JavaScript.
///
/// Wait selectors and scrolling are ignored. Good enough for pages that
/// server-render their listings, and for builds without a browser.
#[derive(Clone)]
pub struct HttpRenderer<F: Fetcher> {
    fetcher: F,
}

impl<F: Fetcher> HttpRenderer<F> {
    pub fn new(fetcher: F) -> Self {
        Self { fetcher }
    }
}

impl<F: Fetcher> PageRenderer for HttpRenderer<F> {
    async fn render(&self, url: &str, options: &RenderOptions) -> Result<String, AppError> {
        tracing::debug!(
            %url,
            wait_selectors = options.wait_for_any.len(),
            "Rendering without a browser"
        );
        self.fetcher.fetch(url).await
    }
}

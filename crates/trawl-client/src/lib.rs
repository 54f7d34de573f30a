#[cfg(feature = "browser")]
pub mod browser;
pub mod fetcher;
pub mod renderer;

use std::time::Duration;

use trawl_core::error::AppError;

#[cfg(feature = "browser")]
pub use browser::ChromiumRenderer;
pub use fetcher::{ReqwestFetcher, random_user_agent};
pub use renderer::HttpRenderer;

/// Renderer used for browser-backed sources in this build.
#[cfg(feature = "browser")]
pub type DefaultRenderer = ChromiumRenderer;

/// Renderer used for browser-backed sources in this build.
#[cfg(not(feature = "browser"))]
pub type DefaultRenderer = HttpRenderer<ReqwestFetcher>;

/// Build the renderer for this build: headless Chromium with the `browser`
/// feature, plain HTTP otherwise.
#[cfg(feature = "browser")]
pub async fn default_renderer(
    _fetcher: &ReqwestFetcher,
    navigation_timeout: Duration,
) -> Result<DefaultRenderer, AppError> {
    ChromiumRenderer::with_timeout(navigation_timeout).await
}

/// Build the renderer for this build: headless Chromium with the `browser`
/// feature, plain HTTP otherwise.
#[cfg(not(feature = "browser"))]
pub async fn default_renderer(
    fetcher: &ReqwestFetcher,
    _navigation_timeout: Duration,
) -> Result<DefaultRenderer, AppError> {
    tracing::warn!("Built without the `browser` feature; rendered sources are fetched without JavaScript");
    Ok(HttpRenderer::new(fetcher.clone()))
}

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::cdp::browser_protocol::emulation::SetUserAgentOverrideParams;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::time::Instant;
use trawl_core::error::AppError;
use trawl_core::traits::{PageRenderer, RenderOptions};

use crate::fetcher::random_user_agent;

const SELECTOR_POLL: Duration = Duration::from_millis(250);

/// Headless Chromium renderer driven over the Chrome DevTools Protocol.
///
/// One browser process is shared by all clones; every render opens a tab,
/// waits for content, scrolls to trigger lazy loading, grabs the DOM, and
/// closes the tab again.
#[derive(Clone)]
pub struct ChromiumRenderer {
    browser: Arc<Browser>,
    timeout: Duration,
}

impl ChromiumRenderer {
    /// Launches Chromium with a 60 s navigation timeout.
    pub async fn new() -> Result<Self, AppError> {
        Self::with_timeout(Duration::from_secs(60)).await
    }

    pub async fn with_timeout(timeout: Duration) -> Result<Self, AppError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .disable_default_args();

        // The snap wrapper drops headless flags; prefer the real binary.
        if let Some(bin) = find_chrome_binary() {
            tracing::info!(path = %bin.display(), "Using Chrome binary");
            builder = builder.chrome_executable(bin);
        }

        let config = builder
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-setuid-sandbox")
            .arg("--disable-extensions")
            .arg("--no-first-run")
            .build()
            .map_err(|e| AppError::BrowserError(format!("Browser config error: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AppError::BrowserError(format!("Failed to launch browser: {e}")))?;

        // The CDP handler must be polled for the connection to make progress.
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::warn!(error = %e, "Browser CDP handler error");
                    break;
                }
            }
        });

        Ok(Self {
            browser: Arc::new(browser),
            timeout,
        })
    }

    async fn open(&self, url: &str) -> Result<Page, AppError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| AppError::BrowserError(format!("Failed to open tab: {e}")))?;

        page.set_user_agent(SetUserAgentOverrideParams::new(random_user_agent()))
            .await
            .map_err(|e| AppError::BrowserError(format!("Failed to set user agent: {e}")))?;

        match tokio::time::timeout(self.timeout, page.goto(url)).await {
            Ok(Ok(_)) => Ok(page),
            Ok(Err(e)) => {
                let _ = page.close().await;
                Err(AppError::BrowserError(format!(
                    "Failed to navigate to {url}: {e}"
                )))
            }
            Err(_) => {
                let _ = page.close().await;
                Err(AppError::Timeout(self.timeout.as_secs()))
            }
        }
    }

    async fn settle(&self, page: &Page, options: &RenderOptions) -> Result<String, AppError> {
        if !options.wait_for_any.is_empty() {
            match wait_for_any(page, &options.wait_for_any, options.selector_timeout).await {
                Some(selector) => tracing::debug!(%selector, "Content selector appeared"),
                None => tracing::warn!(
                    selectors = ?options.wait_for_any,
                    "No content selector appeared, continuing anyway"
                ),
            }
        }

        if options.scroll_limit_px > 0 {
            let params = EvaluateParams::builder()
                .expression(scroll_script(options.scroll_limit_px))
                .await_promise(true)
                .build()
                .map_err(AppError::BrowserError)?;
            if let Err(e) = page.evaluate_expression(params).await {
                tracing::warn!(error = %e, "Auto-scroll failed");
            }
        }

        if !options.settle.is_zero() {
            tokio::time::sleep(options.settle).await;
        }

        page.content()
            .await
            .map_err(|e| AppError::BrowserError(format!("Failed to read page content: {e}")))
    }
}

impl PageRenderer for ChromiumRenderer {
    async fn render(&self, url: &str, options: &RenderOptions) -> Result<String, AppError> {
        let page = self.open(url).await?;
        let result = self.settle(&page, options).await;
        let _ = page.close().await;
        result
    }
}

/// Try each selector in turn, polling up to `per_selector` for each.
/// Returns the first one that matched.
async fn wait_for_any(page: &Page, selectors: &[String], per_selector: Duration) -> Option<String> {
    for selector in selectors {
        let deadline = Instant::now() + per_selector;
        loop {
            if page.find_element(selector.as_str()).await.is_ok() {
                return Some(selector.clone());
            }
            if Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(SELECTOR_POLL).await;
        }
    }
    None
}

/// Scroll in 100px steps until `limit_px` or the page bottom is reached.
fn scroll_script(limit_px: u32) -> String {
    format!(
        "new Promise((resolve) => {{
            let total = 0;
            const step = 100;
            const timer = setInterval(() => {{
                window.scrollBy(0, step);
                total += step;
                if (total >= {limit_px} || total >= document.body.scrollHeight) {{
                    clearInterval(timer);
                    resolve(total);
                }}
            }}, 100);
        }})"
    )
}

/// Locate a usable Chrome/Chromium binary. `CHROME_BIN` wins; `None` lets
/// chromiumoxide run its own lookup.
fn find_chrome_binary() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("CHROME_BIN") {
        let path = PathBuf::from(p);
        if path.exists() {
            return Some(path);
        }
    }

    [
        "/snap/chromium/current/usr/lib/chromium-browser/chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/google-chrome",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
    ]
    .iter()
    .map(PathBuf::from)
    .find(|p| p.exists())
}

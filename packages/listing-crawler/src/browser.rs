use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;

use crate::config::CrawlConfig;
use crate::traits::ListingPage;

/// Launched browser plus the spawned CDP event-handler task.
///
/// chromiumoxide delivers all CDP traffic through the handler stream; the
/// browser stalls if nobody polls it, so the task lives as long as the
/// browser does.
pub struct BrowserHandle {
    browser: Browser,
    handler_task: JoinHandle<()>,
}

impl BrowserHandle {
    pub async fn launch(headless: bool) -> Result<Self> {
        let mut builder = BrowserConfig::builder()
            .window_size(1920, 1080)
            .no_sandbox();
        if !headless {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|e| anyhow!("invalid browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch chromium")?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!(error = %e, "browser handler event error");
                }
            }
        });

        Ok(Self {
            browser,
            handler_task,
        })
    }

    pub fn browser(&self) -> &Browser {
        &self.browser
    }

    pub async fn close(mut self) -> Result<()> {
        self.browser
            .close()
            .await
            .context("failed to close browser")?;
        self.handler_task.abort();
        Ok(())
    }
}

/// A listing page open in Chromium, addressed through row snapshots.
pub struct ChromiumListingPage {
    page: Page,
    row_selector: String,
}

impl ChromiumListingPage {
    /// Navigate to the listing and wait (bounded) for the first rows.
    pub async fn open(browser: &Browser, url: &str, config: &CrawlConfig) -> Result<Self> {
        let page = browser
            .new_page(url)
            .await
            .context("failed to open listing page")?;
        page.wait_for_navigation()
            .await
            .context("listing page failed to load")?;

        let listing = Self {
            page,
            row_selector: config.row_selector.clone(),
        };
        listing.wait_for_rows(config).await?;
        Ok(listing)
    }

    async fn wait_for_rows(&self, config: &CrawlConfig) -> Result<()> {
        for attempt in 1..=config.row_wait_attempts {
            let count: i64 = self
                .page
                .evaluate(format!(
                    "document.querySelectorAll({}).length",
                    js_string(&self.row_selector)
                ))
                .await
                .context("failed to count listing rows")?
                .into_value()
                .context("row count was not a number")?;

            if count > 0 {
                tracing::debug!(attempt, rows = count, "listing rows present");
                return Ok(());
            }
            tokio::time::sleep(config.row_wait_interval).await;
        }

        Err(anyhow!(
            "no listing rows appeared after {} attempts",
            config.row_wait_attempts
        ))
    }
}

#[async_trait]
impl ListingPage for ChromiumListingPage {
    async fn rows(&self) -> Result<Vec<String>> {
        self.page
            .evaluate(format!(
                "Array.from(document.querySelectorAll({})).map(el => el.outerHTML)",
                js_string(&self.row_selector)
            ))
            .await
            .context("failed to snapshot listing rows")?
            .into_value()
            .context("row snapshot was not a string array")
    }

    async fn scroll_to_bottom(&self) -> Result<i64> {
        self.page
            .evaluate(
                "(() => { window.scrollBy(0, document.body.scrollHeight); \
                 return document.body.scrollHeight; })()",
            )
            .await
            .context("failed to scroll listing page")?
            .into_value()
            .context("page height was not a number")
    }

    async fn settle(&self, wait: Duration) {
        tokio::time::sleep(wait).await;
    }
}

/// Quote a selector for embedding in a JS expression.
fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

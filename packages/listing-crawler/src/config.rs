use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;

/// Process configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Run the browser without a window. On by default; set HEADLESS=false
    /// to watch the crawl while tuning selectors.
    pub headless: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            headless: env::var("HEADLESS")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
        })
    }
}

/// Crawl tuning, injected into the crawler at construction.
///
/// The empty-round threshold and settle delay were tuned empirically against
/// the target site's load behavior; they carry no semantic guarantee beyond
/// "worked for that site" and are plain fields for a reason.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// CSS selector matching one listing row.
    pub row_selector: String,
    /// Consecutive rounds with zero new records before the crawl stops.
    pub max_empty_rounds: u32,
    /// Pause after each scroll for lazily loaded content.
    pub settle_delay: Duration,
    /// Bounded wait for the first listing rows after navigation.
    pub row_wait_attempts: u32,
    pub row_wait_interval: Duration,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            row_selector: "tbody > tr".to_string(),
            max_empty_rounds: 5,
            settle_delay: Duration::from_secs(2),
            row_wait_attempts: 30,
            row_wait_interval: Duration::from_secs(2),
        }
    }
}

impl CrawlConfig {
    pub fn with_row_selector(mut self, selector: impl Into<String>) -> Self {
        self.row_selector = selector.into();
        self
    }

    pub fn with_max_empty_rounds(mut self, rounds: u32) -> Self {
        self.max_empty_rounds = rounds;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }
}

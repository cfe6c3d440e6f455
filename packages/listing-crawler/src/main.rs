// Run-to-completion entry point for the collegedunia listing crawl.

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use listing_crawler::browser::{BrowserHandle, ChromiumListingPage};
use listing_crawler::config::{Config, CrawlConfig};
use listing_crawler::crawler::crawl_listing;
use listing_crawler::extract::{RowExtractor, SOURCE};
use listing_crawler::storage::PostgresListingStore;

/// One site, one page; the selector wiring for its rows lives in `extract`.
const LISTING_URL: &str = "https://collegedunia.com/top-mba-colleges-in-india";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,listing_crawler=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(url = LISTING_URL, "Starting listing crawl");

    let config = Config::from_env().context("Failed to load configuration")?;
    let crawl_config = CrawlConfig::default();

    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Database ready");

    let store = PostgresListingStore::new(pool);
    let extractor = RowExtractor::collegedunia().context("Failed to build row extractor")?;

    tracing::info!(headless = config.headless, "Launching browser");
    let browser = BrowserHandle::launch(config.headless).await?;
    let page = ChromiumListingPage::open(browser.browser(), LISTING_URL, &crawl_config).await?;

    let summary = crawl_listing(&page, &extractor, &store, &crawl_config, SOURCE).await?;

    browser.close().await?;

    tracing::info!(
        rounds = summary.rounds,
        queued = summary.records_queued,
        saved = summary.records_saved,
        extract_errors = summary.extract_errors,
        total_in_store = summary.store_total,
        "Listing crawl finished"
    );

    Ok(())
}

pub mod browser;
pub mod config;
pub mod crawler;
pub mod extract;
pub mod storage;
pub mod traits;
pub mod types;

// Re-exports for clean API
pub use config::{Config, CrawlConfig};
pub use crawler::crawl_listing;
pub use extract::{ExtractError, RowExtractor};
pub use storage::PostgresListingStore;
pub use traits::{ExtractRow, ListingPage, ListingStore};
pub use types::{CrawlSummary, ListingRecord, Placements, Reviews, UpsertReport};

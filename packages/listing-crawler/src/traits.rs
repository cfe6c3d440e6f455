use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::extract::ExtractError;
use crate::types::{ListingRecord, UpsertReport};

/// Browser page boundary for a listing already navigated to its URL.
///
/// The crawler only needs three primitives: a snapshot of the rows currently
/// in the DOM, a scroll-and-measure to reveal more, and a timed pause for
/// lazily loaded content to arrive.
#[async_trait]
pub trait ListingPage: Send + Sync {
    /// Outer HTML of every listing row currently present in the DOM.
    async fn rows(&self) -> Result<Vec<String>>;

    /// Scroll to the bottom of the page and return the resulting page height.
    async fn scroll_to_bottom(&self) -> Result<i64>;

    /// Pause to let asynchronously loaded content settle.
    async fn settle(&self, wait: Duration);
}

/// Persistence sink keyed by the record's canonical URL.
#[async_trait]
pub trait ListingStore: Send + Sync {
    /// Unordered bulk upsert. A failure on one record must not block the
    /// others; per-record failures are reported in the returned
    /// [`UpsertReport`]. An `Err` means the whole batch could not be
    /// attempted (store unreachable) and is fatal for the run.
    async fn bulk_upsert(&self, records: &[ListingRecord]) -> Result<UpsertReport>;

    /// Number of stored documents for a source, for the final run summary.
    async fn count_by_source(&self, source: &str) -> Result<u64>;
}

/// Row snapshot to record. Page-specific selector wiring lives behind this
/// seam so the crawl loop stays layout-agnostic (and testable without HTML).
pub trait ExtractRow: Send + Sync {
    fn extract(&self, row_html: &str) -> Result<ListingRecord, ExtractError>;
}

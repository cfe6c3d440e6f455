use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One listing row, keyed by the college's canonical URL.
///
/// Every field besides `url` and `source` is best-effort text lifted from the
/// listing table; missing cells stay `None` rather than failing the row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingRecord {
    /// Canonical college URL. Natural key in the store and the dedup token
    /// within a run. Never empty.
    pub url: String,
    pub name: Option<String>,
    pub logo: Option<String>,
    pub location: Option<String>,
    pub approvals: Option<String>,
    pub program: Option<String>,
    pub fees: Option<String>,
    pub placements: Placements,
    pub reviews: Reviews,
    /// Site tag, e.g. "collegedunia".
    pub source: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Placements {
    pub average_package: Option<String>,
    pub highest_package: Option<String>,
    pub score: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reviews {
    pub rating: Option<String>,
    pub count: Option<String>,
}

/// Outcome of one unordered bulk upsert.
///
/// A failed record never aborts the batch; it is reported here instead.
#[derive(Debug, Clone, Default)]
pub struct UpsertReport {
    pub inserted: usize,
    pub updated: usize,
    /// (url, error text) for each record that could not be written.
    pub failed: Vec<(String, String)>,
}

impl UpsertReport {
    pub fn written(&self) -> usize {
        self.inserted + self.updated
    }
}

/// Per-round progress figures.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoundStats {
    pub rows_seen: usize,
    pub new_records: usize,
    pub duplicates: usize,
    pub extract_errors: usize,
}

/// Final figures for a completed crawl.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrawlSummary {
    pub rounds: usize,
    pub records_queued: usize,
    pub records_saved: usize,
    pub extract_errors: usize,
    /// Store-wide document count for this source after the run.
    pub store_total: u64,
}

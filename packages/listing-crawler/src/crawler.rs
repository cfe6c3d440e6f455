use std::collections::HashSet;

use anyhow::{Context, Result};

use crate::config::CrawlConfig;
use crate::traits::{ExtractRow, ListingPage, ListingStore};
use crate::types::{CrawlSummary, RoundStats};

/// Crawl an infinite-scroll listing page and upsert one record per row.
///
/// Each round scans the rows currently in the DOM, extracts the ones not yet
/// seen this run, flushes them as one unordered bulk upsert keyed by URL,
/// then scrolls to reveal more. The page gives no authoritative "last page"
/// signal, so the crawl stops after `max_empty_rounds` consecutive rounds
/// that produced no previously-unseen record.
pub async fn crawl_listing(
    page: &impl ListingPage,
    extractor: &impl ExtractRow,
    store: &impl ListingStore,
    config: &CrawlConfig,
    source: &str,
) -> Result<CrawlSummary> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut empty_rounds = 0u32;
    let mut last_height = 0i64;
    let mut summary = CrawlSummary::default();

    loop {
        summary.rounds += 1;
        let rows = page.rows().await.context("failed to read listing rows")?;
        let mut stats = RoundStats {
            rows_seen: rows.len(),
            ..Default::default()
        };
        let mut batch = Vec::new();

        for row in &rows {
            match extractor.extract(row) {
                Ok(record) => {
                    if seen.insert(record.url.clone()) {
                        stats.new_records += 1;
                        batch.push(record);
                    } else {
                        stats.duplicates += 1;
                    }
                }
                Err(e) => {
                    // One bad row never aborts the round, and does not count
                    // toward "found new".
                    stats.extract_errors += 1;
                    tracing::debug!(round = summary.rounds, error = %e, "skipping row");
                }
            }
        }
        summary.extract_errors += stats.extract_errors;

        if batch.is_empty() {
            tracing::debug!(
                round = summary.rounds,
                rows = stats.rows_seen,
                duplicates = stats.duplicates,
                extract_errors = stats.extract_errors,
                "no new records this round"
            );
        } else {
            let report = store
                .bulk_upsert(&batch)
                .await
                .context("bulk upsert failed")?;
            summary.records_queued += batch.len();
            summary.records_saved += report.written();

            for (url, error) in &report.failed {
                tracing::error!(url = %url, error = %error, "record upsert failed");
            }
            tracing::info!(
                round = summary.rounds,
                rows = stats.rows_seen,
                queued = batch.len(),
                inserted = report.inserted,
                updated = report.updated,
                failed = report.failed.len(),
                "round flushed"
            );
        }

        if stats.new_records > 0 {
            empty_rounds = 0;
        } else {
            empty_rounds += 1;
        }
        if empty_rounds >= config.max_empty_rounds {
            break;
        }

        let height = page
            .scroll_to_bottom()
            .await
            .context("failed to scroll listing page")?;
        page.settle(config.settle_delay).await;
        if height == last_height {
            // Page stopped growing but a slow lazy load may still be in
            // flight; give it one more beat.
            page.settle(config.settle_delay).await;
        }
        last_height = height;
    }

    summary.store_total = store
        .count_by_source(source)
        .await
        .context("failed to count stored records")?;

    tracing::info!(
        rounds = summary.rounds,
        queued = summary.records_queued,
        saved = summary.records_saved,
        extract_errors = summary.extract_errors,
        store_total = summary.store_total,
        "crawl complete"
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::ExtractError;
    use crate::types::{ListingRecord, Placements, Reviews, UpsertReport};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Rows are plain "name|url" strings; "ERR" rows fail extraction.
    struct TestExtractor;

    impl ExtractRow for TestExtractor {
        fn extract(&self, row: &str) -> Result<ListingRecord, ExtractError> {
            let (name, url) = row.split_once('|').ok_or(ExtractError::MissingLink)?;
            if url.is_empty() {
                return Err(ExtractError::MissingHref);
            }
            Ok(ListingRecord {
                url: url.to_string(),
                name: Some(name.to_string()),
                logo: None,
                location: None,
                approvals: None,
                program: None,
                fees: None,
                placements: Placements::default(),
                reviews: Reviews::default(),
                source: "test".to_string(),
                updated_at: Utc::now(),
            })
        }
    }

    /// Listing that reveals `per_round` more rows on every scroll.
    struct ScriptedPage {
        rows: Vec<String>,
        per_round: usize,
        revealed: Mutex<usize>,
        scrolls: Mutex<usize>,
        settles: Mutex<usize>,
    }

    impl ScriptedPage {
        fn new(rows: Vec<&str>, per_round: usize) -> Self {
            let initial = per_round.min(rows.len());
            Self {
                rows: rows.into_iter().map(String::from).collect(),
                per_round,
                revealed: Mutex::new(initial),
                scrolls: Mutex::new(0),
                settles: Mutex::new(0),
            }
        }

        fn all_at_once(rows: Vec<&str>) -> Self {
            let count = rows.len();
            Self::new(rows, count.max(1))
        }
    }

    #[async_trait]
    impl ListingPage for ScriptedPage {
        async fn rows(&self) -> Result<Vec<String>> {
            let revealed = *self.revealed.lock().unwrap();
            Ok(self.rows[..revealed].to_vec())
        }

        async fn scroll_to_bottom(&self) -> Result<i64> {
            *self.scrolls.lock().unwrap() += 1;
            let mut revealed = self.revealed.lock().unwrap();
            *revealed = (*revealed + self.per_round).min(self.rows.len());
            Ok(*revealed as i64)
        }

        async fn settle(&self, _wait: Duration) {
            *self.settles.lock().unwrap() += 1;
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        docs: Mutex<HashMap<String, ListingRecord>>,
        fail_urls: Vec<String>,
    }

    impl MemoryStore {
        fn failing_on(urls: &[&str]) -> Self {
            Self {
                docs: Mutex::new(HashMap::new()),
                fail_urls: urls.iter().map(|u| u.to_string()).collect(),
            }
        }

        fn len(&self) -> usize {
            self.docs.lock().unwrap().len()
        }

        fn get_name(&self, url: &str) -> Option<String> {
            self.docs.lock().unwrap().get(url).and_then(|r| r.name.clone())
        }
    }

    #[async_trait]
    impl ListingStore for MemoryStore {
        async fn bulk_upsert(&self, records: &[ListingRecord]) -> Result<UpsertReport> {
            let mut docs = self.docs.lock().unwrap();
            let mut report = UpsertReport::default();
            for record in records {
                assert!(!record.url.is_empty(), "store key must be non-empty");
                if self.fail_urls.contains(&record.url) {
                    report.failed.push((record.url.clone(), "write refused".to_string()));
                    continue;
                }
                if docs.insert(record.url.clone(), record.clone()).is_some() {
                    report.updated += 1;
                } else {
                    report.inserted += 1;
                }
            }
            Ok(report)
        }

        async fn count_by_source(&self, source: &str) -> Result<u64> {
            let docs = self.docs.lock().unwrap();
            Ok(docs.values().filter(|r| r.source == source).count() as u64)
        }
    }

    fn config() -> CrawlConfig {
        CrawlConfig {
            settle_delay: Duration::from_millis(0),
            row_wait_interval: Duration::from_millis(0),
            ..CrawlConfig::default()
        }
    }

    #[tokio::test]
    async fn twelve_rows_four_per_round_runs_exactly_eight_rounds() {
        let rows: Vec<String> = (1..=12).map(|i| format!("College {i}|https://site/c{i}")).collect();
        let page = ScriptedPage::new(rows.iter().map(String::as_str).collect(), 4);
        let store = MemoryStore::default();

        let summary = crawl_listing(&page, &TestExtractor, &store, &config(), "test")
            .await
            .unwrap();

        // 3 productive rounds, then 5 consecutive empty rounds.
        assert_eq!(summary.rounds, 8);
        assert_eq!(summary.records_queued, 12);
        assert_eq!(summary.records_saved, 12);
        assert_eq!(summary.store_total, 12);
        assert_eq!(store.len(), 12);
    }

    #[tokio::test]
    async fn terminates_exactly_five_empty_rounds_after_content_stops() {
        let page = ScriptedPage::all_at_once(vec!["A|https://site/a", "B|https://site/b"]);
        let store = MemoryStore::default();

        let summary = crawl_listing(&page, &TestExtractor, &store, &config(), "test")
            .await
            .unwrap();

        // Round 1 finds both rows; rounds 2-6 are empty.
        assert_eq!(summary.rounds, 6);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn rows_without_identifying_url_never_reset_the_empty_counter() {
        // After the real rows, every scroll reveals another malformed row.
        let page = ScriptedPage::new(
            vec!["A|https://site/a", "ERR", "ERR", "ERR", "ERR", "ERR", "ERR"],
            1,
        );
        let store = MemoryStore::default();

        let summary = crawl_listing(&page, &TestExtractor, &store, &config(), "test")
            .await
            .unwrap();

        // Only round 1 produces a record; the malformed rows revealed later
        // must not count as "new".
        assert_eq!(summary.rounds, 6);
        assert_eq!(store.len(), 1);
        assert!(summary.extract_errors > 0);
    }

    #[tokio::test]
    async fn one_failing_row_out_of_ten_persists_the_other_nine() {
        let rows: Vec<String> = (1..=10)
            .map(|i| {
                if i == 7 {
                    "ERR".to_string()
                } else {
                    format!("College {i}|https://site/c{i}")
                }
            })
            .collect();
        let page = ScriptedPage::all_at_once(rows.iter().map(String::as_str).collect());
        let store = MemoryStore::default();

        let summary = crawl_listing(&page, &TestExtractor, &store, &config(), "test")
            .await
            .unwrap();

        assert_eq!(store.len(), 9);
        assert_eq!(summary.extract_errors, 6); // round 1, plus the 5 empty rounds
        assert_eq!(summary.records_saved, 9);
    }

    #[tokio::test]
    async fn rerun_against_unchanged_listing_adds_no_documents() {
        let rows = vec!["A|https://site/a", "B|https://site/b", "C|https://site/c"];
        let store = MemoryStore::default();

        let first = ScriptedPage::all_at_once(rows.clone());
        crawl_listing(&first, &TestExtractor, &store, &config(), "test")
            .await
            .unwrap();
        assert_eq!(store.len(), 3);

        let second = ScriptedPage::all_at_once(rows);
        let summary = crawl_listing(&second, &TestExtractor, &store, &config(), "test")
            .await
            .unwrap();

        // Zero net new documents; everything overwrote idempotently.
        assert_eq!(store.len(), 3);
        assert_eq!(summary.store_total, 3);
    }

    #[tokio::test]
    async fn reupsert_keeps_one_document_with_latest_values() {
        let store = MemoryStore::default();

        let first = ScriptedPage::all_at_once(vec!["X|https://site/x"]);
        crawl_listing(&first, &TestExtractor, &store, &config(), "test")
            .await
            .unwrap();

        let second = ScriptedPage::all_at_once(vec!["X renamed|https://site/x"]);
        crawl_listing(&second, &TestExtractor, &store, &config(), "test")
            .await
            .unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get_name("https://site/x").as_deref(), Some("X renamed"));
    }

    #[tokio::test]
    async fn record_level_store_failure_does_not_block_the_batch() {
        let rows: Vec<String> = (1..=10).map(|i| format!("College {i}|https://site/c{i}")).collect();
        let page = ScriptedPage::all_at_once(rows.iter().map(String::as_str).collect());
        let store = MemoryStore::failing_on(&["https://site/c4"]);

        let summary = crawl_listing(&page, &TestExtractor, &store, &config(), "test")
            .await
            .unwrap();

        assert_eq!(store.len(), 9);
        assert_eq!(summary.records_queued, 10);
        assert_eq!(summary.records_saved, 9);
    }

    #[tokio::test]
    async fn duplicate_rows_in_the_source_converge_to_one_document() {
        // The same row rendered twice in one round.
        let page = ScriptedPage::all_at_once(vec!["A|https://site/a", "A|https://site/a"]);
        let store = MemoryStore::default();

        let summary = crawl_listing(&page, &TestExtractor, &store, &config(), "test")
            .await
            .unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(summary.records_queued, 1);
    }

    #[tokio::test]
    async fn stable_height_gets_exactly_one_extra_settle_per_scroll() {
        // Height never grows past the first scroll: the page reports all rows
        // up front, so every later scroll sees an unchanged height.
        let page = ScriptedPage::all_at_once(vec!["A|https://site/a", "B|https://site/b"]);
        let store = MemoryStore::default();

        let summary = crawl_listing(&page, &TestExtractor, &store, &config(), "test")
            .await
            .unwrap();

        // Rounds 1-5 scroll (round 6 terminates before scrolling). The first
        // scroll changes the height (0 -> 2) and settles once; the four
        // stable-height scrolls settle twice each.
        assert_eq!(summary.rounds, 6);
        assert_eq!(*page.scrolls.lock().unwrap(), 5);
        assert_eq!(*page.settles.lock().unwrap(), 1 + 4 * 2);
    }

    #[tokio::test]
    async fn growing_height_settles_once_per_scroll() {
        // One real row, then filler rows so each scroll keeps growing the
        // page until the crawl gives up.
        let page = ScriptedPage::new(
            vec!["A|https://site/a", "ERR", "ERR", "ERR", "ERR", "ERR", "ERR", "ERR"],
            1,
        );
        let store = MemoryStore::default();

        let summary = crawl_listing(&page, &TestExtractor, &store, &config(), "test")
            .await
            .unwrap();

        // Five scrolls, each revealing one more row (height 2..6), so the
        // extra stable-height settle never fires.
        assert_eq!(summary.rounds, 6);
        assert_eq!(*page.scrolls.lock().unwrap(), 5);
        assert_eq!(*page.settles.lock().unwrap(), 5);
    }
}

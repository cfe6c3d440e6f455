use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{PgPool, Row};

use crate::traits::ListingStore;
use crate::types::{ListingRecord, UpsertReport};

/// Postgres-backed listing store; one row per canonical URL.
pub struct PostgresListingStore {
    pool: PgPool,
}

impl PostgresListingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ListingStore for PostgresListingStore {
    async fn bulk_upsert(&self, records: &[ListingRecord]) -> Result<UpsertReport> {
        let mut report = UpsertReport::default();

        // One statement per record, unordered semantics: a refused record is
        // reported and the rest of the batch still goes through.
        for record in records {
            // xmax = 0 means INSERT, xmax > 0 means UPDATE
            let result = sqlx::query(
                r#"
                INSERT INTO college_listings (
                    url, name, logo, location, approvals, program, fees,
                    placements, reviews, source, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                ON CONFLICT (url) DO UPDATE SET
                    name = EXCLUDED.name,
                    logo = EXCLUDED.logo,
                    location = EXCLUDED.location,
                    approvals = EXCLUDED.approvals,
                    program = EXCLUDED.program,
                    fees = EXCLUDED.fees,
                    placements = EXCLUDED.placements,
                    reviews = EXCLUDED.reviews,
                    source = EXCLUDED.source,
                    updated_at = EXCLUDED.updated_at
                RETURNING (xmax = 0) as was_inserted
                "#,
            )
            .bind(&record.url)
            .bind(record.name.as_ref())
            .bind(record.logo.as_ref())
            .bind(record.location.as_ref())
            .bind(record.approvals.as_ref())
            .bind(record.program.as_ref())
            .bind(record.fees.as_ref())
            .bind(Json(&record.placements))
            .bind(Json(&record.reviews))
            .bind(&record.source)
            .bind(record.updated_at)
            .fetch_one(&self.pool)
            .await;

            match result {
                Ok(row) => {
                    if row.get::<bool, _>("was_inserted") {
                        report.inserted += 1;
                    } else {
                        report.updated += 1;
                    }
                }
                Err(e) => report.failed.push((record.url.clone(), e.to_string())),
            }
        }

        Ok(report)
    }

    async fn count_by_source(&self, source: &str) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM college_listings WHERE source = $1")
            .bind(source)
            .fetch_one(&self.pool)
            .await
            .context("failed to count listings")?;

        Ok(row.get::<i64, _>("total") as u64)
    }
}

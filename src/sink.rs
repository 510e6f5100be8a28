use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::AppError;
use crate::models::job::{JobRecord, UpsertStats};

/// Downstream store for aggregated records. The pipeline depends on it only
/// through this contract: an idempotent upsert keyed by `(source, source_id)`
/// and an optional fingerprint lookup for history-aware dedup.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn upsert_batch(&self, records: &[JobRecord]) -> Result<UpsertStats, AppError>;

    /// Fingerprints already persisted for a country scope. Callers treat a
    /// failure here as "no history available", not as a run failure.
    async fn find_existing_fingerprints(&self, country: &str) -> Result<HashSet<String>, AppError>;
}

/// Postgres-backed sink. Concurrent upserts of the same key are safe:
/// last write wins at the row level.
pub struct PgSink {
    pool: PgPool,
}

impl PgSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PersistenceSink for PgSink {
    async fn upsert_batch(&self, records: &[JobRecord]) -> Result<UpsertStats, AppError> {
        let mut stats = UpsertStats::default();
        for record in records {
            // xmax = 0 only for freshly inserted rows.
            let inserted: bool = sqlx::query_scalar(
                "INSERT INTO jobs (source, source_id, title, company, location, country, description, apply_url, salary_min, salary_max, salary_currency, job_type, is_remote, posted_at, fingerprint, raw_payload) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16) \
                 ON CONFLICT (source, source_id) DO UPDATE SET \
                   title = EXCLUDED.title, company = EXCLUDED.company, location = EXCLUDED.location, \
                   country = EXCLUDED.country, description = EXCLUDED.description, apply_url = EXCLUDED.apply_url, \
                   salary_min = EXCLUDED.salary_min, salary_max = EXCLUDED.salary_max, \
                   salary_currency = EXCLUDED.salary_currency, job_type = EXCLUDED.job_type, \
                   is_remote = EXCLUDED.is_remote, posted_at = EXCLUDED.posted_at, \
                   fingerprint = EXCLUDED.fingerprint, raw_payload = EXCLUDED.raw_payload, \
                   is_active = TRUE, updated_at = NOW() \
                 RETURNING (xmax = 0)",
            )
            .bind(&record.source)
            .bind(&record.source_id)
            .bind(&record.title)
            .bind(&record.company)
            .bind(&record.location)
            .bind(&record.country)
            .bind(&record.description)
            .bind(&record.apply_url)
            .bind(record.salary_min)
            .bind(record.salary_max)
            .bind(&record.salary_currency)
            .bind(&record.job_type)
            .bind(record.is_remote)
            .bind(record.posted_at)
            .bind(&record.fingerprint)
            .bind(&record.raw_payload)
            .fetch_one(&self.pool)
            .await?;

            if inserted {
                stats.inserted += 1;
            } else {
                stats.updated += 1;
            }
        }
        Ok(stats)
    }

    async fn find_existing_fingerprints(&self, country: &str) -> Result<HashSet<String>, AppError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT fingerprint FROM jobs WHERE country = $1 AND is_active = TRUE",
        )
        .bind(country.trim().to_lowercase())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(fp,)| fp).collect())
    }
}

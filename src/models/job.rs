use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical, provider-agnostic job record. Produced by the normalizer,
/// merged by the deduplicator, and written to the sink keyed by
/// `(source, source_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub source: String,
    pub source_id: String,
    pub title: String,
    pub company: String,
    pub location: String,
    pub country: String,
    pub description: String,
    pub apply_url: String,
    pub salary_min: Option<f64>,
    pub salary_max: Option<f64>,
    pub salary_currency: Option<String>,
    pub job_type: Option<String>,
    pub is_remote: bool,
    pub posted_at: Option<DateTime<Utc>>,
    /// Normalized title+company+location hash used for cross-provider
    /// duplicate detection. Provenance identity stays `(source, source_id)`.
    pub fingerprint: String,
    /// Original provider payload, kept for audit only. Never parsed after
    /// normalization and never included in API responses.
    #[serde(skip_serializing, default)]
    pub raw_payload: Option<serde_json::Value>,
}

/// Result of one sink upsert batch.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct UpsertStats {
    pub inserted: i64,
    pub updated: i64,
}

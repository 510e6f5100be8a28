// Aggregation pipeline: fan out to providers, normalize, deduplicate, cache,
// and optionally persist. The orchestrator here is the crate's single entry
// point; route handlers and the import loop are thin wrappers over it.

pub mod cache;
pub mod dedupe;
pub mod health;
pub mod normalize;

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::task::JoinSet;

use crate::error::AppError;
use crate::models::job::{JobRecord, UpsertStats};
use crate::models::search::SearchRequest;
use crate::providers::ProviderAdapter;
use crate::sink::PersistenceSink;

use cache::SearchCache;
use health::{HealthMonitor, ProviderStatus};

/// Tunables shared by every run. Defaults match the config layer.
#[derive(Debug, Clone)]
pub struct AggregatorSettings {
    pub cache_ttl: Duration,
    pub failure_threshold: u32,
    pub cooldown: Duration,
    /// Pass history duplicates through as upserts so the sink can update
    /// freshness-sensitive fields, instead of skipping them.
    pub refresh_existing: bool,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(120),
            failure_threshold: 5,
            cooldown: Duration::from_secs(60),
            refresh_existing: false,
        }
    }
}

/// Result of one aggregation run.
#[derive(Debug, Serialize)]
pub struct AggregateOutcome {
    pub records: Vec<JobRecord>,
    /// Health snapshot for every tracked provider, taken after the run.
    pub providers: Vec<ProviderStatus>,
    /// Providers skipped because their circuit was not accepting calls
    /// (open, or half-open with the trial already taken).
    pub skipped_providers: Vec<String>,
    /// Providers that errored or timed out during this run.
    pub failed_providers: Vec<String>,
    /// Raw records dropped by the normalizer.
    pub dropped: usize,
    /// Duplicates merged within the run.
    pub duplicates: usize,
    pub from_cache: bool,
    pub persisted: Option<UpsertStats>,
    /// Sink failure on the optional persist step; the aggregated records are
    /// still returned (partial success).
    pub persist_error: Option<String>,
}

impl AggregateOutcome {
    /// Whether the caller should flag the result as incomplete.
    pub fn is_partial(&self) -> bool {
        !self.skipped_providers.is_empty()
            || !self.failed_providers.is_empty()
            || self.persist_error.is_some()
    }
}

/// Top-level coordinator for one logical search or import request. Shared
/// process-wide behind an `Arc`: the health monitor and cache inside it are
/// mutated by every concurrent run through their own locks.
pub struct Aggregator {
    providers: Vec<Arc<dyn ProviderAdapter>>,
    health: HealthMonitor,
    cache: SearchCache,
    sink: Option<Arc<dyn PersistenceSink>>,
    refresh_existing: bool,
}

impl Aggregator {
    pub fn new(
        providers: Vec<Arc<dyn ProviderAdapter>>,
        sink: Option<Arc<dyn PersistenceSink>>,
        settings: AggregatorSettings,
    ) -> Self {
        Self {
            providers,
            health: HealthMonitor::new(settings.failure_threshold, settings.cooldown),
            cache: SearchCache::new(settings.cache_ttl),
            sink,
            refresh_existing: settings.refresh_existing,
        }
    }

    /// Run the full pipeline for one request: cache check, concurrent
    /// fan-out bounded by the request deadline, normalize, dedupe, cache
    /// write, optional persist. A single provider failing never fails the
    /// run; every provider failing (and no cache hit) does.
    pub async fn aggregate(&self, request: &SearchRequest) -> Result<AggregateOutcome, AppError> {
        let key = request.cache_key();
        if let Some(records) = self.cache.get(&key) {
            tracing::debug!("Cache hit for query '{}'", request.query);
            return Ok(AggregateOutcome {
                records,
                providers: self.health.snapshot(),
                skipped_providers: Vec::new(),
                failed_providers: Vec::new(),
                dropped: 0,
                duplicates: 0,
                from_cache: true,
                persisted: None,
                persist_error: None,
            });
        }

        let mut skipped_providers = Vec::new();
        let mut callable = Vec::new();
        for adapter in &self.providers {
            if self.health.acquire(adapter.name()) {
                callable.push(Arc::clone(adapter));
            } else {
                tracing::info!("Skipping '{}', circuit not accepting calls", adapter.name());
                skipped_providers.push(adapter.name().to_string());
            }
        }
        if callable.is_empty() {
            return Err(AppError::AllProvidersFailed);
        }

        let callable_count = callable.len();
        let (raws, failed_providers) = self.fan_out(callable, request).await;
        if failed_providers.len() == callable_count {
            return Err(AppError::AllProvidersFailed);
        }

        let mut dropped = 0usize;
        let mut normalized = Vec::with_capacity(raws.len());
        for raw in &raws {
            match normalize::normalize(raw, &request.country) {
                Ok(record) => normalized.push(record),
                Err(e) => {
                    dropped += 1;
                    tracing::debug!("Dropping unnormalizable record: {e}");
                }
            }
        }

        let outcome = dedupe::dedupe(normalized);
        let records = outcome.records;
        let duplicates = outcome.merged;

        let (persisted, persist_error) = match &self.sink {
            Some(sink) => self.persist(sink.as_ref(), &records, request).await,
            None => (None, None),
        };

        self.cache.put(&key, records.clone());

        tracing::info!(
            query = %request.query,
            country = %request.country,
            found = records.len(),
            duplicates,
            dropped,
            failed = failed_providers.len(),
            "Aggregation run complete"
        );

        Ok(AggregateOutcome {
            records,
            providers: self.health.snapshot(),
            skipped_providers,
            failed_providers,
            dropped,
            duplicates,
            from_cache: false,
            persisted,
            persist_error,
        })
    }

    /// Issue one bounded call per callable provider and collect whatever
    /// arrives before each call's deadline. Arrival order is not meaningful;
    /// determinism comes from the dedupe sort.
    async fn fan_out(
        &self,
        callable: Vec<Arc<dyn ProviderAdapter>>,
        request: &SearchRequest,
    ) -> (Vec<crate::providers::RawJobRecord>, Vec<String>) {
        let deadline = request.deadline();
        let expected: Vec<String> = callable
            .iter()
            .map(|adapter| adapter.name().to_string())
            .collect();
        let mut set = JoinSet::new();
        for adapter in callable {
            let request = request.clone();
            set.spawn(async move {
                let started = Instant::now();
                let result = tokio::time::timeout(deadline, adapter.fetch(&request)).await;
                (adapter.name().to_string(), started.elapsed(), result)
            });
        }

        let mut raws = Vec::new();
        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        while let Some(joined) = set.join_next().await {
            let (name, latency, result) = match joined {
                Ok(tuple) => tuple,
                Err(e) => {
                    tracing::error!("Provider task panicked: {e}");
                    continue;
                }
            };
            match result {
                Ok(Ok(records)) => {
                    tracing::info!("Provider '{name}' returned {} records", records.len());
                    self.health.record_success(&name, latency);
                    raws.extend(records);
                    succeeded.push(name);
                }
                Ok(Err(e)) => {
                    tracing::warn!("Provider '{name}' failed: {e}");
                    self.health.record_failure(&name, Some(latency));
                    failed.push(name);
                }
                Err(_) => {
                    tracing::warn!("Provider '{name}' timed out after {latency:?}");
                    self.health.record_failure(&name, Some(latency));
                    failed.push(name);
                }
            }
        }

        // A task that panicked reported neither outcome. Count it as a
        // failure so the breaker advances; a half-open trial lost this way
        // would otherwise leave the circuit stuck refusing calls.
        for name in expected {
            if succeeded.contains(&name) || failed.contains(&name) {
                continue;
            }
            self.health.record_failure(&name, None);
            failed.push(name);
        }
        (raws, failed)
    }

    /// History-aware persist: drop records whose fingerprint is already in
    /// the sink (unless refreshing), then upsert the rest. Sink errors
    /// degrade to a partial-success result rather than failing the run.
    async fn persist(
        &self,
        sink: &dyn PersistenceSink,
        records: &[JobRecord],
        request: &SearchRequest,
    ) -> (Option<UpsertStats>, Option<String>) {
        if records.is_empty() {
            return (None, None);
        }

        let batch = match sink.find_existing_fingerprints(&request.country).await {
            Ok(existing) => {
                let (fresh, skipped) =
                    dedupe::split_against_history(records, &existing, self.refresh_existing);
                if skipped > 0 {
                    tracing::debug!("{skipped} records already represented in the sink");
                }
                fresh
            }
            // Lookup is an optimization; upsert idempotency covers its loss.
            Err(e) => {
                tracing::warn!("Fingerprint lookup failed, relying on upsert keys: {e}");
                records.to_vec()
            }
        };

        if batch.is_empty() {
            return (Some(UpsertStats::default()), None);
        }
        match sink.upsert_batch(&batch).await {
            Ok(stats) => {
                tracing::info!("Persisted batch: {} new, {} updated", stats.inserted, stats.updated);
                (Some(stats), None)
            }
            Err(e) => {
                tracing::error!("Persistence failed, returning records anyway: {e}");
                (None, Some(e.to_string()))
            }
        }
    }

    /// Health snapshot, for the status endpoint and for error responses
    /// where no outcome is available.
    pub fn provider_report(&self) -> Vec<ProviderStatus> {
        self.health.snapshot()
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

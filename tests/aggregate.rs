use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use jobfeed::aggregator::{Aggregator, AggregatorSettings};
use jobfeed::error::AppError;
use jobfeed::models::job::{JobRecord, UpsertStats};
use jobfeed::models::search::SearchRequest;
use jobfeed::providers::{ProviderAdapter, RawJobRecord};
use jobfeed::sink::PersistenceSink;

/// Adapter returning a fixed payload list, counting invocations.
struct StaticAdapter {
    name: &'static str,
    payloads: Vec<Value>,
    calls: AtomicUsize,
}

impl StaticAdapter {
    fn new(name: &'static str, payloads: Vec<Value>) -> Arc<Self> {
        Arc::new(Self {
            name,
            payloads,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderAdapter for StaticAdapter {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch(&self, _request: &SearchRequest) -> Result<Vec<RawJobRecord>, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .payloads
            .iter()
            .map(|payload| RawJobRecord {
                provider: self.name.to_string(),
                native_id: payload
                    .get("id")
                    .and_then(Value::as_str)
                    .unwrap_or("missing")
                    .to_string(),
                payload: payload.clone(),
            })
            .collect())
    }
}

struct FailingAdapter {
    name: &'static str,
    calls: AtomicUsize,
}

impl FailingAdapter {
    fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ProviderAdapter for FailingAdapter {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch(&self, _request: &SearchRequest) -> Result<Vec<RawJobRecord>, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(AppError::provider(self.name, "returned 503"))
    }
}

/// Adapter that hangs well past any test deadline.
struct SlowAdapter {
    name: &'static str,
}

#[async_trait]
impl ProviderAdapter for SlowAdapter {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch(&self, _request: &SearchRequest) -> Result<Vec<RawJobRecord>, AppError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(Vec::new())
    }
}

/// Adapter whose task dies without reporting an outcome.
struct PanickingAdapter {
    name: &'static str,
}

#[async_trait]
impl ProviderAdapter for PanickingAdapter {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn fetch(&self, _request: &SearchRequest) -> Result<Vec<RawJobRecord>, AppError> {
        panic!("adapter blew up");
    }
}

/// In-memory sink keyed by `(source, source_id)`, like the real table's
/// unique index.
#[derive(Default)]
struct MemorySink {
    rows: Mutex<HashMap<(String, String), JobRecord>>,
    fail_upserts: bool,
}

impl MemorySink {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            rows: Mutex::new(HashMap::new()),
            fail_upserts: true,
        })
    }

    fn row_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl PersistenceSink for MemorySink {
    async fn upsert_batch(&self, records: &[JobRecord]) -> Result<UpsertStats, AppError> {
        if self.fail_upserts {
            return Err(AppError::Internal("sink unreachable".to_string()));
        }
        let mut rows = self.rows.lock().unwrap();
        let mut stats = UpsertStats::default();
        for record in records {
            let key = (record.source.clone(), record.source_id.clone());
            if rows.insert(key, record.clone()).is_some() {
                stats.updated += 1;
            } else {
                stats.inserted += 1;
            }
        }
        Ok(stats)
    }

    async fn find_existing_fingerprints(&self, _country: &str) -> Result<HashSet<String>, AppError> {
        if self.fail_upserts {
            return Err(AppError::Internal("sink unreachable".to_string()));
        }
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .map(|r| r.fingerprint.clone())
            .collect())
    }
}

fn job_payload(id: &str, title: &str, company: &str, location: &str) -> Value {
    json!({
        "id": id,
        "title": title,
        "company": company,
        "location": location,
        "url": format!("https://example.com/jobs/{id}"),
    })
}

fn settings() -> AggregatorSettings {
    AggregatorSettings {
        cache_ttl: Duration::from_secs(300),
        failure_threshold: 5,
        cooldown: Duration::from_secs(600),
        refresh_existing: false,
    }
}

fn request() -> SearchRequest {
    let mut request = SearchRequest::new("software engineer", "bengaluru", "in", 1);
    request.max_wait_ms = 500;
    request
}

#[tokio::test]
async fn partial_failure_does_not_abort_the_run() {
    let alpha = StaticAdapter::new("alpha", vec![job_payload("a1", "Engineer", "Acme", "Pune")]);
    let beta = StaticAdapter::new("beta", vec![job_payload("b1", "Designer", "Globex", "Mumbai")]);
    let slow: Arc<dyn ProviderAdapter> = Arc::new(SlowAdapter { name: "gamma" });

    let aggregator = Aggregator::new(
        vec![alpha.clone(), beta.clone(), slow],
        None,
        settings(),
    );

    let outcome = aggregator
        .aggregate(&request())
        .await
        .expect("two providers succeeded");

    assert_eq!(outcome.records.len(), 2);
    assert_eq!(outcome.failed_providers, vec!["gamma".to_string()]);
    let gamma = outcome
        .providers
        .iter()
        .find(|p| p.name == "gamma")
        .expect("gamma tracked");
    assert_eq!(gamma.consecutive_failures, 1);
    assert!(gamma.last_failure_at.is_some());
}

#[tokio::test]
async fn all_providers_failing_is_the_only_run_failure() {
    let failing: Arc<dyn ProviderAdapter> = FailingAdapter::new("alpha");
    let aggregator = Aggregator::new(vec![failing], None, settings());

    let err = aggregator.aggregate(&request()).await.unwrap_err();
    assert!(matches!(err, AppError::AllProvidersFailed));
    // The report is still available for the caller to show why.
    assert_eq!(aggregator.provider_report().len(), 1);
}

#[tokio::test]
async fn second_identical_request_is_served_from_cache() {
    let alpha = StaticAdapter::new("alpha", vec![job_payload("a1", "Engineer", "Acme", "Pune")]);
    let aggregator = Aggregator::new(vec![alpha.clone()], None, settings());

    let first = aggregator.aggregate(&request()).await.unwrap();
    assert!(!first.from_cache);
    let second = aggregator.aggregate(&request()).await.unwrap();
    assert!(second.from_cache);
    assert_eq!(second.records.len(), first.records.len());

    assert_eq!(alpha.calls(), 1);
}

#[tokio::test]
async fn open_circuit_skips_the_adapter_entirely() {
    let failing = FailingAdapter::new("alpha");
    let healthy = StaticAdapter::new("beta", vec![job_payload("b1", "Engineer", "Acme", "Pune")]);
    let mut config = settings();
    config.failure_threshold = 1;
    config.cache_ttl = Duration::ZERO;
    let aggregator = Aggregator::new(vec![failing.clone(), healthy.clone()], None, config);

    let first = aggregator.aggregate(&request()).await.unwrap();
    assert_eq!(first.failed_providers, vec!["alpha".to_string()]);
    assert_eq!(failing.calls.load(Ordering::SeqCst), 1);

    let second = aggregator.aggregate(&request()).await.unwrap();
    assert_eq!(second.skipped_providers, vec!["alpha".to_string()]);
    // The adapter itself must not have been invoked while open.
    assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
    assert_eq!(healthy.calls(), 2);
}

#[tokio::test]
async fn panicking_adapter_is_recorded_as_a_failure() {
    let panicking: Arc<dyn ProviderAdapter> = Arc::new(PanickingAdapter { name: "alpha" });
    let healthy = StaticAdapter::new("beta", vec![job_payload("b1", "Engineer", "Acme", "Pune")]);
    let mut config = settings();
    config.failure_threshold = 1;
    config.cache_ttl = Duration::ZERO;
    let aggregator = Aggregator::new(vec![panicking, healthy.clone()], None, config);

    let first = aggregator.aggregate(&request()).await.unwrap();
    assert_eq!(first.records.len(), 1);
    assert_eq!(first.failed_providers, vec!["alpha".to_string()]);
    let alpha = first
        .providers
        .iter()
        .find(|p| p.name == "alpha")
        .expect("alpha tracked");
    assert_eq!(alpha.consecutive_failures, 1);

    // The breaker advanced, so the next run skips alpha instead of leaving
    // it stuck in a state that refuses calls without ever retrying.
    let second = aggregator.aggregate(&request()).await.unwrap();
    assert_eq!(second.skipped_providers, vec!["alpha".to_string()]);
    assert_eq!(healthy.calls(), 2);
}

#[tokio::test]
async fn cross_provider_duplicates_collapse_to_one_record() {
    let alpha = StaticAdapter::new(
        "alpha",
        vec![job_payload("a1", "Software Engineer", "Acme Inc.", "Bengaluru")],
    );
    let beta = StaticAdapter::new(
        "beta",
        vec![job_payload("b7", "software engineer", "ACME", "Bengaluru, Karnataka")],
    );
    let aggregator = Aggregator::new(vec![alpha, beta], None, settings());

    let outcome = aggregator.aggregate(&request()).await.unwrap();
    assert_eq!(outcome.records.len(), 1);
    assert_eq!(outcome.duplicates, 1);
}

#[tokio::test]
async fn aggregating_twice_never_duplicates_persisted_rows() {
    let alpha = StaticAdapter::new(
        "alpha",
        vec![
            job_payload("a1", "Engineer", "Acme", "Pune"),
            job_payload("a2", "Designer", "Globex", "Mumbai"),
        ],
    );
    let sink = MemorySink::new();
    let mut config = settings();
    config.cache_ttl = Duration::ZERO;
    let aggregator = Aggregator::new(vec![alpha], Some(sink.clone()), config);

    let first = aggregator.aggregate(&request()).await.unwrap();
    assert_eq!(first.persisted.unwrap().inserted, 2);
    assert_eq!(sink.row_count(), 2);

    let second = aggregator.aggregate(&request()).await.unwrap();
    // History-aware dedup found both fingerprints already represented.
    let stats = second.persisted.unwrap();
    assert_eq!(stats.inserted, 0);
    assert_eq!(stats.updated, 0);
    assert_eq!(sink.row_count(), 2);
}

#[tokio::test]
async fn refresh_passes_history_duplicates_through_as_upserts() {
    let alpha = StaticAdapter::new("alpha", vec![job_payload("a1", "Engineer", "Acme", "Pune")]);
    let sink = MemorySink::new();
    let mut config = settings();
    config.cache_ttl = Duration::ZERO;
    config.refresh_existing = true;
    let aggregator = Aggregator::new(vec![alpha], Some(sink.clone()), config);

    aggregator.aggregate(&request()).await.unwrap();
    let second = aggregator.aggregate(&request()).await.unwrap();
    let stats = second.persisted.unwrap();
    assert_eq!(stats.updated, 1);
    assert_eq!(sink.row_count(), 1);
}

#[tokio::test]
async fn sink_failure_is_partial_success_not_an_error() {
    let alpha = StaticAdapter::new("alpha", vec![job_payload("a1", "Engineer", "Acme", "Pune")]);
    let sink = MemorySink::failing();
    let aggregator = Aggregator::new(vec![alpha], Some(sink), settings());

    let outcome = aggregator.aggregate(&request()).await.unwrap();
    assert_eq!(outcome.records.len(), 1);
    assert!(outcome.persist_error.is_some());
    assert!(outcome.is_partial());
}

#[tokio::test]
async fn unnormalizable_records_are_dropped_and_counted() {
    let alpha = StaticAdapter::new(
        "alpha",
        vec![
            json!({ "id": "a1", "company": "Acme", "url": "https://example.com/a1" }),
            job_payload("a2", "Engineer", "Acme", "Pune"),
        ],
    );
    let aggregator = Aggregator::new(vec![alpha], None, settings());

    let outcome = aggregator.aggregate(&request()).await.unwrap();
    assert_eq!(outcome.dropped, 1);
    assert_eq!(outcome.records.len(), 1);
    assert_eq!(outcome.records[0].source_id, "a2");
}

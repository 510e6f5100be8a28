// Provider adapters: one per external job-search API.
// Each adapter owns its own request shape, auth scheme, and response parsing
// so provider quirks never leak past this module.

pub mod adzuna;
pub mod jooble;
pub mod jsearch;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::ProviderCredentials;
use crate::error::AppError;
use crate::models::search::SearchRequest;

/// A provider's native response item, opaque beyond this envelope. Lives only
/// between the adapter and the normalizer.
#[derive(Debug, Clone)]
pub struct RawJobRecord {
    pub provider: String,
    pub native_id: String,
    pub payload: serde_json::Value,
}

/// Trait all provider adapters implement.
///
/// `fetch` translates a canonical request into the provider's wire format and
/// returns whatever parsed cleanly. A single malformed item is skipped, not
/// propagated; HTTP 429/5xx surface as a provider error for the health
/// monitor to count. The caller enforces the run deadline from outside.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Stable identifier used for provenance, health tracking, and logs.
    fn name(&self) -> &'static str;

    async fn fetch(&self, request: &SearchRequest) -> Result<Vec<RawJobRecord>, AppError>;
}

/// Build the static adapter list from configured credentials. Providers
/// without credentials are left out rather than registered to fail.
pub fn registry(
    credentials: &ProviderCredentials,
    client: &reqwest::Client,
) -> Vec<Arc<dyn ProviderAdapter>> {
    let mut adapters: Vec<Arc<dyn ProviderAdapter>> = Vec::new();

    match (&credentials.adzuna_app_id, &credentials.adzuna_app_key) {
        (Some(app_id), Some(app_key)) => {
            adapters.push(Arc::new(adzuna::Adzuna::new(
                client.clone(),
                app_id.clone(),
                app_key.clone(),
            )));
        }
        _ => tracing::warn!("Adzuna credentials not configured, adapter disabled"),
    }

    if let Some(key) = &credentials.rapidapi_key {
        adapters.push(Arc::new(jsearch::JSearch::new(client.clone(), key.clone())));
    } else {
        tracing::warn!("RapidAPI key not configured, JSearch adapter disabled");
    }

    if let Some(key) = &credentials.jooble_api_key {
        adapters.push(Arc::new(jooble::Jooble::new(client.clone(), key.clone())));
    } else {
        tracing::warn!("Jooble key not configured, adapter disabled");
    }

    adapters
}

use async_trait::async_trait;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde_json::Value;

use crate::error::AppError;
use crate::models::search::SearchRequest;
use crate::providers::{ProviderAdapter, RawJobRecord};

/// RFC 3986 unreserved characters, kept verbatim in query values.
const QUERY_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

const BASE_URL: &str = "https://api.adzuna.com/v1/api/jobs";

/// Adzuna job-search API. Auth is an app_id/app_key pair passed as query
/// parameters; the country code is part of the URL path.
pub struct Adzuna {
    client: reqwest::Client,
    app_id: String,
    app_key: String,
}

impl Adzuna {
    pub fn new(client: reqwest::Client, app_id: String, app_key: String) -> Self {
        Self {
            client,
            app_id,
            app_key,
        }
    }
}

#[async_trait]
impl ProviderAdapter for Adzuna {
    fn name(&self) -> &'static str {
        "adzuna"
    }

    async fn fetch(&self, request: &SearchRequest) -> Result<Vec<RawJobRecord>, AppError> {
        let country = request.country.trim().to_lowercase();
        let mut url = format!(
            "{BASE_URL}/{country}/search/{}?app_id={}&app_key={}&results_per_page={}",
            request.page.max(1),
            urlencoded(&self.app_id),
            urlencoded(&self.app_key),
            request.results_per_provider,
        );
        if !request.query.trim().is_empty() {
            url.push_str(&format!("&what={}", urlencoded(request.query.trim())));
        }
        if !request.location.trim().is_empty() {
            url.push_str(&format!("&where={}", urlencoded(request.location.trim())));
        }

        let resp = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| AppError::provider("adzuna", format!("request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(AppError::provider(
                "adzuna",
                format!("returned {}", resp.status()),
            ));
        }

        let data: Value = resp
            .json()
            .await
            .map_err(|e| AppError::provider("adzuna", format!("invalid JSON: {e}")))?;

        let results = data
            .get("results")
            .and_then(|v| v.as_array())
            .ok_or_else(|| AppError::provider("adzuna", "missing 'results' in response"))?;

        let mut records = Vec::with_capacity(results.len());
        for item in results {
            // Items without an id cannot be upserted; skip them.
            let Some(native_id) = extract_id(item) else {
                tracing::debug!("Skipping Adzuna item without id");
                continue;
            };
            records.push(RawJobRecord {
                provider: "adzuna".to_string(),
                native_id,
                payload: item.clone(),
            });
        }
        Ok(records)
    }
}

fn extract_id(item: &Value) -> Option<String> {
    match item.get("id") {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

fn urlencoded(s: &str) -> String {
    utf8_percent_encode(s, QUERY_SET).to_string()
}

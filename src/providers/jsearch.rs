use async_trait::async_trait;
use serde_json::Value;

use crate::error::AppError;
use crate::models::search::SearchRequest;
use crate::providers::{ProviderAdapter, RawJobRecord};

const BASE_URL: &str = "https://jsearch.p.rapidapi.com/search";
const RAPIDAPI_HOST: &str = "jsearch.p.rapidapi.com";

/// JSearch (RapidAPI) general job-search API. Auth is a RapidAPI key pair of
/// headers; location is folded into the free-text query the way the hosted
/// API expects.
pub struct JSearch {
    client: reqwest::Client,
    api_key: String,
}

impl JSearch {
    pub fn new(client: reqwest::Client, api_key: String) -> Self {
        Self { client, api_key }
    }
}

#[async_trait]
impl ProviderAdapter for JSearch {
    fn name(&self) -> &'static str {
        "jsearch"
    }

    async fn fetch(&self, request: &SearchRequest) -> Result<Vec<RawJobRecord>, AppError> {
        let mut query = request.query.trim().to_string();
        if query.is_empty() {
            query = "jobs".to_string();
        }
        if !request.location.trim().is_empty() {
            query = format!("{query} in {}", request.location.trim());
        }

        let page = request.page.max(1).to_string();
        let country = request.country.trim().to_uppercase();
        let resp = self
            .client
            .get(BASE_URL)
            .header("X-RapidAPI-Key", &self.api_key)
            .header("X-RapidAPI-Host", RAPIDAPI_HOST)
            .query(&[
                ("query", query.as_str()),
                ("page", page.as_str()),
                ("num_pages", "1"),
                ("country", country.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AppError::provider("jsearch", format!("request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(AppError::provider(
                "jsearch",
                format!("returned {}", resp.status()),
            ));
        }

        let data: Value = resp
            .json()
            .await
            .map_err(|e| AppError::provider("jsearch", format!("invalid JSON: {e}")))?;

        let items = data
            .get("data")
            .and_then(|v| v.as_array())
            .ok_or_else(|| AppError::provider("jsearch", "missing 'data' in response"))?;

        Ok(collect_records(items, request.results_per_provider as usize))
    }
}

/// JSearch does not take a page-size parameter, so the per-provider cap is
/// applied on our side of the wire.
fn collect_records(items: &[Value], cap: usize) -> Vec<RawJobRecord> {
    let mut records = Vec::new();
    for item in items.iter().take(cap.max(1)) {
        let Some(native_id) = item.get("job_id").and_then(|v| v.as_str()) else {
            tracing::debug!("Skipping JSearch item without job_id");
            continue;
        };
        records.push(RawJobRecord {
            provider: "jsearch".to_string(),
            native_id: native_id.to_string(),
            payload: item.clone(),
        });
    }
    records
}

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::error::AppError;
use crate::models::search::SearchRequest;
use crate::providers::{ProviderAdapter, RawJobRecord};

const BASE_URL: &str = "https://jooble.org/api";

/// Jooble job board API. The key is part of the URL path and the search is a
/// JSON POST body. Jooble ids are numeric in the payload.
pub struct Jooble {
    client: reqwest::Client,
    api_key: String,
}

impl Jooble {
    pub fn new(client: reqwest::Client, api_key: String) -> Self {
        Self { client, api_key }
    }
}

#[async_trait]
impl ProviderAdapter for Jooble {
    fn name(&self) -> &'static str {
        "jooble"
    }

    async fn fetch(&self, request: &SearchRequest) -> Result<Vec<RawJobRecord>, AppError> {
        // Jooble treats an empty location as "everywhere for the account's
        // region"; fall back to the country code so results stay scoped.
        let location = if request.location.trim().is_empty() {
            request.country.trim().to_string()
        } else {
            request.location.trim().to_string()
        };

        let body = json!({
            "keywords": request.query.trim(),
            "location": location,
            "page": request.page.max(1),
        });

        let url = format!("{BASE_URL}/{}", self.api_key);
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::provider("jooble", format!("request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(AppError::provider(
                "jooble",
                format!("returned {}", resp.status()),
            ));
        }

        let data: Value = resp
            .json()
            .await
            .map_err(|e| AppError::provider("jooble", format!("invalid JSON: {e}")))?;

        let jobs = data
            .get("jobs")
            .and_then(|v| v.as_array())
            .ok_or_else(|| AppError::provider("jooble", "missing 'jobs' in response"))?;

        let cap = request.results_per_provider as usize;
        let mut records = Vec::new();
        for item in jobs.iter().take(cap.max(1)) {
            let native_id = match item.get("id") {
                Some(Value::String(s)) if !s.is_empty() => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => {
                    tracing::debug!("Skipping Jooble item without id");
                    continue;
                }
            };
            records.push(RawJobRecord {
                provider: "jooble".to_string(),
                native_id,
                payload: item.clone(),
            });
        }
        Ok(records)
    }
}

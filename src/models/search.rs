use std::time::Duration;

use serde::Deserialize;
use sha2::{Digest, Sha256};

fn default_country() -> String {
    "in".to_string()
}

fn default_page() -> u32 {
    1
}

fn default_results_per_provider() -> u32 {
    20
}

fn default_max_wait_ms() -> u64 {
    8_000
}

/// Input to one aggregation run. Built once per call (route query params or
/// import loop) and passed by reference everywhere downstream.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub location: String,
    /// ISO-3166 alpha-2, lowercase preferred; normalized in the cache key.
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_results_per_provider")]
    pub results_per_provider: u32,
    /// Run-level deadline propagated to every provider call.
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,
}

impl SearchRequest {
    pub fn new(query: &str, location: &str, country: &str, page: u32) -> Self {
        Self {
            query: query.to_string(),
            location: location.to_string(),
            country: country.to_string(),
            page: page.max(1),
            results_per_provider: default_results_per_provider(),
            max_wait_ms: default_max_wait_ms(),
        }
    }

    /// Deterministic cache key over the fields that affect provider output.
    /// Case-folded and whitespace-trimmed so "Pune " and "pune" share an entry.
    pub fn cache_key(&self) -> String {
        let normalized = format!(
            "{}|{}|{}|{}",
            self.query.trim().to_lowercase(),
            self.location.trim().to_lowercase(),
            self.country.trim().to_lowercase(),
            self.page.max(1),
        );
        let digest = Sha256::digest(normalized.as_bytes());
        hex::encode(digest)
    }

    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_ignores_case_and_whitespace() {
        let a = SearchRequest::new("Software Engineer", " Pune ", "IN", 1);
        let b = SearchRequest::new("software engineer", "pune", "in", 1);
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn cache_key_differs_per_page() {
        let a = SearchRequest::new("developer", "", "in", 1);
        let b = SearchRequest::new("developer", "", "in", 2);
        assert_ne!(a.cache_key(), b.cache_key());
    }
}

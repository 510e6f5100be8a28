use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;

use crate::aggregator::Aggregator;
use crate::aggregator::health::ProviderStatus;
use crate::error::AppError;
use crate::models::job::JobRecord;
use crate::models::search::SearchRequest;

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub jobs: Vec<JobRecord>,
    pub total: usize,
    pub providers: Vec<ProviderStatus>,
    pub partial: bool,
    pub from_cache: bool,
    pub dropped: usize,
    pub duplicates: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persist_error: Option<String>,
}

/// GET /api/v1/jobs/search
///
/// Thin shim over `Aggregator::aggregate`. Raw provider errors never reach
/// the response: the caller sees results, a partial flag, or a try-again
/// message with the provider report attached.
pub async fn search(
    State(aggregator): State<Arc<Aggregator>>,
    Query(request): Query<SearchRequest>,
) -> Response {
    match aggregator.aggregate(&request).await {
        Ok(outcome) => {
            let partial = outcome.is_partial();
            Json(SearchResponse {
                total: outcome.records.len(),
                jobs: outcome.records,
                providers: outcome.providers,
                partial,
                from_cache: outcome.from_cache,
                dropped: outcome.dropped,
                duplicates: outcome.duplicates,
                persist_error: outcome.persist_error,
            })
            .into_response()
        }
        Err(AppError::AllProvidersFailed) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "error": "No results right now, try again shortly",
                "providers": aggregator.provider_report(),
            })),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::aggregator::Aggregator;
use crate::aggregator::health::ProviderStatus;

/// GET /api/v1/providers
pub async fn list(State(aggregator): State<Arc<Aggregator>>) -> Json<Vec<ProviderStatus>> {
    Json(aggregator.provider_report())
}

/// POST /api/v1/cache/clear
pub async fn clear_cache(State(aggregator): State<Arc<Aggregator>>) -> impl IntoResponse {
    aggregator.clear_cache();
    StatusCode::NO_CONTENT
}

pub mod providers;
pub mod search;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

use crate::aggregator::Aggregator;

pub fn router(aggregator: Arc<Aggregator>) -> Router {
    let api = Router::new()
        .route("/jobs/search", get(search::search))
        .route("/providers", get(providers::list))
        .route("/cache/clear", post(providers::clear_cache))
        .with_state(aggregator);

    Router::new().nest("/api/v1", api)
}

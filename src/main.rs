use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use clap::Parser;
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use jobfeed::aggregator::Aggregator;
use jobfeed::config::{Command, Config};
use jobfeed::models::search::SearchRequest;
use jobfeed::providers;
use jobfeed::sink::{PersistenceSink, PgSink};
use jobfeed::{db, routes};

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn readyz(pool: Option<PgPool>) -> impl IntoResponse {
    let Some(pool) = pool else {
        // No sink configured; the service is ready when it is up.
        return (StatusCode::OK, "ready");
    };
    let result: Result<(i32,), _> = sqlx::query_as("SELECT 1").fetch_one(&pool).await;
    match result {
        Ok(_) => (StatusCode::OK, "ready"),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "not ready"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("jobfeed=info,tower_http=info")),
        )
        .init();

    let config = Config::parse();

    let pool = match &config.database_url {
        Some(url) => {
            tracing::info!("Connecting to database...");
            let pool = db::create_pool(url).await?;
            if config.run_migrations {
                tracing::info!("Running database migrations...");
                db::run_migrations(&pool).await?;
                tracing::info!("Migrations complete");
            }
            Some(pool)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, aggregated jobs will not be persisted");
            None
        }
    };
    let sink: Option<Arc<dyn PersistenceSink>> = pool
        .clone()
        .map(|pool| Arc::new(PgSink::new(pool)) as Arc<dyn PersistenceSink>);

    let client = reqwest::Client::builder()
        .user_agent(concat!("jobfeed/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let adapters = providers::registry(&config.credentials, &client);
    if adapters.is_empty() {
        anyhow::bail!("No provider credentials configured, nothing to aggregate from");
    }
    tracing::info!("Registered {} provider adapters", adapters.len());

    let aggregator = Arc::new(Aggregator::new(
        adapters,
        sink,
        config.aggregator_settings(),
    ));

    match config.resolved_command() {
        Command::Serve { listen_addr } => serve(aggregator, pool, &listen_addr).await,
        Command::Import {
            queries,
            countries,
            pages,
            location,
        } => import(aggregator, queries, countries, pages, &location).await,
    }
}

async fn serve(
    aggregator: Arc<Aggregator>,
    pool: Option<PgPool>,
    listen_addr: &str,
) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(move || readyz(pool.clone())))
        .merge(routes::api::router(aggregator))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!("Listening on {listen_addr}");
    axum::serve(listener, app).await?;

    Ok(())
}

/// Batch import: one aggregation run per query x country x page, persisted
/// through the sink. Providers that degrade mid-import trip their circuits
/// and later runs skip them instead of burning the deadline every time.
async fn import(
    aggregator: Arc<Aggregator>,
    queries: Vec<String>,
    countries: Vec<String>,
    pages: u32,
    location: &str,
) -> anyhow::Result<()> {
    let mut total_found = 0usize;
    let mut total_inserted = 0i64;
    let mut total_updated = 0i64;
    let mut failed_runs = 0usize;

    for country in &countries {
        for query in &queries {
            for page in 1..=pages.max(1) {
                let mut request = SearchRequest::new(query, location, country, page);
                request.results_per_provider = 50;

                match aggregator.aggregate(&request).await {
                    Ok(outcome) => {
                        total_found += outcome.records.len();
                        if let Some(stats) = outcome.persisted {
                            total_inserted += stats.inserted;
                            total_updated += stats.updated;
                        }
                        if let Some(e) = outcome.persist_error {
                            tracing::warn!("Persist failed for '{query}' ({country}): {e}");
                        }
                    }
                    Err(e) => {
                        failed_runs += 1;
                        tracing::warn!("Run failed for '{query}' page {page} ({country}): {e}");
                    }
                }

                // Stay polite with provider rate limits between runs.
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
        }
    }

    tracing::info!(
        "Import complete: {total_found} found, {total_inserted} new, {total_updated} updated, {failed_runs} failed runs"
    );
    Ok(())
}

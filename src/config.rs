use std::time::Duration;

use clap::Parser;

use crate::aggregator::AggregatorSettings;

#[derive(Parser, Debug, Clone)]
#[command(name = "jobfeed", about = "Multi-provider job aggregation service")]
pub struct Config {
    /// Database connection URL for the persistence sink. Without it the
    /// service serves searches without persisting them.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// Run database migrations on startup
    #[arg(long, env = "RUN_MIGRATIONS", default_value = "true")]
    pub run_migrations: bool,

    /// Response cache TTL in seconds. Short on purpose: listings go stale
    /// fast, a longer TTL only trades freshness for provider-call savings.
    #[arg(long, env = "CACHE_TTL_SECS", default_value = "120")]
    pub cache_ttl_secs: u64,

    /// Consecutive failures before a provider's circuit opens
    #[arg(long, env = "BREAKER_FAILURE_THRESHOLD", default_value = "5")]
    pub breaker_failure_threshold: u32,

    /// Cool-down in seconds before an open circuit allows a trial call
    #[arg(long, env = "BREAKER_COOLDOWN_SECS", default_value = "60")]
    pub breaker_cooldown_secs: u64,

    /// Re-upsert records whose fingerprint already exists in the sink,
    /// instead of skipping them
    #[arg(long, env = "REFRESH_EXISTING", default_value = "false")]
    pub refresh_existing: bool,

    #[command(flatten)]
    pub credentials: ProviderCredentials,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Per-provider API credentials. A provider with missing credentials is left
/// out of the adapter registry.
#[derive(clap::Args, Debug, Clone)]
pub struct ProviderCredentials {
    #[arg(long, env = "ADZUNA_APP_ID")]
    pub adzuna_app_id: Option<String>,

    #[arg(long, env = "ADZUNA_APP_KEY")]
    pub adzuna_app_key: Option<String>,

    #[arg(long, env = "RAPIDAPI_KEY")]
    pub rapidapi_key: Option<String>,

    #[arg(long, env = "JOOBLE_API_KEY")]
    pub jooble_api_key: Option<String>,
}

#[derive(clap::Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the web server (default when no subcommand given)
    Serve {
        /// Listen address
        #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
        listen_addr: String,
    },
    /// Run a batch import: aggregate and persist for each query x country
    Import {
        /// Search query, repeatable
        #[arg(long = "query", required = true)]
        queries: Vec<String>,

        /// ISO-3166 alpha-2 country code, repeatable
        #[arg(long = "country", default_value = "in")]
        countries: Vec<String>,

        /// Pages to fetch per query
        #[arg(long, default_value = "1")]
        pages: u32,

        /// Location filter passed to every provider
        #[arg(long, default_value = "")]
        location: String,
    },
}

impl Config {
    /// Resolve the command, defaulting to Serve if none specified.
    pub fn resolved_command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve {
            listen_addr: std::env::var("LISTEN_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
        })
    }

    pub fn aggregator_settings(&self) -> AggregatorSettings {
        AggregatorSettings {
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            failure_threshold: self.breaker_failure_threshold,
            cooldown: Duration::from_secs(self.breaker_cooldown_secs),
            refresh_existing: self.refresh_existing,
        }
    }
}

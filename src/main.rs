//! Feed Ranker: binary entrypoint.
//! Boots the Axum HTTP server, wiring configuration, shared state, and metrics.

use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use feed_ranker::config::AppConfig;
use feed_ranker::metrics::Metrics;

/// Compact logs by default, JSON with `FEED_LOG_JSON=1`.
/// Leaves an already installed subscriber (e.g. the runtime's) in place.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("feed_ranker=info,warn"));
    let json = std::env::var("FEED_LOG_JSON").is_ok_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    init_tracing();

    let config = AppConfig::load()?;
    let metrics = Metrics::init(config.cache.idle_ttl_secs)?;
    let state = feed_ranker::app_state(&config)?;

    let router = feed_ranker::router(state).merge(metrics.router());
    Ok(router.into())
}

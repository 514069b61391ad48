//! Trend Monitor: binary entrypoint.
//! Boots the Axum HTTP server around the hot-search engine: config, cache
//! sweeper, Prometheus metrics and routes.

use std::sync::Arc;

use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use trendmonitor::{metrics::Metrics, EngineConfig, HotSearchEngine};

/// Compact logs by default; `LOG_FORMAT=json` switches to JSON lines.
/// A subscriber already installed by the host runtime wins.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("trendmonitor=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    let res = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    init_tracing();

    let cfg = EngineConfig::load().map_err(shuttle_runtime::Error::Custom)?;
    tracing::info!(
        base_url = %cfg.base_url,
        ttl_ms = cfg.cache_ttl_ms,
        batch_size = cfg.batch_size,
        batch_delay_ms = cfg.batch_delay_ms,
        "engine config loaded"
    );

    let engine = Arc::new(HotSearchEngine::from_config(&cfg).map_err(shuttle_runtime::Error::Custom)?);
    engine.start();

    let metrics = Metrics::init(&cfg).map_err(shuttle_runtime::Error::Custom)?;
    let router = trendmonitor::app(engine).merge(metrics.router());

    Ok(router.into())
}

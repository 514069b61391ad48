use anyhow::Context;
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

use crate::config::EngineConfig;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder and publish static config gauges.
    pub fn init(cfg: &EngineConfig) -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;

        describe_metrics();
        gauge!("hotsearch_cache_ttl_ms").set(cfg.cache_ttl_ms as f64);
        gauge!("hotsearch_batch_size").set(cfg.batch_size as f64);

        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

/// One-time metrics registration (so series show up on /metrics).
pub fn describe_metrics() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "hotsearch_fetch_total",
            "Per-source fetches, labelled by source and outcome status."
        );
        describe_counter!(
            "hotsearch_cache_hits_total",
            "Fetches served from a fresh cache entry."
        );
        describe_counter!(
            "hotsearch_retries_total",
            "Upstream retries triggered by HTTP 429."
        );
        describe_counter!(
            "hotsearch_cache_evictions_total",
            "Cache entries evicted by the size bound."
        );
        describe_histogram!("hotsearch_fetch_ms", "Per-source fetch time in milliseconds.");
        describe_gauge!("hotsearch_cache_entries", "Current number of cached sources.");
        describe_gauge!("hotsearch_cache_ttl_ms", "Configured cache freshness window.");
        describe_gauge!("hotsearch_batch_size", "Configured fetch batch size.");
    });
}

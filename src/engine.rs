//! # Hot-Search Engine
//! Drives a [`TrendFetcher`] across many sources with bounded concurrency:
//! sources are split into fixed-size batches, each batch is fetched
//! concurrently and fully awaited, and a pacing delay separates batches.
//!
//! Output preserves request order regardless of completion order inside a
//! batch. The engine owns the [`SourceCache`] and its sweeper lifecycle.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::cache::SourceCache;
use crate::config::EngineConfig;
use crate::fetcher::{TrendFetcher, UapiFetcher};
use crate::filter::{self, FilterCriteria};
use crate::source::Source;
use crate::types::{CacheStat, SourceReport, TrendItem};

pub struct HotSearchEngine {
    cache: Arc<SourceCache>,
    fetcher: Arc<dyn TrendFetcher>,
    batch_size: usize,
    batch_delay: Duration,
    deadline: Option<Duration>,
    sweep_interval: Duration,
}

impl HotSearchEngine {
    /// Production wiring: cache + HTTP fetcher from config. Call
    /// [`start`](Self::start) inside a tokio runtime to run the sweeper.
    pub fn from_config(cfg: &EngineConfig) -> anyhow::Result<Self> {
        let cache = Arc::new(SourceCache::new(cfg.cache_ttl(), cfg.cache_max_entries));
        let fetcher = UapiFetcher::new(cfg, cache.clone())?;
        Ok(Self::with_fetcher(cfg, cache, Arc::new(fetcher)))
    }

    /// Wire an arbitrary fetcher; `cache` should be the one the fetcher writes.
    pub fn with_fetcher(
        cfg: &EngineConfig,
        cache: Arc<SourceCache>,
        fetcher: Arc<dyn TrendFetcher>,
    ) -> Self {
        Self {
            cache,
            fetcher,
            batch_size: cfg.batch_size.max(1),
            batch_delay: cfg.batch_delay(),
            deadline: cfg.overall_deadline(),
            sweep_interval: cfg.sweep_interval(),
        }
    }

    /// Start the background cache sweeper.
    pub fn start(&self) {
        self.cache.start_sweeper(self.sweep_interval);
    }

    /// Stop background work. Cached data stays readable.
    pub fn shutdown(&self) {
        self.cache.shutdown();
    }

    pub fn cache(&self) -> &Arc<SourceCache> {
        &self.cache
    }

    pub async fn fetch_one(&self, source: Source, force_refresh: bool) -> Vec<TrendItem> {
        self.fetcher.fetch(source, force_refresh).await
    }

    pub async fn fetch_report(&self, source: Source, force_refresh: bool) -> SourceReport {
        self.fetcher.fetch_report(source, force_refresh).await
    }

    /// Concatenated items for `sources`, in request order.
    pub async fn fetch_many(&self, sources: &[Source], force_refresh: bool) -> Vec<TrendItem> {
        self.fetch_many_reports(sources, force_refresh)
            .await
            .into_iter()
            .flat_map(|r| r.items)
            .collect()
    }

    pub async fn fetch_all(&self, force_refresh: bool) -> Vec<TrendItem> {
        self.fetch_many(&Self::list_known_sources(), force_refresh)
            .await
    }

    /// One report per source, in request order. Sources in batches that
    /// would start past the overall deadline are omitted.
    pub async fn fetch_many_reports(
        &self,
        sources: &[Source],
        force_refresh: bool,
    ) -> Vec<SourceReport> {
        let (expired, evicted) = self.cache.maintain();
        if expired + evicted > 0 {
            debug!(target: "engine", expired, evicted, "cache maintenance before fetch");
        }

        let started = tokio::time::Instant::now();
        let batches: Vec<&[Source]> = sources.chunks(self.batch_size).collect();
        let total = batches.len();
        let mut out = Vec::with_capacity(sources.len());

        for (idx, batch) in batches.into_iter().enumerate() {
            let futs = batch
                .iter()
                .map(|s| self.fetcher.fetch_report(*s, force_refresh));
            out.extend(join_all(futs).await);

            if idx + 1 == total {
                break;
            }
            // The next batch would start after the pause; skip the pause too
            // when that start would already be past the deadline.
            if let Some(deadline) = self.deadline {
                if started.elapsed() + self.batch_delay >= deadline {
                    let skipped = sources.len() - out.len();
                    warn!(
                        target: "engine",
                        skipped,
                        deadline_ms = deadline.as_millis() as u64,
                        "overall deadline reached, skipping remaining batches"
                    );
                    break;
                }
            }
            tokio::time::sleep(self.batch_delay).await;
        }

        let failed = out.iter().filter(|r| r.status.is_failure()).count();
        info!(
            target: "engine",
            sources = sources.len(),
            reported = out.len(),
            failed,
            force_refresh,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "fetch round complete"
        );
        out
    }

    pub fn filter(items: Vec<TrendItem>, criteria: &FilterCriteria) -> Vec<TrendItem> {
        filter::filter(items, criteria)
    }

    pub fn group_by_source(items: Vec<TrendItem>) -> BTreeMap<Source, Vec<TrendItem>> {
        filter::group_by_source(items)
    }

    pub fn list_known_sources() -> Vec<Source> {
        Source::all()
    }

    pub fn cache_stats(&self) -> BTreeMap<Source, CacheStat> {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

impl Drop for HotSearchEngine {
    fn drop(&mut self) {
        self.cache.shutdown();
    }
}

// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod cache;
pub mod config;
pub mod engine;
pub mod fetcher;
pub mod filter;
pub mod metrics;
pub mod score;
pub mod source;
pub mod types;

// ---- Re-exports for stable public API ----
pub use crate::cache::SourceCache;
pub use crate::config::EngineConfig;
pub use crate::engine::HotSearchEngine;
pub use crate::fetcher::{TrendFetcher, UapiFetcher};
pub use crate::filter::FilterCriteria;
pub use crate::score::{normalize_score, RawScore};
pub use crate::source::Source;
pub use crate::types::{CacheEntry, CacheStat, FetchStatus, SourceReport, TrendItem};

use std::sync::Arc;

/// Build the HTTP router around an engine (no `/metrics`; see [`metrics::Metrics`]).
pub fn app(engine: Arc<HotSearchEngine>) -> axum::Router {
    api::router(api::AppState { engine })
}

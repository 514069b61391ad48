// src/types.rs
use serde::{Deserialize, Serialize};

use crate::source::Source;

/// One trending entry from one source at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendItem {
    pub id: String,            // "{source}-{fetched_at}-{index}"
    pub rank: u32,             // 1-based, dense within one fetch
    pub title: String,         // never empty
    pub score: u64,            // canonical heat; 0 = absent/unparseable
    pub source: Source,
    pub url: String,           // "#" = no link
    pub category: Option<String>,
    pub fetched_at: i64,       // epoch millis
}

/// Whole-entry cache value for one source.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub items: Vec<TrendItem>,
    pub cached_at: i64, // epoch millis
    pub(crate) seq: u64,
}

/// How a per-source fetch ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "reason", rename_all = "camelCase")]
pub enum FetchStatus {
    /// Served from a fresh cache entry.
    Cached,
    /// Fetched from upstream and written to the cache.
    Fetched,
    /// Upstream answered but the envelope carried no list.
    NoData,
    /// Configuration gap or transient failure.
    Failed(String),
}

impl FetchStatus {
    pub fn label(&self) -> &'static str {
        match self {
            FetchStatus::Cached => "cached",
            FetchStatus::Fetched => "fetched",
            FetchStatus::NoData => "no_data",
            FetchStatus::Failed(_) => "failed",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, FetchStatus::Failed(_))
    }
}

/// Items plus the status that produced them.
#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub source: Source,
    pub status: FetchStatus,
    pub items: Vec<TrendItem>,
}

impl SourceReport {
    pub fn empty(source: Source, status: FetchStatus) -> Self {
        Self {
            source,
            status,
            items: Vec::new(),
        }
    }
}

/// Per-source cache observability row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStat {
    pub count: usize,
    pub age_ms: i64,
}

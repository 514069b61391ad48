//! # Source Cache
//! Bounded, TTL-based store of per-source result sets.
//!
//! - Whole-entry replace on `put`; readers get a cloned entry, never a partial one.
//! - `sweep_expired` drops entries past their freshness window.
//! - `enforce_max_size` evicts oldest-by-write entries until under the bound.
//! - An optional background sweeper runs both on an interval until `shutdown()`.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Duration;

use metrics::{counter, gauge};
use tokio::task::JoinHandle;

use crate::source::Source;
use crate::types::{CacheEntry, CacheStat, TrendItem};

/// Thread-safe per-source cache.
#[derive(Debug)]
pub struct SourceCache {
    inner: RwLock<Inner>,
    ttl: Duration,
    max_entries: usize,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<Source, CacheEntry>,
    /// Monotonic write counter; breaks `cached_at` ties on eviction.
    next_seq: u64,
}

impl SourceCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            ttl,
            max_entries: max_entries.max(1),
            sweeper: Mutex::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn get(&self, source: Source) -> Option<CacheEntry> {
        self.read().entries.get(&source).cloned()
    }

    /// Items for `source` if its entry is still inside the freshness window.
    pub fn get_fresh(&self, source: Source) -> Option<Vec<TrendItem>> {
        let guard = self.read();
        let entry = guard.entries.get(&source)?;
        if Self::is_fresh(entry, self.ttl) {
            Some(entry.items.clone())
        } else {
            None
        }
    }

    /// Store `items` for `source`, replacing any previous entry.
    pub fn put(&self, source: Source, items: Vec<TrendItem>) {
        self.put_at(source, items, now_ms());
    }

    pub(crate) fn put_at(&self, source: Source, items: Vec<TrendItem>, cached_at: i64) {
        let mut guard = self.write();
        let seq = guard.next_seq;
        guard.next_seq += 1;
        guard.entries.insert(
            source,
            CacheEntry {
                items,
                cached_at,
                seq,
            },
        );
        gauge!("hotsearch_cache_entries").set(guard.entries.len() as f64);
    }

    pub fn is_fresh(entry: &CacheEntry, ttl: Duration) -> bool {
        Self::is_fresh_at(entry, ttl, now_ms())
    }

    pub fn is_fresh_at(entry: &CacheEntry, ttl: Duration, now: i64) -> bool {
        let age = now.saturating_sub(entry.cached_at);
        age < ttl.as_millis() as i64
    }

    /// Remove every entry whose freshness window has elapsed. Returns the
    /// number removed.
    pub fn sweep_expired(&self, ttl: Duration) -> usize {
        let now = now_ms();
        let mut guard = self.write();
        let before = guard.entries.len();
        guard
            .entries
            .retain(|_, entry| Self::is_fresh_at(entry, ttl, now));
        let removed = before - guard.entries.len();
        gauge!("hotsearch_cache_entries").set(guard.entries.len() as f64);
        removed
    }

    /// Evict the oldest-written entries until at most `max_entries` remain.
    /// Returns the number evicted.
    pub fn enforce_max_size(&self, max_entries: usize) -> usize {
        let mut guard = self.write();
        let len = guard.entries.len();
        if len <= max_entries {
            return 0;
        }

        let mut by_age: Vec<(i64, u64, Source)> = guard
            .entries
            .iter()
            .map(|(s, e)| (e.cached_at, e.seq, *s))
            .collect();
        by_age.sort_unstable();

        let excess = len - max_entries;
        for (_, _, source) in by_age.into_iter().take(excess) {
            guard.entries.remove(&source);
        }

        counter!("hotsearch_cache_evictions_total").increment(excess as u64);
        gauge!("hotsearch_cache_entries").set(guard.entries.len() as f64);
        excess
    }

    /// Sweep with the configured TTL, then apply the configured bound.
    pub fn maintain(&self) -> (usize, usize) {
        let expired = self.sweep_expired(self.ttl);
        let evicted = self.enforce_max_size(self.max_entries);
        (expired, evicted)
    }

    pub fn stats(&self) -> BTreeMap<Source, CacheStat> {
        let now = now_ms();
        self.read()
            .entries
            .iter()
            .map(|(s, e)| {
                (
                    *s,
                    CacheStat {
                        count: e.items.len(),
                        age_ms: now.saturating_sub(e.cached_at),
                    },
                )
            })
            .collect()
    }

    pub fn clear(&self) {
        self.write().entries.clear();
        gauge!("hotsearch_cache_entries").set(0.0);
        tracing::info!(target: "cache", "cache cleared");
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spawn the periodic sweeper. The task holds only a weak reference, so
    /// dropping the last `Arc` also ends it. Calling twice replaces the old task.
    pub fn start_sweeper(self: &Arc<Self>, every: Duration) {
        let weak: Weak<Self> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // First tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = weak.upgrade() else {
                    break;
                };
                let (expired, evicted) = cache.maintain();
                tracing::debug!(target: "cache", expired, evicted, "cache sweep");
            }
        });

        let mut slot = lock_recover(&self.sweeper);
        if let Some(old) = slot.replace(handle) {
            old.abort();
        }
        tracing::info!(target: "cache", every_ms = every.as_millis() as u64, "cache sweeper started");
    }

    /// Stop the background sweeper, if any.
    pub fn shutdown(&self) {
        if let Some(handle) = lock_recover(&self.sweeper).take() {
            handle.abort();
            tracing::info!(target: "cache", "cache sweeper stopped");
        }
    }

    pub fn sweeper_running(&self) -> bool {
        lock_recover(&self.sweeper)
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        match self.inner.read() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        match self.inner.write() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        }
    }
}

impl Drop for SourceCache {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.sweeper.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }
}

fn lock_recover<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match m.lock() {
        Ok(g) => g,
        Err(poison) => poison.into_inner(),
    }
}

/// Current UNIX time in milliseconds.
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(source: Source, rank: u32) -> TrendItem {
        TrendItem {
            id: format!("{source}-0-{rank}"),
            rank,
            title: format!("t{rank}"),
            score: 10 * rank as u64,
            source,
            url: "#".into(),
            category: None,
            fetched_at: 0,
        }
    }

    #[test]
    fn put_then_get_returns_same_items() {
        let cache = SourceCache::new(Duration::from_secs(60), 50);
        let items = vec![item(Source::Weibo, 1), item(Source::Weibo, 2)];
        cache.put(Source::Weibo, items.clone());
        assert_eq!(cache.get(Source::Weibo).unwrap().items, items);
        assert_eq!(cache.get_fresh(Source::Weibo), Some(items));
        assert!(cache.get(Source::Zhihu).is_none());
    }

    #[test]
    fn put_replaces_whole_entry() {
        let cache = SourceCache::new(Duration::from_secs(60), 50);
        cache.put(Source::Weibo, vec![item(Source::Weibo, 1), item(Source::Weibo, 2)]);
        cache.put(Source::Weibo, vec![item(Source::Weibo, 1)]);
        assert_eq!(cache.get(Source::Weibo).unwrap().items.len(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn freshness_boundary_is_exclusive() {
        let ttl = Duration::from_millis(1000);
        let entry = CacheEntry {
            items: vec![],
            cached_at: 10_000,
            seq: 0,
        };
        assert!(SourceCache::is_fresh_at(&entry, ttl, 10_999));
        assert!(!SourceCache::is_fresh_at(&entry, ttl, 11_000));
    }

    #[test]
    fn sweep_removes_only_stale_entries() {
        let cache = SourceCache::new(Duration::from_secs(60), 50);
        let now = now_ms();
        cache.put_at(Source::Weibo, vec![item(Source::Weibo, 1)], now - 120_000);
        cache.put_at(Source::Zhihu, vec![item(Source::Zhihu, 1)], now);

        assert!(cache.get_fresh(Source::Weibo).is_none());
        let removed = cache.sweep_expired(Duration::from_secs(60));
        assert_eq!(removed, 1);
        assert!(cache.get(Source::Weibo).is_none());
        assert!(cache.get(Source::Zhihu).is_some());
    }

    #[test]
    fn bound_keeps_most_recent_writes() {
        let cache = SourceCache::new(Duration::from_secs(60), 3);
        let sources = Source::all();
        // Same timestamp for all: write order alone decides.
        for s in sources.iter().take(5) {
            cache.put_at(*s, vec![item(*s, 1)], 1_000);
        }
        let evicted = cache.enforce_max_size(3);
        assert_eq!(evicted, 2);
        assert_eq!(cache.len(), 3);
        for s in sources.iter().take(2) {
            assert!(cache.get(*s).is_none(), "{s} should be evicted");
        }
        for s in sources.iter().skip(2).take(3) {
            assert!(cache.get(*s).is_some(), "{s} should survive");
        }
    }

    #[test]
    fn eviction_prefers_older_cached_at() {
        let cache = SourceCache::new(Duration::from_secs(60), 1);
        cache.put_at(Source::Weibo, vec![], 2_000);
        cache.put_at(Source::Zhihu, vec![], 1_000); // written later, but older stamp
        cache.enforce_max_size(1);
        assert!(cache.get(Source::Weibo).is_some());
        assert!(cache.get(Source::Zhihu).is_none());
    }

    #[test]
    fn stats_and_clear() {
        let cache = SourceCache::new(Duration::from_secs(60), 50);
        cache.put(Source::Baidu, vec![item(Source::Baidu, 1), item(Source::Baidu, 2)]);
        let stats = cache.stats();
        assert_eq!(stats[&Source::Baidu].count, 2);
        assert!(stats[&Source::Baidu].age_ms >= 0);
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.stats().is_empty());
    }

    #[test]
    fn concurrent_puts_and_sweeps_do_not_tear() {
        let cache = Arc::new(SourceCache::new(Duration::from_secs(60), 50));
        let mut handles = Vec::new();
        for (i, s) in Source::all().into_iter().enumerate() {
            let c = cache.clone();
            handles.push(std::thread::spawn(move || {
                let n = (i % 5) as u32 + 1;
                for _ in 0..50 {
                    let items: Vec<_> = (1..=n).map(|r| item(s, r)).collect();
                    c.put(s, items);
                    if let Some(e) = c.get(s) {
                        assert_eq!(e.items.len(), n as usize);
                    }
                    c.maintain();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cache.len(), Source::all().len());
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_evicts_stale_entries_and_stops_on_shutdown() {
        let cache = Arc::new(SourceCache::new(Duration::from_secs(60), 50));
        cache.put_at(Source::Weibo, vec![], now_ms() - 120_000);
        cache.start_sweeper(Duration::from_secs(1));
        assert!(cache.sweeper_running());

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(cache.get(Source::Weibo).is_none());

        cache.shutdown();
        assert!(!cache.sweeper_running());
    }
}

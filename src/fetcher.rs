//! # Source Fetcher
//! One upstream call for one source, behind the cache.
//!
//! Never fails outward: every network, status or shape problem ends as an
//! empty item list plus a log line and a `hotsearch_fetch_total` sample.
//! Only HTTP 429 is retried, with a linear-growth backoff plus jitter.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use metrics::{counter, histogram};
use rand::Rng;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::cache::{now_ms, SourceCache};
use crate::config::EngineConfig;
use crate::score::{normalize_score, RawScore};
use crate::source::{default_query_table, QueryTable, Source};
use crate::types::{FetchStatus, SourceReport, TrendItem};

pub const TITLE_PLACEHOLDER: &str = "未知标题";
pub const CATEGORY_PLACEHOLDER: &str = "热点";
pub const URL_PLACEHOLDER: &str = "#";

/// Anything that can produce one source's items.
#[async_trait]
pub trait TrendFetcher: Send + Sync {
    async fn fetch_report(&self, source: Source, force_refresh: bool) -> SourceReport;

    async fn fetch(&self, source: Source, force_refresh: bool) -> Vec<TrendItem> {
        self.fetch_report(source, force_refresh).await.items
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("no upstream mapping for {0}")]
    UnknownSource(Source),
    #[error("request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("upstream status {0}")]
    Status(u16),
    #[error("rate limited, gave up after {retries} retries")]
    RateLimited { retries: u32 },
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Transport(e)
        }
    }
}

/// Backoff schedule for 429 responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base: Duration,
    pub jitter: Duration,
}

impl RetryPolicy {
    pub fn from_config(cfg: &EngineConfig) -> Self {
        Self {
            max_retries: cfg.max_retries,
            base: Duration::from_millis(cfg.retry_base_ms),
            jitter: Duration::from_millis(cfg.retry_jitter_ms),
        }
    }

    /// Deterministic part of the delay before retry number `attempt` (0-based):
    /// `(attempt + 1) * base`.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        self.base.saturating_mul(attempt + 1)
    }

    /// `base_delay(attempt)` plus uniform jitter in `[0, jitter]`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let extra = if jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..=jitter_ms)
        };
        self.base_delay(attempt) + Duration::from_millis(extra)
    }

    /// Upper bound on total sleep when every attempt is rate limited.
    pub fn max_total_delay(&self) -> Duration {
        (0..self.max_retries)
            .map(|a| self.base_delay(a) + self.jitter)
            .sum()
    }
}

/// The known upstream response shapes, tried in order.
#[derive(Debug, PartialEq)]
pub enum Envelope {
    /// `{"data": {"list": [...]}}`
    Nested(Vec<Value>),
    /// `{"list": [...]}`
    FlatList(Vec<Value>),
    /// `{"data": [...]}`
    FlatData(Vec<Value>),
    Unrecognized,
}

impl Envelope {
    pub fn sniff(body: Value) -> Envelope {
        let Value::Object(mut root) = body else {
            return Envelope::Unrecognized;
        };

        let nested = root
            .get("data")
            .and_then(|d| d.get("list"))
            .is_some_and(Value::is_array);
        if nested {
            if let Some(Value::Array(list)) = root
                .get_mut("data")
                .and_then(|d| d.get_mut("list"))
                .map(Value::take)
            {
                return Envelope::Nested(list);
            }
        }
        if let Some(Value::Array(list)) = root.remove("list") {
            return Envelope::FlatList(list);
        }
        if let Some(Value::Array(list)) = root.remove("data") {
            return Envelope::FlatData(list);
        }
        Envelope::Unrecognized
    }

    pub fn into_list(self) -> Option<Vec<Value>> {
        match self {
            Envelope::Nested(l) | Envelope::FlatList(l) | Envelope::FlatData(l) => Some(l),
            Envelope::Unrecognized => None,
        }
    }
}

/// One raw upstream entry. Values stay untyped: sources disagree on types.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UpstreamItem {
    title: Option<Value>,
    hot_value: Option<Value>,
    hot: Option<Value>,
    heat: Option<Value>,
    score: Option<Value>,
    value: Option<Value>,
    url: Option<Value>,
    link: Option<Value>,
    #[serde(rename = "mobileUrl")]
    mobile_url: Option<Value>,
    category: Option<Value>,
}

impl UpstreamItem {
    /// First present heat field, in fixed priority order.
    fn raw_score(&self) -> Option<RawScore> {
        [&self.hot_value, &self.hot, &self.heat, &self.score, &self.value]
            .into_iter()
            .flatten()
            .find_map(RawScore::from_json)
    }

    fn link(&self) -> Option<String> {
        [&self.url, &self.link, &self.mobile_url]
            .into_iter()
            .flatten()
            .find_map(text_of)
    }
}

fn text_of(v: &Value) -> Option<String> {
    let s = match v {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!s.is_empty()).then_some(s)
}

/// Title as received; only a missing or blank title is absent.
fn title_of(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Map a parsed upstream list to items: dense 1-based ranks in list order.
pub fn map_items(source: Source, list: Vec<Value>, fetched_at: i64) -> Vec<TrendItem> {
    list.into_iter()
        .enumerate()
        .map(|(idx, raw)| {
            let up: UpstreamItem = serde_json::from_value(raw).unwrap_or_default();
            let title = up
                .title
                .as_ref()
                .and_then(title_of)
                .unwrap_or_else(|| TITLE_PLACEHOLDER.to_string());
            TrendItem {
                id: format!("{source}-{fetched_at}-{idx}"),
                rank: idx as u32 + 1,
                title,
                score: normalize_score(up.raw_score().as_ref()),
                source,
                url: up.link().unwrap_or_else(|| URL_PLACEHOLDER.to_string()),
                category: Some(
                    up.category
                        .as_ref()
                        .and_then(text_of)
                        .unwrap_or_else(|| CATEGORY_PLACEHOLDER.to_string()),
                ),
                fetched_at,
            }
        })
        .collect()
}

/// Fetcher for the shared hot-board endpoint (`{base_url}?type={query_id}`).
pub struct UapiFetcher {
    http: reqwest::Client,
    base_url: String,
    queries: QueryTable,
    cache: Arc<SourceCache>,
    retry: RetryPolicy,
}

impl UapiFetcher {
    pub fn new(cfg: &EngineConfig, cache: Arc<SourceCache>) -> anyhow::Result<Self> {
        let timeout = cfg.request_timeout();
        let http = reqwest::Client::builder()
            .user_agent(concat!("trendmonitor/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(timeout.min(Duration::from_secs(5)))
            .timeout(timeout)
            .build()
            .context("building upstream http client")?;
        Ok(Self {
            http,
            base_url: cfg.base_url.clone(),
            queries: default_query_table(),
            cache,
            retry: RetryPolicy::from_config(cfg),
        })
    }

    /// Replace the source → query id table.
    pub fn with_query_table(mut self, queries: QueryTable) -> Self {
        self.queries = queries;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    async fn request_envelope(&self, source: Source, query_id: &str) -> Result<Envelope, FetchError> {
        let mut retries = 0u32;
        loop {
            let resp = self
                .http
                .get(&self.base_url)
                .query(&[("type", query_id)])
                .send()
                .await?;

            let status = resp.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                if retries >= self.retry.max_retries {
                    return Err(FetchError::RateLimited { retries });
                }
                let delay = self.retry.delay(retries);
                warn!(
                    source = %source,
                    attempt = retries + 1,
                    delay_ms = delay.as_millis() as u64,
                    "rate limited (429), retrying"
                );
                counter!("hotsearch_retries_total").increment(1);
                tokio::time::sleep(delay).await;
                retries += 1;
                continue;
            }
            if !status.is_success() {
                return Err(FetchError::Status(status.as_u16()));
            }

            let body = resp.bytes().await?;
            return Ok(match serde_json::from_slice::<Value>(&body) {
                Ok(v) => Envelope::sniff(v),
                Err(e) => {
                    debug!(source = %source, error = %e, "response body is not json");
                    Envelope::Unrecognized
                }
            });
        }
    }

    async fn fetch_inner(&self, source: Source, force_refresh: bool) -> SourceReport {
        if !force_refresh {
            if let Some(items) = self.cache.get_fresh(source) {
                debug!(source = %source, "cache hit");
                counter!("hotsearch_cache_hits_total").increment(1);
                return SourceReport {
                    source,
                    status: FetchStatus::Cached,
                    items,
                };
            }
        }

        let Some(query_id) = self.queries.get(&source) else {
            let e = FetchError::UnknownSource(source);
            warn!(source = %source, "{e}");
            return SourceReport::empty(source, FetchStatus::Failed(e.to_string()));
        };

        match self.request_envelope(source, query_id).await {
            Ok(envelope) => match envelope.into_list() {
                Some(list) => {
                    let items = map_items(source, list, now_ms());
                    self.cache.put(source, items.clone());
                    SourceReport {
                        source,
                        status: FetchStatus::Fetched,
                        items,
                    }
                }
                None => {
                    debug!(source = %source, "unexpected response envelope, treating as no data");
                    SourceReport::empty(source, FetchStatus::NoData)
                }
            },
            Err(e) => {
                match &e {
                    FetchError::Timeout => error!(source = %source, "fetch timeout"),
                    other => error!(source = %source, error = %other, "fetch failed"),
                }
                SourceReport::empty(source, FetchStatus::Failed(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl TrendFetcher for UapiFetcher {
    async fn fetch_report(&self, source: Source, force_refresh: bool) -> SourceReport {
        let t0 = Instant::now();
        let report = self.fetch_inner(source, force_refresh).await;

        histogram!("hotsearch_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        counter!(
            "hotsearch_fetch_total",
            "source" => source.as_str(),
            "status" => report.status.label()
        )
        .increment(1);
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_shapes_in_priority_order() {
        let nested = json!({"data": {"list": [{"title": "a"}]}, "list": [1, 2]});
        assert_eq!(Envelope::sniff(nested), Envelope::Nested(vec![json!({"title": "a"})]));

        let flat = json!({"data": {"list": "nope"}, "list": [{"title": "b"}]});
        assert_eq!(Envelope::sniff(flat), Envelope::FlatList(vec![json!({"title": "b"})]));

        let data = json!({"data": [{"title": "c"}]});
        assert_eq!(Envelope::sniff(data), Envelope::FlatData(vec![json!({"title": "c"})]));

        assert_eq!(Envelope::sniff(json!({"data": {"items": []}})), Envelope::Unrecognized);
        assert_eq!(Envelope::sniff(json!([1, 2, 3])), Envelope::Unrecognized);
        assert_eq!(Envelope::sniff(json!({"code": 500})), Envelope::Unrecognized);
    }

    #[test]
    fn mapping_assigns_dense_ranks_and_fallbacks() {
        let list = vec![
            json!({"title": "X", "hot": "8.3万", "url": "https://x"}),
            json!({"title": "Y", "hot": 120000, "category": "社会"}),
            json!({"hot_value": "", "heat": "2w", "mobileUrl": "https://m"}),
            json!("not an object"),
        ];
        let items = map_items(Source::Weibo, list, 1_700_000_000_000);

        assert_eq!(items.len(), 4);
        assert_eq!(
            items.iter().map(|i| i.rank).collect::<Vec<_>>(),
            vec![1, 2, 3, 4]
        );
        assert_eq!(items[0].score, 83_000);
        assert_eq!(items[0].url, "https://x");
        assert_eq!(items[0].category.as_deref(), Some(CATEGORY_PLACEHOLDER));
        assert_eq!(items[1].score, 120_000);
        assert_eq!(items[1].category.as_deref(), Some("社会"));
        assert_eq!(items[2].title, TITLE_PLACEHOLDER);
        assert_eq!(items[2].score, 20_000);
        assert_eq!(items[2].url, "https://m");
        assert_eq!(items[3].title, TITLE_PLACEHOLDER);
        assert_eq!(items[3].score, 0);
        assert_eq!(items[3].url, URL_PLACEHOLDER);
        assert_eq!(items[0].id, "Weibo-1700000000000-0");
        assert!(items.iter().all(|i| i.fetched_at == 1_700_000_000_000));
    }

    #[test]
    fn score_field_priority() {
        let list = vec![json!({"hot_value": "1万", "hot": 5, "score": 7})];
        assert_eq!(map_items(Source::Zhihu, list, 0)[0].score, 10_000);
        let list = vec![json!({"hot": null, "heat": "  ", "score": 7, "value": 9})];
        assert_eq!(map_items(Source::Zhihu, list, 0)[0].score, 7);
        // A zero defers to the next field, and stays 0 when nothing follows.
        let list = vec![json!({"hot_value": 0, "hot": "5万"})];
        assert_eq!(map_items(Source::Zhihu, list, 0)[0].score, 50_000);
        let list = vec![json!({"hot_value": 0})];
        assert_eq!(map_items(Source::Zhihu, list, 0)[0].score, 0);
    }

    #[test]
    fn titles_pass_through_verbatim() {
        let list = vec![
            json!({"title": "Rust <T> 泛型"}),
            json!({"title": "A &amp; B"}),
            json!({"title": "<Vec>"}),
            json!({"title": " 两端空格 "}),
            json!({"title": "   "}),
            json!({"title": null}),
        ];
        let titles: Vec<String> = map_items(Source::Juejin, list, 0)
            .into_iter()
            .map(|i| i.title)
            .collect();
        assert_eq!(
            titles,
            vec![
                "Rust <T> 泛型",
                "A &amp; B",
                "<Vec>",
                " 两端空格 ",
                TITLE_PLACEHOLDER,
                TITLE_PLACEHOLDER,
            ]
        );
    }

    #[test]
    fn backoff_schedule_grows_linearly_with_bounded_jitter() {
        let p = RetryPolicy {
            max_retries: 3,
            base: Duration::from_millis(1500),
            jitter: Duration::from_millis(500),
        };
        assert_eq!(p.base_delay(0), Duration::from_millis(1500));
        assert_eq!(p.base_delay(1), Duration::from_millis(3000));
        assert_eq!(p.base_delay(2), Duration::from_millis(4500));
        for attempt in 0..3 {
            for _ in 0..50 {
                let d = p.delay(attempt);
                assert!(d >= p.base_delay(attempt));
                assert!(d <= p.base_delay(attempt) + p.jitter);
            }
        }
        assert_eq!(p.max_total_delay(), Duration::from_millis(9000 + 1500));
    }

    #[test]
    fn zero_jitter_is_deterministic() {
        let p = RetryPolicy {
            max_retries: 1,
            base: Duration::from_millis(10),
            jitter: Duration::ZERO,
        };
        assert_eq!(p.delay(0), Duration::from_millis(10));
    }
}

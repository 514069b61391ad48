// src/config.rs
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config/hotsearch.toml";
pub const ENV_CONFIG_PATH: &str = "HOTSEARCH_CONFIG_PATH";

pub const DEFAULT_BASE_URL: &str = "https://uapis.cn/api/v1/misc/hotboard";
const DEFAULT_TIMEOUT_MS: u64 = 15_000;

/// Every tunable knob of the aggregation engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upstream endpoint; requests go to `{base_url}?type={query_id}`.
    pub base_url: String,
    pub request_timeout_ms: u64,
    /// Freshness window of a cache entry.
    pub cache_ttl_ms: u64,
    pub cache_max_entries: usize,
    /// Period of the background cache sweep.
    pub sweep_interval_ms: u64,
    /// Sources fetched concurrently per batch.
    pub batch_size: usize,
    /// Pause between batches (not after the last one).
    pub batch_delay_ms: u64,
    /// Retries on HTTP 429 before giving up.
    pub max_retries: u32,
    pub retry_base_ms: u64,
    pub retry_jitter_ms: u64,
    /// Optional wall-clock budget for one multi-source fetch.
    pub overall_deadline_ms: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_ms: DEFAULT_TIMEOUT_MS,
            cache_ttl_ms: 60_000,
            cache_max_entries: 50,
            sweep_interval_ms: 5 * 60 * 1000,
            batch_size: 2,
            batch_delay_ms: 800,
            max_retries: 3,
            retry_base_ms: 1500,
            retry_jitter_ms: 500,
            overall_deadline_ms: None,
        }
    }
}

impl EngineConfig {
    /// Defaults → TOML file → env overrides, then sanitized.
    ///
    /// File lookup:
    /// 1) $HOTSEARCH_CONFIG_PATH (must exist)
    /// 2) config/hotsearch.toml (optional)
    pub fn load() -> Result<Self> {
        let mut cfg = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            Self::load_from_file(&pb)?
        } else {
            let default_p = PathBuf::from(DEFAULT_CONFIG_PATH);
            if default_p.exists() {
                Self::load_from_file(&default_p)?
            } else {
                Self::default()
            }
        };
        cfg.apply_overrides(|k| std::env::var(k).ok());
        Ok(cfg.sanitized())
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading engine config from {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("parsing engine config at {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: EngineConfig = toml::from_str(s)?;
        Ok(cfg.sanitized())
    }

    /// Apply env-style overrides through `get`, so tests can feed a map.
    pub fn apply_overrides<F>(&mut self, get: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = get("UAPI_BASE_URL") {
            let v = v.trim();
            if !v.is_empty() {
                self.base_url = v.to_string();
            }
        }
        override_num(&get, "API_TIMEOUT", &mut self.request_timeout_ms);
        override_num(&get, "CACHE_DURATION", &mut self.cache_ttl_ms);
        override_num(&get, "CACHE_MAX_ENTRIES", &mut self.cache_max_entries);
        override_num(&get, "CACHE_SWEEP_INTERVAL", &mut self.sweep_interval_ms);
        override_num(&get, "FETCH_BATCH_SIZE", &mut self.batch_size);
        override_num(&get, "FETCH_BATCH_DELAY", &mut self.batch_delay_ms);
        override_num(&get, "FETCH_MAX_RETRIES", &mut self.max_retries);
        override_num(&get, "FETCH_RETRY_BASE", &mut self.retry_base_ms);
        override_num(&get, "FETCH_RETRY_JITTER", &mut self.retry_jitter_ms);

        let mut deadline = 0u64;
        override_num(&get, "FETCH_DEADLINE", &mut deadline);
        if deadline > 0 {
            self.overall_deadline_ms = Some(deadline);
        }
    }

    /// Clamp values that would make the engine misbehave.
    pub fn sanitized(mut self) -> Self {
        if self.batch_size == 0 {
            self.batch_size = 1;
        }
        if self.cache_max_entries == 0 {
            self.cache_max_entries = 1;
        }
        if self.request_timeout_ms == 0 {
            self.request_timeout_ms = DEFAULT_TIMEOUT_MS;
        }
        if self.sweep_interval_ms == 0 {
            self.sweep_interval_ms = Self::default().sweep_interval_ms;
        }
        if self.overall_deadline_ms == Some(0) {
            self.overall_deadline_ms = None;
        }
        self.base_url = self.base_url.trim().trim_end_matches('?').to_string();
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn overall_deadline(&self) -> Option<Duration> {
        self.overall_deadline_ms.map(Duration::from_millis)
    }
}

fn override_num<F, T>(get: &F, key: &str, slot: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let Some(raw) = get(key) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(v) => *slot = v,
        Err(_) => tracing::warn!(target: "config", key, value = %raw, "ignoring unparseable override"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::{env, fs};

    #[test]
    fn defaults_match_documented_values() {
        let c = EngineConfig::default();
        assert_eq!(c.cache_ttl(), Duration::from_secs(60));
        assert_eq!(c.cache_max_entries, 50);
        assert_eq!(c.batch_size, 2);
        assert_eq!(c.batch_delay(), Duration::from_millis(800));
        assert_eq!(c.request_timeout(), Duration::from_secs(15));
        assert_eq!(c.max_retries, 3);
        assert_eq!(c.overall_deadline(), None);
    }

    #[test]
    fn toml_partial_keeps_defaults_and_sanitizes() {
        let c = EngineConfig::from_toml_str(
            r#"
batch_size = 0
cache_ttl_ms = 5000
base_url = "http://localhost:9000/hot?"
overall_deadline_ms = 0
"#,
        )
        .unwrap();
        assert_eq!(c.batch_size, 1);
        assert_eq!(c.cache_ttl_ms, 5000);
        assert_eq!(c.base_url, "http://localhost:9000/hot");
        assert_eq!(c.overall_deadline_ms, None);
        assert_eq!(c.batch_delay_ms, 800);
    }

    #[test]
    fn overrides_apply_and_bad_values_are_ignored() {
        let env: HashMap<&str, &str> = [
            ("CACHE_DURATION", "1234"),
            ("FETCH_BATCH_SIZE", "four"),
            ("FETCH_DEADLINE", "20000"),
            ("UAPI_BASE_URL", " http://stub/hot "),
        ]
        .into_iter()
        .collect();
        let mut c = EngineConfig::default();
        c.apply_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(c.cache_ttl_ms, 1234);
        assert_eq!(c.batch_size, 2);
        assert_eq!(c.overall_deadline_ms, Some(20_000));
        assert_eq!(c.base_url, "http://stub/hot");
    }

    #[serial_test::serial]
    #[test]
    fn load_uses_env_path_then_env_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("hotsearch.toml");
        fs::write(&p, "batch_size = 4\nbatch_delay_ms = 100\n").unwrap();

        env::set_var(ENV_CONFIG_PATH, p.display().to_string());
        env::set_var("FETCH_BATCH_DELAY", "250");
        let c = EngineConfig::load().unwrap();
        assert_eq!(c.batch_size, 4);
        assert_eq!(c.batch_delay_ms, 250);

        env::set_var(ENV_CONFIG_PATH, dir.path().join("missing.toml").display().to_string());
        assert!(EngineConfig::load().is_err());

        env::remove_var(ENV_CONFIG_PATH);
        env::remove_var("FETCH_BATCH_DELAY");
    }
}

// src/config.rs
//! Service configuration.
//!
//! Resolution order:
//! 1) `$FEED_CONFIG_PATH` (must exist)
//! 2) `config/feed.toml`
//! 3) built-in defaults
//!
//! `FEED_JITTER_SEED` then overrides `ranking.jitter_seed`.

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ranking::JitterMode;
use crate::source_weights::SourceWeightsConfig;
use crate::users::User;

pub const ENV_CONFIG_PATH: &str = "FEED_CONFIG_PATH";
pub const ENV_JITTER_SEED: &str = "FEED_JITTER_SEED";
pub const DEFAULT_CONFIG_PATH: &str = "config/feed.toml";
pub const DEFAULT_WEIGHTS_PATH: &str = "config/source_weights.json";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub cache: CacheConfig,
    pub fetch: FetchConfig,
    pub ranking: RankingConfig,
    pub sources: SourcesConfig,
    /// Inline weights. When absent, weights come from `weights_path`.
    pub weights: Option<SourceWeightsConfig>,
    pub weights_path: Option<PathBuf>,
    pub rss: RssConfig,
    pub users: Vec<User>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub default_page_size: usize,
    pub max_page_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub idle_ttl_secs: u64,
    pub max_lifetime_secs: u64,
    /// Live sessions kept before the least recently used are evicted.
    pub max_sessions: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            idle_ttl_secs: 30 * 60,
            max_lifetime_secs: 45 * 60,
            max_sessions: 10_000,
        }
    }
}

impl CacheConfig {
    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_secs)
    }

    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub source_timeout_ms: u64,
    pub page_timeout_ms: u64,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            source_timeout_ms: 8_000,
            page_timeout_ms: 10_000,
            user_agent: concat!("feed-ranker/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl FetchConfig {
    pub fn source_timeout(&self) -> Duration {
        Duration::from_millis(self.source_timeout_ms)
    }

    pub fn page_timeout(&self) -> Duration {
        Duration::from_millis(self.page_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    /// Replay the same jitter sequence on every request.
    pub jitter_seed: Option<u64>,
}

/// One upstream page service. A section that only sets `enabled` keeps
/// the source's default `base_url`.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub base_url: String,
    pub enabled: bool,
}

impl Endpoint {
    fn at(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            enabled: true,
        }
    }
}

/// What a `[sources.<name>]` table may carry; missing keys fall back to the
/// per-source default.
#[derive(Debug, Default, Deserialize)]
struct EndpointOverride {
    base_url: Option<String>,
    enabled: Option<bool>,
}

impl EndpointOverride {
    fn over(self, default_url: &str) -> Endpoint {
        Endpoint {
            base_url: self.base_url.unwrap_or_else(|| default_url.to_string()),
            enabled: self.enabled.unwrap_or(true),
        }
    }
}

const HACKER_NEWS_URL: &str = "http://hacker-news-client:3000";
const REDDIT_URL: &str = "https://reddit-client:3001";
const GOOGLE_NEWS_URL: &str = "http://google-news-client:3002";
const TWITTER_URL: &str = "https://twitter-client:3003";
const RSS_URL: &str = "http://rss-client:3004";
const FACEBOOK_URL: &str = "http://facebook-client:3005";

fn endpoint_or<'de, D>(d: D, default_url: &str) -> std::result::Result<Endpoint, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(EndpointOverride::deserialize(d)?.over(default_url))
}

macro_rules! endpoint_field {
    ($de:ident, $default:ident, $url:expr) => {
        fn $default() -> Endpoint {
            Endpoint::at($url)
        }

        fn $de<'de, D>(d: D) -> std::result::Result<Endpoint, D::Error>
        where
            D: serde::Deserializer<'de>,
        {
            endpoint_or(d, $url)
        }
    };
}

endpoint_field!(de_hacker_news, default_hacker_news, HACKER_NEWS_URL);
endpoint_field!(de_reddit, default_reddit, REDDIT_URL);
endpoint_field!(de_google_news, default_google_news, GOOGLE_NEWS_URL);
endpoint_field!(de_facebook, default_facebook, FACEBOOK_URL);
endpoint_field!(de_twitter, default_twitter, TWITTER_URL);
endpoint_field!(de_rss, default_rss, RSS_URL);

#[derive(Debug, Clone, Deserialize)]
pub struct SourcesConfig {
    #[serde(default = "default_hacker_news", deserialize_with = "de_hacker_news")]
    pub hacker_news: Endpoint,
    #[serde(default = "default_reddit", deserialize_with = "de_reddit")]
    pub reddit: Endpoint,
    #[serde(default = "default_google_news", deserialize_with = "de_google_news")]
    pub google_news: Endpoint,
    #[serde(default = "default_facebook", deserialize_with = "de_facebook")]
    pub facebook: Endpoint,
    #[serde(default = "default_twitter", deserialize_with = "de_twitter")]
    pub twitter: Endpoint,
    #[serde(default = "default_rss", deserialize_with = "de_rss")]
    pub rss: Endpoint,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            hacker_news: default_hacker_news(),
            reddit: default_reddit(),
            google_news: default_google_news(),
            facebook: default_facebook(),
            twitter: default_twitter(),
            rss: default_rss(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RssConfig {
    /// Groups served to anonymous requests: group name → feed URLs.
    pub groups: BTreeMap<String, Vec<String>>,
}

impl AppConfig {
    /// Load from an explicit TOML file, then apply env overrides.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let mut cfg: AppConfig =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load using env var + fallbacks (see module docs).
    pub fn load() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::from_path(&pb);
            }
            return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
        }
        let default_p = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default_p.exists() {
            return Self::from_path(&default_p);
        }
        let mut cfg = Self::default();
        cfg.apply_env()?;
        Ok(cfg)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(raw) = std::env::var(ENV_JITTER_SEED) {
            let seed = raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("{ENV_JITTER_SEED} must be an unsigned integer"))?;
            self.ranking.jitter_seed = Some(seed);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let s = &self.server;
        if s.max_page_size == 0 || s.default_page_size == 0 || s.default_page_size > s.max_page_size {
            bail!(
                "server: need 1 <= default_page_size ({}) <= max_page_size ({})",
                s.default_page_size,
                s.max_page_size
            );
        }
        let c = &self.cache;
        if c.idle_ttl_secs == 0 || c.max_lifetime_secs == 0 || c.max_sessions == 0 {
            bail!("cache: TTLs and max_sessions must be positive");
        }
        if self.fetch.source_timeout_ms == 0 || self.fetch.page_timeout_ms == 0 {
            bail!("fetch: timeouts must be positive");
        }
        Ok(())
    }

    /// JSON weights file, or `None` when weights are configured inline.
    pub fn weights_file(&self) -> Option<PathBuf> {
        if self.weights.is_some() {
            return None;
        }
        Some(
            self.weights_path
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_WEIGHTS_PATH)),
        )
    }

    pub fn source_weights(&self) -> SourceWeightsConfig {
        match (&self.weights, self.weights_file()) {
            (Some(inline), _) => inline.clone(),
            (None, Some(path)) => SourceWeightsConfig::load_from_file(path),
            (None, None) => SourceWeightsConfig::default_seed(),
        }
    }

    pub fn jitter_mode(&self) -> JitterMode {
        match self.ranking.jitter_seed {
            Some(seed) => JitterMode::Seeded(seed),
            None => JitterMode::Random,
        }
    }
}

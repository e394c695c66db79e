// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod builder;
pub mod config;
pub mod continuation;
pub mod error;
pub mod feed;
pub mod metrics;
pub mod post;
pub mod ranking;
pub mod source_weights;
pub mod sources;
pub mod users;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::error::{FeedError, SourceError};
pub use crate::feed::{FeedPage, FeedRequest, FeedService};
pub use crate::post::Post;

use anyhow::Context;
use std::sync::{Arc, RwLock};
use tracing::info;

use crate::builder::ProviderSetBuilder;
use crate::config::AppConfig;
use crate::continuation::ContinuationCache;
use crate::users::UserDirectory;

/// Wire the service from configuration: HTTP clients, weights, builder,
/// continuation cache and user directory.
pub fn app_state(config: &AppConfig) -> anyhow::Result<AppState> {
    config.validate()?;

    let http = reqwest::Client::builder()
        .user_agent(config.fetch.user_agent.as_str())
        .timeout(config.fetch.page_timeout())
        .build()
        .context("building HTTP client")?;

    let (clients, rss) = sources::clients::from_config(&config.sources, &http);
    let weights = Arc::new(RwLock::new(config.source_weights()));

    let mut builder = ProviderSetBuilder::new(clients, Arc::clone(&weights))
        .with_timeouts(config.fetch.source_timeout(), config.fetch.page_timeout());
    if let Some(rss) = rss {
        builder = builder.with_rss(rss, config.rss.groups.clone());
    }

    let cache = Arc::new(ContinuationCache::with_capacity(
        config.cache.idle_ttl(),
        config.cache.max_lifetime(),
        config.cache.max_sessions,
    ));

    let feed = FeedService::new(builder, cache)
        .with_jitter(config.jitter_mode())
        .with_page_sizes(config.server.default_page_size, config.server.max_page_size);

    let users = UserDirectory::new(config.users.clone());
    info!(users = users.len(), rss_groups = config.rss.groups.len(), "feed service configured");

    Ok(AppState {
        feed: Arc::new(feed),
        users: Arc::new(users),
        weights,
        weights_path: config.weights_file(),
    })
}

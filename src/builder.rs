//! Builds a fresh provider set for one request.
//!
//! Every configured source (fixed platform clients plus one source per RSS
//! group) is acquired and loaded in its own task. Sources that fail, lack
//! credentials, or take longer than the source deadline to hand out a
//! generator are left out; the rest make up the set, in configuration order.
//! A source whose first page is still loading after the page deadline is
//! kept with no current item and its fetch in flight.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use futures::future::join_all;
use metrics::counter;
use tracing::{debug, info, warn};

use crate::error::SourceError;
use crate::metrics::SOURCE_FAILURES;
use crate::ranking::{ContentProvider, ProviderSet};
use crate::source_weights::SourceWeightsConfig;
use crate::sources::clients::RssClient;
use crate::sources::Client;
use crate::users::{anon_id, User};

pub const DEFAULT_SOURCE_TIMEOUT: Duration = Duration::from_secs(8);
pub const DEFAULT_PAGE_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ProviderSetBuilder {
    clients: Vec<Arc<dyn Client>>,
    rss: Option<Arc<RssClient>>,
    /// Groups used for anonymous requests.
    default_rss_groups: BTreeMap<String, Vec<String>>,
    weights: Arc<RwLock<SourceWeightsConfig>>,
    source_timeout: Duration,
    page_timeout: Duration,
}

impl ProviderSetBuilder {
    pub fn new(clients: Vec<Arc<dyn Client>>, weights: Arc<RwLock<SourceWeightsConfig>>) -> Self {
        Self {
            clients,
            rss: None,
            default_rss_groups: BTreeMap::new(),
            weights,
            source_timeout: DEFAULT_SOURCE_TIMEOUT,
            page_timeout: DEFAULT_PAGE_TIMEOUT,
        }
    }

    pub fn with_rss(mut self, rss: Arc<RssClient>, default_groups: BTreeMap<String, Vec<String>>) -> Self {
        self.rss = Some(rss);
        self.default_rss_groups = default_groups;
        self
    }

    /// `source`: deadline for acquiring a generator.
    /// `page`: deadline for any single blocking page load, the first included.
    pub fn with_timeouts(mut self, source: Duration, page: Duration) -> Self {
        self.source_timeout = source;
        self.page_timeout = page;
        self
    }

    pub fn weights(&self) -> Arc<RwLock<SourceWeightsConfig>> {
        Arc::clone(&self.weights)
    }

    /// Sources taking part in a request for `user`: the fixed clients, then
    /// the user's RSS groups (or the defaults, for anonymous requests).
    fn sources_for(&self, user: Option<&User>) -> Vec<Arc<dyn Client>> {
        let mut sources = self.clients.clone();
        if let Some(rss) = &self.rss {
            let groups = user.map_or(&self.default_rss_groups, |u| &u.rss_groups);
            for (name, feeds) in groups {
                sources.push(Arc::new(rss.group(name, feeds.clone())));
            }
        }
        sources
    }

    /// Never fails: a set with no providers is still a valid session.
    pub async fn build(&self, user: Option<Arc<User>>) -> ProviderSet {
        let sources = self.sources_for(user.as_deref());
        let weights: Vec<f64> = {
            let table = self.weights.read().unwrap_or_else(PoisonError::into_inner);
            sources
                .iter()
                .map(|c| table.resolve(c.name(), user.as_deref()))
                .collect()
        };

        let mut names = Vec::with_capacity(sources.len());
        let mut tasks = Vec::with_capacity(sources.len());
        for (client, weight) in sources.into_iter().zip(weights) {
            names.push(client.name().to_string());
            tasks.push(tokio::spawn(load_source(
                client,
                weight,
                user.clone(),
                self.source_timeout,
                self.page_timeout,
            )));
        }

        let requested = names.len();
        let mut providers = Vec::with_capacity(requested);
        for (name, joined) in names.into_iter().zip(join_all(tasks).await) {
            let outcome = joined.unwrap_or_else(|e| Err(SourceError::TaskFailed(e.to_string())));
            match outcome {
                Ok(provider) => providers.push(provider),
                Err(e) => {
                    warn!(source = %name, error = %e, "source skipped");
                    counter!(SOURCE_FAILURES, "source" => name).increment(1);
                }
            }
        }

        info!(
            user = ?user.as_ref().map(|u| anon_id(&u.id)),
            requested,
            built = providers.len(),
            "provider set built"
        );
        ProviderSet::new(providers)
    }
}

async fn load_source(
    client: Arc<dyn Client>,
    weight: f64,
    user: Option<Arc<User>>,
    source_timeout: Duration,
    page_timeout: Duration,
) -> Result<ContentProvider, SourceError> {
    let generator = tokio::time::timeout(source_timeout, client.page_generator(user.as_deref()))
        .await
        .map_err(|_| SourceError::Timeout {
            name: client.name().to_string(),
            after: source_timeout,
        })??;

    let provider = ContentProvider::new(client.name(), weight, generator, page_timeout).await;
    debug!(
        source = client.name(),
        weight,
        has_item = provider.current_item().is_some(),
        prefetching = provider.is_prefetching(),
        "source ready"
    );
    Ok(provider)
}

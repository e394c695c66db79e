//! Request-level flow: resume or build a session, rank a page out of it,
//! and store the session again under a new token.

use std::sync::Arc;

use metrics::counter;
use serde::Serialize;
use tracing::{debug, info};

use crate::builder::ProviderSetBuilder;
use crate::continuation::{ContinuationCache, SharedSession};
use crate::error::FeedError;
use crate::metrics::{PAGES_SERVED, POSTS_SERVED};
use crate::post::Post;
use crate::ranking::{JitterMode, SelectionEngine};
use crate::users::User;

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Default)]
pub struct FeedRequest {
    /// Token from the previous page; absent or empty starts a new session.
    pub page_token: Option<String>,
    pub count: Option<usize>,
    /// Only consulted when a new session is built.
    pub user: Option<Arc<User>>,
}

/// One page of the merged feed. An empty `posts` with a token means
/// "nothing right now", not end of stream.
#[derive(Debug, Clone, Serialize)]
pub struct FeedPage {
    pub posts: Vec<Post>,
    pub page_token: String,
}

pub struct FeedService {
    builder: ProviderSetBuilder,
    cache: Arc<ContinuationCache>,
    jitter: JitterMode,
    default_page_size: usize,
    max_page_size: usize,
}

impl FeedService {
    pub fn new(builder: ProviderSetBuilder, cache: Arc<ContinuationCache>) -> Self {
        Self {
            builder,
            cache,
            jitter: JitterMode::Random,
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
        }
    }

    pub fn with_jitter(mut self, jitter: JitterMode) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_page_sizes(mut self, default: usize, max: usize) -> Self {
        self.default_page_size = default;
        self.max_page_size = max;
        self
    }

    pub fn cache(&self) -> &Arc<ContinuationCache> {
        &self.cache
    }

    pub fn builder(&self) -> &ProviderSetBuilder {
        &self.builder
    }

    fn page_size(&self, requested: Option<usize>) -> Result<usize, FeedError> {
        match requested.unwrap_or(self.default_page_size) {
            0 => Err(FeedError::BadRequest("count must be at least 1".into())),
            n if n > self.max_page_size => Err(FeedError::BadRequest(format!(
                "count must be at most {}",
                self.max_page_size
            ))),
            n => Ok(n),
        }
    }

    pub async fn get_posts(&self, req: FeedRequest) -> Result<FeedPage, FeedError> {
        let count = self.page_size(req.count)?;

        let token = req.page_token.as_deref().map(str::trim).filter(|t| !t.is_empty());
        let (session, resumed): (SharedSession, bool) = match token {
            Some(token) => (self.cache.get(token)?, true),
            None => {
                let set = self.builder.build(req.user.clone()).await;
                (Arc::new(tokio::sync::Mutex::new(set)), false)
            }
        };

        let posts = {
            let mut set = session.lock().await;
            if resumed {
                let revived = set.revive().await;
                debug!(revived, "idle sources retried");
            }
            let mut engine = SelectionEngine::new(self.jitter.make());
            engine.get_posts(&mut set, count).await
        };

        let page_token = self.cache.put(session);

        counter!(PAGES_SERVED).increment(1);
        counter!(POSTS_SERVED).increment(posts.len() as u64);
        info!(resumed, requested = count, served = posts.len(), "feed page served");

        Ok(FeedPage { posts, page_token })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source_weights::SourceWeightsConfig;
    use std::sync::RwLock;

    fn service() -> FeedService {
        let weights = Arc::new(RwLock::new(SourceWeightsConfig::default_seed()));
        FeedService::new(
            ProviderSetBuilder::new(Vec::new(), weights),
            Arc::new(ContinuationCache::default()),
        )
        .with_page_sizes(10, 50)
    }

    #[test]
    fn page_size_defaults_and_bounds() {
        let s = service();
        assert_eq!(s.page_size(None).unwrap(), 10);
        assert_eq!(s.page_size(Some(50)).unwrap(), 50);
        assert!(matches!(s.page_size(Some(0)), Err(FeedError::BadRequest(_))));
        assert!(matches!(s.page_size(Some(51)), Err(FeedError::BadRequest(_))));
    }

    #[tokio::test]
    async fn no_sources_still_yields_a_token() {
        let s = service();
        let page = s.get_posts(FeedRequest::default()).await.unwrap();
        assert!(page.posts.is_empty());
        assert!(s.cache().get(&page.page_token).is_ok());
    }
}

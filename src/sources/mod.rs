//! Content sources as seen by the ranking core.
//!
//! A [`Client`] knows how to talk to one platform and hands out a
//! [`PageGenerator`] per request. The generator is the only thing the core ever
//! calls: no arguments, one page per call, never an error.

pub mod clients;
pub mod http;

use async_trait::async_trait;
use std::collections::VecDeque;

use crate::error::SourceError;
use crate::post::Post;
use crate::users::User;

/// Stateful producer of successive pages for one source.
///
/// Contract:
/// - each call returns the next page, possibly empty;
/// - once exhausted, every further call returns an empty page promptly;
/// - failures are logged by the generator itself and surface as empty pages.
///
/// A generator is owned by exactly one content provider and is never polled
/// concurrently with itself.
#[async_trait]
pub trait PageGenerator: Send {
    async fn next_page(&mut self) -> Vec<Post>;
}

/// A platform client: resolves a user context into a page generator.
#[async_trait]
pub trait Client: Send + Sync {
    /// Source name, also the key for weight resolution.
    fn name(&self) -> &str;

    /// Acquire a generator for this request. Errors here (missing credentials,
    /// bad configuration) drop the source from the request; they are not fatal.
    async fn page_generator(&self, user: Option<&User>) -> Result<Box<dyn PageGenerator>, SourceError>;
}

/// Generator that never has anything to offer.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyGenerator;

#[async_trait]
impl PageGenerator for EmptyGenerator {
    async fn next_page(&mut self) -> Vec<Post> {
        Vec::new()
    }
}

/// Serves a fixed queue of pages, then empty pages forever.
#[derive(Debug, Default, Clone)]
pub struct StaticPages {
    pages: VecDeque<Vec<Post>>,
}

impl StaticPages {
    pub fn new(pages: impl IntoIterator<Item = Vec<Post>>) -> Self {
        Self {
            pages: pages.into_iter().collect(),
        }
    }

    /// Everything in one page, like a non-paginated source.
    pub fn single(posts: Vec<Post>) -> Self {
        Self::new([posts])
    }
}

#[async_trait]
impl PageGenerator for StaticPages {
    async fn next_page(&mut self) -> Vec<Post> {
        self.pages.pop_front().unwrap_or_default()
    }
}

//! HTTP page generators for the upstream page services.
//!
//! Two shapes exist upstream: paginated services answering
//! `{"posts": [...], "next_url": "..."}`, and snapshot services that return all
//! they have in one response. Both absorb every failure into an empty page.

use async_trait::async_trait;
use metrics::{counter, histogram};
use serde::Deserialize;
use std::time::Instant;
use tracing::{debug, warn};
use url::Url;

use super::PageGenerator;
use crate::error::SourceError;
use crate::metrics::{GENERATOR_ERRORS, PAGE_FETCH_MS};
use crate::post::{ClientPage, Post};

/// What a generator does with itself after a failed fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnError {
    /// Stop calling upstream; every later page is empty.
    #[default]
    Exhaust,
    /// Keep the current URL so the next call tries again.
    Retry,
}

/// Follows the next-URL chain of a paginated page service.
pub struct PagedHttpGenerator {
    http: reqwest::Client,
    source: String,
    next_url: Option<Url>,
    auth_body: Option<serde_json::Value>,
    on_error: OnError,
}

impl PagedHttpGenerator {
    pub fn new(http: reqwest::Client, source: impl Into<String>, first_page: Url) -> Self {
        Self {
            http,
            source: source.into(),
            next_url: Some(first_page),
            auth_body: None,
            on_error: OnError::Exhaust,
        }
    }

    /// Credentials travel as a JSON body on the GET, which is what the
    /// upstream services read them from.
    pub fn with_auth_body(mut self, body: serde_json::Value) -> Self {
        self.auth_body = Some(body);
        self
    }

    pub fn on_error(mut self, policy: OnError) -> Self {
        self.on_error = policy;
        self
    }

    pub fn is_exhausted(&self) -> bool {
        self.next_url.is_none()
    }

    async fn fetch(&self, url: &Url) -> Result<ClientPage, SourceError> {
        let mut req = self.http.get(url.clone());
        if let Some(body) = &self.auth_body {
            req = req.json(body);
        }
        let resp = req.send().await?.error_for_status()?;
        Ok(resp.json::<ClientPage>().await?)
    }
}

#[async_trait]
impl PageGenerator for PagedHttpGenerator {
    async fn next_page(&mut self) -> Vec<Post> {
        let Some(url) = self.next_url.clone() else {
            return Vec::new();
        };

        let t0 = Instant::now();
        let outcome = self.fetch(&url).await;
        histogram!(PAGE_FETCH_MS, "source" => self.source.clone())
            .record(t0.elapsed().as_secs_f64() * 1_000.0);

        match outcome {
            Ok(page) => {
                self.next_url = resolve_next(&url, &page.next_url);
                debug!(
                    source = %self.source,
                    posts = page.posts.len(),
                    more = self.next_url.is_some(),
                    "fetched page"
                );
                page.posts
            }
            Err(e) => {
                warn!(source = %self.source, error = %e, "error getting page");
                counter!(GENERATOR_ERRORS, "source" => self.source.clone()).increment(1);
                if self.on_error == OnError::Exhaust {
                    self.next_url = None;
                }
                Vec::new()
            }
        }
    }
}

/// Resolve the advertised next page against the current one. Relative links
/// are allowed; an empty link or a link back to the same page ends the chain.
fn resolve_next(current: &Url, advertised: &str) -> Option<Url> {
    let advertised = advertised.trim();
    if advertised.is_empty() {
        return None;
    }
    match current.join(advertised) {
        Ok(next) if next != *current => Some(next),
        Ok(_) => None,
        Err(e) => {
            warn!(next = advertised, error = %e, "unusable next page link");
            None
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SnapshotBody {
    Bare(Vec<Post>),
    Paged(ClientPage),
}

/// Non-paginated source: the first call returns everything, later calls are empty.
pub struct SnapshotGenerator {
    http: reqwest::Client,
    source: String,
    url: Url,
    called: bool,
}

impl SnapshotGenerator {
    pub fn new(http: reqwest::Client, source: impl Into<String>, url: Url) -> Self {
        Self {
            http,
            source: source.into(),
            url,
            called: false,
        }
    }

    async fn fetch(&self) -> Result<Vec<Post>, SourceError> {
        let resp = self
            .http
            .get(self.url.clone())
            .send()
            .await?
            .error_for_status()?;
        Ok(match resp.json::<SnapshotBody>().await? {
            SnapshotBody::Bare(posts) => posts,
            SnapshotBody::Paged(page) => page.posts,
        })
    }
}

#[async_trait]
impl PageGenerator for SnapshotGenerator {
    async fn next_page(&mut self) -> Vec<Post> {
        if self.called {
            return Vec::new();
        }
        self.called = true;

        let t0 = Instant::now();
        let outcome = self.fetch().await;
        histogram!(PAGE_FETCH_MS, "source" => self.source.clone())
            .record(t0.elapsed().as_secs_f64() * 1_000.0);

        match outcome {
            Ok(posts) => posts,
            Err(e) => {
                warn!(source = %self.source, error = %e, "error getting page");
                counter!(GENERATOR_ERRORS, "source" => self.source.clone()).increment(1);
                Vec::new()
            }
        }
    }
}

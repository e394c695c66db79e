// tests/builder_fanout.rs
//
// Provider set construction: concurrency, partial failure, deadlines,
// weight resolution. Sources are in-memory `Client` implementations.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use feed_ranker::builder::ProviderSetBuilder;
use feed_ranker::error::SourceError;
use feed_ranker::post::Post;
use feed_ranker::ranking::{FixedJitter, SelectionEngine};
use feed_ranker::source_weights::SourceWeightsConfig;
use feed_ranker::sources::{Client, PageGenerator, StaticPages};
use feed_ranker::users::User;

/// Serves a fixed set of posts, optionally after a delay.
struct StaticClient {
    name: &'static str,
    posts: usize,
    delay: Duration,
}

impl StaticClient {
    fn new(name: &'static str, posts: usize) -> Arc<dyn Client> {
        Arc::new(Self {
            name,
            posts,
            delay: Duration::ZERO,
        })
    }

    fn slow(name: &'static str, posts: usize, delay: Duration) -> Arc<dyn Client> {
        Arc::new(Self { name, posts, delay })
    }
}

#[async_trait]
impl Client for StaticClient {
    fn name(&self) -> &str {
        self.name
    }

    async fn page_generator(&self, _user: Option<&User>) -> Result<Box<dyn PageGenerator>, SourceError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let posts = (0..self.posts)
            .map(|i| Post::new(format!("{}-{i}", self.name), self.name, Utc::now()))
            .collect();
        Ok(Box::new(StaticPages::single(posts)))
    }
}

/// Cannot hand out a generator at all.
struct NoCredentials;

#[async_trait]
impl Client for NoCredentials {
    fn name(&self) -> &str {
        "facebook"
    }

    async fn page_generator(&self, _user: Option<&User>) -> Result<Box<dyn PageGenerator>, SourceError> {
        Err(SourceError::missing_credentials("facebook", "empty auth token"))
    }
}

/// Acquisition never completes.
struct Stalled;

#[async_trait]
impl Client for Stalled {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn page_generator(&self, _user: Option<&User>) -> Result<Box<dyn PageGenerator>, SourceError> {
        std::future::pending::<()>().await;
        unreachable!()
    }
}

/// Hands out its generator at once; the first page takes `delay`.
struct SlowFirstPage {
    delay: Duration,
}

struct DelayedPage {
    delay: Duration,
    served: bool,
}

#[async_trait]
impl PageGenerator for DelayedPage {
    async fn next_page(&mut self) -> Vec<Post> {
        if self.served {
            return Vec::new();
        }
        tokio::time::sleep(self.delay).await;
        self.served = true;
        vec![Post::new("late-0", "late", Utc::now())]
    }
}

#[async_trait]
impl Client for SlowFirstPage {
    fn name(&self) -> &str {
        "late"
    }

    async fn page_generator(&self, _user: Option<&User>) -> Result<Box<dyn PageGenerator>, SourceError> {
        Ok(Box::new(DelayedPage {
            delay: self.delay,
            served: false,
        }))
    }
}

/// A generator whose every fetch fails, i.e. always returns an empty page.
struct BrokenUpstream;

struct FailingGenerator;

#[async_trait]
impl PageGenerator for FailingGenerator {
    async fn next_page(&mut self) -> Vec<Post> {
        Vec::new()
    }
}

#[async_trait]
impl Client for BrokenUpstream {
    fn name(&self) -> &str {
        "broken"
    }

    async fn page_generator(&self, _user: Option<&User>) -> Result<Box<dyn PageGenerator>, SourceError> {
        Ok(Box::new(FailingGenerator))
    }
}

fn no_credentials() -> Arc<dyn Client> {
    Arc::new(NoCredentials)
}

fn stalled() -> Arc<dyn Client> {
    Arc::new(Stalled)
}

fn broken_upstream() -> Arc<dyn Client> {
    Arc::new(BrokenUpstream)
}

fn weights() -> Arc<RwLock<SourceWeightsConfig>> {
    Arc::new(RwLock::new(SourceWeightsConfig::default_seed()))
}

fn names(set: &feed_ranker::ranking::ProviderSet) -> Vec<String> {
    set.providers().iter().map(|p| p.source().to_string()).collect()
}

#[tokio::test]
async fn failing_sources_do_not_stop_the_others() {
    let builder = ProviderSetBuilder::new(
        vec![
            no_credentials(),
            StaticClient::new("hacker-news", 3),
            broken_upstream(),
            StaticClient::new("reddit", 2),
        ],
        weights(),
    );

    let mut set = builder.build(None).await;
    // Missing credentials drop the source; an empty upstream stays in the set.
    assert_eq!(names(&set), ["hacker-news", "broken", "reddit"]);

    let mut engine = SelectionEngine::new(Box::new(FixedJitter(1.0)));
    let out = engine.get_posts(&mut set, 10).await;
    assert_eq!(out.len(), 5);
    assert!(out.iter().all(|p| p.platform == "hacker-news" || p.platform == "reddit"));
}

#[tokio::test(start_paused = true)]
async fn stalled_source_is_cut_off_by_the_deadline() {
    let builder = ProviderSetBuilder::new(
        vec![stalled(), StaticClient::new("reddit", 1)],
        weights(),
    )
    .with_timeouts(Duration::from_millis(200), Duration::from_millis(200));

    let started = tokio::time::Instant::now();
    let set = builder.build(None).await;
    assert_eq!(names(&set), ["reddit"]);
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn slow_first_page_keeps_the_source_with_its_fetch_in_flight() {
    let builder = ProviderSetBuilder::new(
        vec![
            Arc::new(SlowFirstPage {
                delay: Duration::from_secs(2),
            }) as Arc<dyn Client>,
            StaticClient::new("reddit", 1),
        ],
        weights(),
    )
    .with_timeouts(Duration::from_millis(200), Duration::from_millis(500));

    let mut set = builder.build(None).await;
    assert_eq!(names(&set), ["late", "reddit"]);
    let late = &set.providers()[0];
    assert!(late.current_item().is_none());
    assert!(late.is_prefetching());

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(set.revive().await, 1);
    assert_eq!(set.providers()[0].current_item().map(|p| p.id.as_str()), Some("late-0"));
}

#[tokio::test(start_paused = true)]
async fn set_keeps_configuration_order_not_completion_order() {
    let builder = ProviderSetBuilder::new(
        vec![
            StaticClient::slow("google-news", 1, Duration::from_millis(300)),
            StaticClient::new("hacker-news", 1),
            StaticClient::slow("reddit", 1, Duration::from_millis(100)),
        ],
        weights(),
    );

    let started = tokio::time::Instant::now();
    let set = builder.build(None).await;
    assert_eq!(names(&set), ["google-news", "hacker-news", "reddit"]);
    // Concurrent: bounded by the slowest source, not the sum.
    assert!(started.elapsed() < Duration::from_millis(400));
}

#[tokio::test]
async fn no_sources_is_an_empty_set_not_an_error() {
    let builder = ProviderSetBuilder::new(vec![no_credentials()], weights());
    let mut set = builder.build(None).await;
    assert!(set.is_empty());

    let mut engine = SelectionEngine::new(Box::new(FixedJitter(1.0)));
    assert!(engine.get_posts(&mut set, 5).await.is_empty());
}

#[tokio::test]
async fn weights_come_from_the_table_or_the_user() {
    let builder = ProviderSetBuilder::new(
        vec![StaticClient::new("google-news", 1), StaticClient::new("reddit", 1)],
        weights(),
    );

    let anon = builder.build(None).await;
    let w: Vec<f64> = anon.providers().iter().map(|p| p.weight()).collect();
    assert_eq!(w, [8.0, 4.0]);

    let user = User {
        id: "u-1".into(),
        weights: [("reddit".to_string(), 0.0)].into_iter().collect(),
        ..Default::default()
    };
    let personal = builder.build(Some(Arc::new(user))).await;
    let w: Vec<f64> = personal.providers().iter().map(|p| p.weight()).collect();
    assert_eq!(w, [8.0, 0.0]);
}

#[tokio::test]
async fn reloaded_weights_apply_to_the_next_build() {
    let table = weights();
    let builder = ProviderSetBuilder::new(vec![StaticClient::new("reddit", 1)], Arc::clone(&table));

    table.write().unwrap().weights.insert("reddit".into(), 11.0);
    let set = builder.build(None).await;
    assert_eq!(set.providers()[0].weight(), 11.0);
}
